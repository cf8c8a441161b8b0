//! 评分项、任务、分数与成绩单端点

use actix_web::{Responder, Result as ActixResult, web};
use std::sync::Arc;

use crate::services::AuthUser;
use crate::services::criteria_service::{
    BulkSettingsRequest, CriteriaQuery, CriteriaService, SpecialCriterionRequest,
    SubCriterionRequest,
};
use crate::services::score_service::{
    CourseScopedQuery, CriterionScoreInput, ScoreService, TaskScoreInput, TaskScoreQuery,
};
use crate::services::task_service::{TaskQuery, TaskRequest, TaskService, TaskSheetQuery};
use crate::services::views::MessageResponse;

use super::helpers::{api_result, check_batch_size};
use super::types::IdPath;

// ============ 子评分项 ============

pub async fn list_sub_criteria(
    user: AuthUser,
    query: web::Query<CriteriaQuery>,
    service: web::Data<Arc<CriteriaService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service.list_sub_criteria(&user, query.course_id).await,
    ))
}

pub async fn get_sub_criterion(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<CriteriaService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.get_sub_criterion(&user, path.id).await))
}

pub async fn create_sub_criterion(
    user: AuthUser,
    body: web::Json<SubCriterionRequest>,
    service: web::Data<Arc<CriteriaService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service.create_sub_criterion(&user, body.into_inner()).await,
    ))
}

pub async fn update_sub_criterion(
    user: AuthUser,
    path: web::Path<IdPath>,
    body: web::Json<SubCriterionRequest>,
    service: web::Data<Arc<CriteriaService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service
            .update_sub_criterion(&user, path.id, body.into_inner())
            .await,
    ))
}

pub async fn delete_sub_criterion(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<CriteriaService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service
            .delete_sub_criterion(&user, path.id)
            .await
            .map(|_| MessageResponse::new("Sub-criterion deleted")),
    ))
}

pub async fn bulk_sub_settings(
    user: AuthUser,
    body: web::Json<BulkSettingsRequest>,
    service: web::Data<Arc<CriteriaService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service.bulk_sub_settings(&user, body.into_inner()).await,
    ))
}

// ============ 特殊评分项 ============

pub async fn list_special_criteria(
    user: AuthUser,
    query: web::Query<CriteriaQuery>,
    service: web::Data<Arc<CriteriaService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service.list_special_criteria(&user, query.course_id).await,
    ))
}

pub async fn get_special_criterion(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<CriteriaService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service.get_special_criterion(&user, path.id).await,
    ))
}

pub async fn create_special_criterion(
    user: AuthUser,
    body: web::Json<SpecialCriterionRequest>,
    service: web::Data<Arc<CriteriaService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service
            .create_special_criterion(&user, body.into_inner())
            .await,
    ))
}

pub async fn update_special_criterion(
    user: AuthUser,
    path: web::Path<IdPath>,
    body: web::Json<SpecialCriterionRequest>,
    service: web::Data<Arc<CriteriaService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service
            .update_special_criterion(&user, path.id, body.into_inner())
            .await,
    ))
}

pub async fn delete_special_criterion(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<CriteriaService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service
            .delete_special_criterion(&user, path.id)
            .await
            .map(|_| MessageResponse::new("Special criterion deleted")),
    ))
}

pub async fn bulk_special_settings(
    user: AuthUser,
    body: web::Json<BulkSettingsRequest>,
    service: web::Data<Arc<CriteriaService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service.bulk_special_settings(&user, body.into_inner()).await,
    ))
}

// ============ 任务 ============

pub async fn list_tasks(
    user: AuthUser,
    query: web::Query<TaskQuery>,
    service: web::Data<Arc<TaskService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.list_tasks(&user, query.into_inner()).await))
}

pub async fn get_task(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<TaskService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.get_task(&user, path.id).await))
}

pub async fn create_task(
    user: AuthUser,
    body: web::Json<TaskRequest>,
    service: web::Data<Arc<TaskService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.create_task(&user, body.into_inner()).await))
}

pub async fn update_task(
    user: AuthUser,
    path: web::Path<IdPath>,
    body: web::Json<TaskRequest>,
    service: web::Data<Arc<TaskService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service
            .update_task(&user, path.id, body.into_inner())
            .await,
    ))
}

pub async fn delete_task(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<TaskService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service
            .delete_task(&user, path.id)
            .await
            .map(|_| MessageResponse::new("Task deleted")),
    ))
}

pub async fn task_sheet(
    user: AuthUser,
    query: web::Query<TaskSheetQuery>,
    service: web::Data<Arc<TaskService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.task_sheet(&user, query.into_inner()).await))
}

// ============ 分数 ============

pub async fn list_task_scores(
    user: AuthUser,
    query: web::Query<TaskScoreQuery>,
    service: web::Data<Arc<ScoreService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service.list_task_scores(&user, query.into_inner()).await,
    ))
}

/// 逐行保存，错误按行收集
pub async fn bulk_task_scores(
    user: AuthUser,
    body: web::Json<Vec<TaskScoreInput>>,
    service: web::Data<Arc<ScoreService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            check_batch_size(body.len())?;
            service.bulk_task_scores(&user, body.into_inner()).await
        }
        .await,
    ))
}

pub async fn list_criterion_scores(
    user: AuthUser,
    query: web::Query<CourseScopedQuery>,
    service: web::Data<Arc<ScoreService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service.list_criterion_scores(&user, query.course_id).await,
    ))
}

/// 遇到第一条错误即整体回滚
pub async fn bulk_criterion_scores(
    user: AuthUser,
    body: web::Json<Vec<CriterionScoreInput>>,
    service: web::Data<Arc<ScoreService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            check_batch_size(body.len())?;
            service.bulk_criterion_scores(&user, body.into_inner()).await
        }
        .await,
    ))
}

pub async fn gradesheet(
    user: AuthUser,
    query: web::Query<CourseScopedQuery>,
    service: web::Data<Arc<ScoreService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.gradesheet(&user, query.course_id).await))
}
