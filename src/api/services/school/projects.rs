//! 项目与公开的项目报名端点

use actix_web::{Responder, Result as ActixResult, web};
use std::sync::Arc;

use crate::services::AuthUser;
use crate::services::project_service::{
    AvailableProjectsQuery, ProjectQuery, ProjectRegistrationRequest, ProjectRequest,
    ProjectService, ValidateStudentRequest,
};
use crate::services::views::MessageResponse;

use super::helpers::api_result;
use super::types::IdPath;

pub async fn list_projects(
    user: AuthUser,
    query: web::Query<ProjectQuery>,
    service: web::Data<Arc<ProjectService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service.list_projects(&user, query.into_inner()).await,
    ))
}

pub async fn get_project(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<ProjectService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.get_project(&user, path.id).await))
}

/// 保存后分数同步到全部成员
pub async fn create_project(
    user: AuthUser,
    body: web::Json<ProjectRequest>,
    service: web::Data<Arc<ProjectService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service.create_project(&user, body.into_inner()).await,
    ))
}

pub async fn update_project(
    user: AuthUser,
    path: web::Path<IdPath>,
    body: web::Json<ProjectRequest>,
    service: web::Data<Arc<ProjectService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service
            .update_project(&user, path.id, body.into_inner())
            .await,
    ))
}

pub async fn delete_project(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<ProjectService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service
            .delete_project(&user, path.id)
            .await
            .map(|_| MessageResponse::new("Project deleted")),
    ))
}

// ============ 公开报名 ============

pub async fn available_projects(
    query: web::Query<AvailableProjectsQuery>,
    service: web::Data<Arc<ProjectService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.available_projects(query.course_id).await))
}

pub async fn validate_student(
    body: web::Json<ValidateStudentRequest>,
    service: web::Data<Arc<ProjectService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.validate_student(body.into_inner()).await))
}

pub async fn register_project(
    body: web::Json<ProjectRegistrationRequest>,
    service: web::Data<Arc<ProjectService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.register_project(body.into_inner()).await))
}
