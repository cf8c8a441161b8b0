//! 学期、专业、科目与评价模板端点
//!
//! 读取对所有登录用户开放，写操作仅限管理员。

use actix_web::{Responder, Result as ActixResult, web};
use std::sync::Arc;

use crate::errors::SchoolError;
use crate::services::AuthUser;
use crate::services::academic_service::{
    AcademicService, PeriodRequest, ProgramRequest, SubjectQuery, SubjectRequest, TemplateRequest,
};
use crate::services::views::MessageResponse;

use super::helpers::api_result;
use super::types::IdPath;

// ============ 学期 ============

pub async fn list_periods(
    _user: AuthUser,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.list_periods().await))
}

pub async fn get_period(
    _user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.get_period(path.id).await))
}

pub async fn create_period(
    user: AuthUser,
    body: web::Json<PeriodRequest>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.create_period(body.into_inner()).await
        }
        .await,
    ))
}

pub async fn update_period(
    user: AuthUser,
    path: web::Path<IdPath>,
    body: web::Json<PeriodRequest>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.update_period(path.id, body.into_inner()).await
        }
        .await,
    ))
}

pub async fn delete_period(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.delete_period(path.id).await?;
            Ok::<_, SchoolError>(MessageResponse::new("Period deleted"))
        }
        .await,
    ))
}

// ============ 专业 ============

pub async fn list_programs(
    _user: AuthUser,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.list_programs().await))
}

pub async fn get_program(
    _user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.get_program(path.id).await))
}

pub async fn create_program(
    user: AuthUser,
    body: web::Json<ProgramRequest>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.create_program(body.into_inner()).await
        }
        .await,
    ))
}

pub async fn update_program(
    user: AuthUser,
    path: web::Path<IdPath>,
    body: web::Json<ProgramRequest>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.update_program(path.id, body.into_inner()).await
        }
        .await,
    ))
}

pub async fn delete_program(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.delete_program(path.id).await?;
            Ok::<_, SchoolError>(MessageResponse::new("Program deleted"))
        }
        .await,
    ))
}

// ============ 科目 ============

pub async fn list_subjects(
    _user: AuthUser,
    query: web::Query<SubjectQuery>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.list_subjects(query.into_inner()).await))
}

pub async fn get_subject(
    _user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.get_subject(path.id).await))
}

pub async fn create_subject(
    user: AuthUser,
    body: web::Json<SubjectRequest>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.create_subject(body.into_inner()).await
        }
        .await,
    ))
}

pub async fn update_subject(
    user: AuthUser,
    path: web::Path<IdPath>,
    body: web::Json<SubjectRequest>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.update_subject(path.id, body.into_inner()).await
        }
        .await,
    ))
}

pub async fn delete_subject(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.delete_subject(path.id).await?;
            Ok::<_, SchoolError>(MessageResponse::new("Subject deleted"))
        }
        .await,
    ))
}

// ============ 评价模板 ============

pub async fn list_templates(
    _user: AuthUser,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.list_templates().await))
}

pub async fn get_template(
    _user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.get_template(path.id).await))
}

pub async fn create_template(
    user: AuthUser,
    body: web::Json<TemplateRequest>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.create_template(body.into_inner()).await
        }
        .await,
    ))
}

pub async fn update_template(
    user: AuthUser,
    path: web::Path<IdPath>,
    body: web::Json<TemplateRequest>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.update_template(path.id, body.into_inner()).await
        }
        .await,
    ))
}

pub async fn delete_template(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<AcademicService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.delete_template(path.id).await?;
            Ok::<_, SchoolError>(MessageResponse::new("Template deleted"))
        }
        .await,
    ))
}
