//! 自助报名端点

use actix_web::{Responder, Result as ActixResult, web};
use std::sync::Arc;

use crate::services::AuthUser;
use crate::services::registration_service::{
    RegistrationQuery, RegistrationService, SubmitRegistrationRequest,
};

use super::helpers::api_result;
use super::types::IdPath;

pub async fn open_courses(
    service: web::Data<Arc<RegistrationService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.open_courses().await))
}

pub async fn submit(
    body: web::Json<SubmitRegistrationRequest>,
    service: web::Data<Arc<RegistrationService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.submit(body.into_inner()).await))
}

pub async fn list_requests(
    user: AuthUser,
    query: web::Query<RegistrationQuery>,
    service: web::Data<Arc<RegistrationService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.list_requests(query.into_inner()).await
        }
        .await,
    ))
}

pub async fn approve(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<RegistrationService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.approve(path.id).await
        }
        .await,
    ))
}

pub async fn reject(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<RegistrationService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.reject(path.id).await
        }
        .await,
    ))
}
