//! 用户管理与家庭关系端点（仅管理员）

use actix_multipart::Multipart;
use actix_web::{Responder, Result as ActixResult, web};
use std::sync::Arc;
use tracing::info;

use crate::config::get_config;
use crate::import::parse_upload;
use crate::services::AuthUser;
use crate::services::user_service::{
    BulkUserConfirmRequest, CreateFamilyRequest, CreateUserRequest, FamilyQuery,
    UpdateUserRequest, UserQuery, UserService,
};
use crate::services::views::MessageResponse;

use super::helpers::{api_result, check_batch_size};
use super::types::IdPath;
use super::upload::read_upload;

pub async fn list_users(
    user: AuthUser,
    query: web::Query<UserQuery>,
    service: web::Data<Arc<UserService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.list_users(query.into_inner()).await
        }
        .await,
    ))
}

pub async fn get_user(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<UserService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.get_user(path.id).await
        }
        .await,
    ))
}

pub async fn create_user(
    user: AuthUser,
    body: web::Json<CreateUserRequest>,
    service: web::Data<Arc<UserService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.create_user(body.into_inner()).await
        }
        .await,
    ))
}

pub async fn update_user(
    user: AuthUser,
    path: web::Path<IdPath>,
    body: web::Json<UpdateUserRequest>,
    service: web::Data<Arc<UserService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.update_user(path.id, body.into_inner()).await
        }
        .await,
    ))
}

pub async fn delete_user(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<UserService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.delete_user(path.id).await?;
            Ok::<_, crate::errors::SchoolError>(MessageResponse::new("User deleted"))
        }
        .await,
    ))
}

/// 上传名单文件，按 CI 区分新建与已有用户
pub async fn bulk_preview(
    user: AuthUser,
    payload: Multipart,
    service: web::Data<Arc<UserService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            let upload = read_upload(payload).await?;
            let entries = parse_upload(&upload.filename, &upload.bytes, &get_config().import)?;
            info!(
                "API: user roster '{}' parsed into {} rows",
                upload.filename,
                entries.len()
            );
            service.bulk_preview(entries).await
        }
        .await,
    ))
}

pub async fn bulk_confirm(
    user: AuthUser,
    body: web::Json<BulkUserConfirmRequest>,
    service: web::Data<Arc<UserService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            check_batch_size(body.rows.len())?;
            service.bulk_confirm(body.into_inner()).await
        }
        .await,
    ))
}

// ============ 家庭关系 ============

pub async fn list_family(
    user: AuthUser,
    query: web::Query<FamilyQuery>,
    service: web::Data<Arc<UserService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.list_family(query.into_inner()).await
        }
        .await,
    ))
}

pub async fn create_family(
    user: AuthUser,
    body: web::Json<CreateFamilyRequest>,
    service: web::Data<Arc<UserService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.create_family(body.into_inner()).await
        }
        .await,
    ))
}

pub async fn delete_family(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<UserService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.delete_family(path.id).await?;
            Ok::<_, crate::errors::SchoolError>(MessageResponse::new("Relationship deleted"))
        }
        .await,
    ))
}
