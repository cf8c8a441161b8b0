//! 认证相关端点

use actix_governor::{Governor, GovernorConfigBuilder, KeyExtractor, SimpleKeyExtractionError};
use actix_web::dev::ServiceRequest;
use actix_web::{Responder, Result as ActixResult, web};
use governor::middleware::NoOpMiddleware;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::middleware::SessionToken;
use crate::config::get_config;
use crate::services::auth_service::{
    AuthService, AuthUser, LoginRequest, ProfileUpdateRequest, RegisterRequest,
    UpdateCredentialsRequest,
};
use crate::services::views::MessageResponse;

use super::helpers::{api_result, success_response};

/// 基于连接 IP 的限流 key 提取器
#[derive(Clone, Copy)]
pub struct LoginKeyExtractor;

impl KeyExtractor for LoginKeyExtractor {
    type Key = String;
    type KeyExtractionError = SimpleKeyExtractionError<&'static str>;

    fn extract(&self, req: &ServiceRequest) -> Result<Self::Key, Self::KeyExtractionError> {
        let conn_info = req.connection_info();
        // TCP peer address，无法伪造
        conn_info
            .peer_addr()
            .map(|ip| ip.to_string())
            .ok_or_else(|| SimpleKeyExtractionError::new("Unable to extract peer IP"))
    }
}

/// 创建登录限流器
///
/// 速率与突发量来自 `auth.login_rate_per_second` / `auth.login_burst`，
/// 超限返回 HTTP 429 Too Many Requests
pub fn login_rate_limiter() -> Governor<LoginKeyExtractor, NoOpMiddleware> {
    let auth = &get_config().auth;
    let rate = auth.login_rate_per_second.max(1);
    let burst = auth.login_burst.max(1);
    let config = GovernorConfigBuilder::default()
        .requests_per_second(rate)
        .burst_size(burst)
        .key_extractor(LoginKeyExtractor)
        .finish()
        .expect("Invalid rate limit config");

    debug!("Login rate limiter created: {} req/s, burst {}", rate, burst);
    Governor::new(&config)
}

pub async fn login(
    body: web::Json<LoginRequest>,
    auth: web::Data<Arc<AuthService>>,
) -> ActixResult<impl Responder> {
    info!("API: login attempt for '{}'", body.username.trim());
    Ok(api_result(auth.login(body.into_inner()).await))
}

pub async fn register(
    body: web::Json<RegisterRequest>,
    auth: web::Data<Arc<AuthService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(auth.register(body.into_inner()).await))
}

/// 会话有效时返回当前用户
pub async fn check_session(user: AuthUser) -> ActixResult<impl Responder> {
    Ok(success_response(user))
}

pub async fn logout(
    token: SessionToken,
    auth: web::Data<Arc<AuthService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        auth.logout(&token.0)
            .await
            .map(|_| MessageResponse::new("Logged out")),
    ))
}

pub async fn update_credentials(
    user: AuthUser,
    body: web::Json<UpdateCredentialsRequest>,
    auth: web::Data<Arc<AuthService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        auth.update_credentials(&user, body.into_inner()).await,
    ))
}

pub async fn get_profile(
    user: AuthUser,
    auth: web::Data<Arc<AuthService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(auth.profile(&user).await))
}

pub async fn update_profile(
    user: AuthUser,
    body: web::Json<ProfileUpdateRequest>,
    auth: web::Data<Arc<AuthService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(auth.update_profile(&user, body.into_inner()).await))
}
