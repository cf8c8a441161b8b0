use actix_service::{Service, Transform};
use actix_web::{
    Error, FromRequest, HttpMessage, HttpRequest, HttpResponse,
    body::EitherBody,
    dev::{Payload, ServiceRequest, ServiceResponse},
    error::InternalError,
    http::{Method, header::CONTENT_TYPE},
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::api::constants;
use crate::api::services::school::{ApiResponse, ErrorCode};
use crate::services::auth_service::{AuthService, AuthUser, NOT_LOGGED_ON, parse_authorization};

/// Session token authentication for the `/api` scope
///
/// Public paths pass through untouched; every other request must carry a
/// valid session token, and the resolved [`AuthUser`] is stored in the
/// request extensions for handlers to extract.
#[derive(Clone)]
pub struct TokenAuth {
    auth: Arc<AuthService>,
    api_prefix: String,
}

impl TokenAuth {
    pub fn new(auth: Arc<AuthService>, api_prefix: impl Into<String>) -> Self {
        Self {
            auth,
            api_prefix: api_prefix.into(),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for TokenAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = TokenAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TokenAuthMiddleware {
            service: Rc::new(service),
            auth: self.auth.clone(),
            api_prefix: self.api_prefix.clone(),
        }))
    }
}

pub struct TokenAuthMiddleware<S> {
    service: Rc<S>,
    auth: Arc<AuthService>,
    api_prefix: String,
}

/// 401 响应体，消息固定
fn not_logged_on_response() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((CONTENT_TYPE, "application/json; charset=utf-8"))
        .json(ApiResponse::<()> {
            code: ErrorCode::NotLoggedOn as i32,
            message: NOT_LOGGED_ON.to_string(),
            data: None,
        })
}

/// Whether `path` (already stripped of the API prefix) skips authentication
pub fn is_public_path(path: &str) -> bool {
    constants::PUBLIC_PATHS.iter().any(|public| {
        if public.ends_with('/') {
            path.starts_with(public)
        } else {
            path == *public || path.strip_prefix(public) == Some("/")
        }
    })
}

impl<S, B> TokenAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    /// Handle OPTIONS requests for CORS preflight
    fn handle_options_request(req: ServiceRequest) -> ServiceResponse<EitherBody<B>> {
        req.into_response(
            HttpResponse::NoContent()
                .insert_header((CONTENT_TYPE, "text/plain; charset=utf-8"))
                .finish()
                .map_into_right_body(),
        )
    }

    fn handle_unauthorized(req: ServiceRequest) -> ServiceResponse<EitherBody<B>> {
        debug!("Rejected unauthenticated request to {}", req.path());
        req.into_response(not_logged_on_response().map_into_right_body())
    }

    fn extract_token(req: &ServiceRequest) -> Option<String> {
        req.headers()
            .get(constants::AUTHORIZATION_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_authorization)
            .map(|s| s.to_string())
    }
}

impl<S, B> Service<ServiceRequest> for TokenAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();
        let auth = self.auth.clone();
        let api_prefix = self.api_prefix.clone();

        Box::pin(async move {
            if req.method() == Method::OPTIONS {
                return Ok(Self::handle_options_request(req));
            }

            let relative = req
                .path()
                .strip_prefix(api_prefix.as_str())
                .unwrap_or(req.path())
                .to_string();
            if is_public_path(&relative) {
                trace!("Public endpoint {}, skipping authentication", relative);
                return srv.call(req).await.map(ServiceResponse::map_into_left_body);
            }

            let Some(token) = Self::extract_token(&req) else {
                return Ok(Self::handle_unauthorized(req));
            };

            match auth.authenticate(&token).await {
                Ok(user) => {
                    trace!("Authenticated user {} ({})", user.id, user.role);
                    req.extensions_mut().insert(SessionToken(token));
                    req.extensions_mut().insert(user);
                    srv.call(req).await.map(ServiceResponse::map_into_left_body)
                }
                Err(e) => {
                    debug!("Session token rejected: {}", e);
                    Ok(Self::handle_unauthorized(req))
                }
            }
        })
    }
}

/// Raw session token of the current request, used by logout
#[derive(Clone, Debug)]
pub struct SessionToken(pub String);

impl FromRequest for AuthUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| InternalError::from_response(NOT_LOGGED_ON, not_logged_on_response()).into()),
        )
    }
}

impl FromRequest for SessionToken {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<SessionToken>()
                .cloned()
                .ok_or_else(|| InternalError::from_response(NOT_LOGGED_ON, not_logged_on_response()).into()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/health"));
        assert!(is_public_path("/auth/login"));
        assert!(is_public_path("/auth/login/"));
        assert!(is_public_path("/registration/submit"));
        assert!(is_public_path("/project-registration/available"));
        assert!(is_public_path("/project-registration/register"));
    }

    #[test]
    fn test_protected_paths() {
        assert!(!is_public_path("/auth/logout"));
        assert!(!is_public_path("/auth/login-as"));
        assert!(!is_public_path("/registration/requests"));
        assert!(!is_public_path("/courses"));
        assert!(!is_public_path("/healthz"));
    }
}
