//! 健康检查端点（公开）

use actix_web::http::StatusCode;
use actix_web::{Responder, web};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, trace};

use crate::storage::SeaOrmStorage;

use super::error_code::ErrorCode;
use super::helpers::json_response;
use super::types::HealthResponse;

const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// 只做一次数据库 ping，不加载任何业务数据
pub async fn health_check(storage: web::Data<Arc<SeaOrmStorage>>) -> impl Responder {
    let start_time = Instant::now();
    trace!("Received health check request");

    let failure = match tokio::time::timeout(PING_TIMEOUT, storage.ping()).await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            error!("Database health check failed: {}", e);
            Some(format!("database error: {}", e))
        }
        Err(_) => {
            error!("Database health check timeout");
            Some("timeout".to_string())
        }
    };

    let healthy = failure.is_none();
    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        database: if healthy { "connected" } else { "unreachable" }.to_string(),
        backend: storage.backend_name().to_string(),
        response_time_ms: start_time.elapsed().as_millis() as u64,
        error: failure,
    };

    if healthy {
        json_response(StatusCode::OK, ErrorCode::Success, "OK", Some(body))
    } else {
        json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::ServiceUnavailable,
            "Service unavailable",
            Some(body),
        )
    }
}
