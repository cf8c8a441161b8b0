//! Server mode
//!
//! This module contains the HTTP server startup logic.
//! It configures and starts the HTTP server with all necessary routes.

use actix_cors::Cors;
use actix_web::{
    App, HttpServer,
    middleware::{Compress, DefaultHeaders},
    web,
};
use anyhow::Result;
use std::time::Duration;
use tracing::{error, warn};

use crate::api::middleware::{RequestTrace, TokenAuth};
use crate::api::services::school::configure_api;
use crate::config::{CorsConfig, get_config};
use crate::runtime::lifetime;
use crate::services::ServiceRegistry;

/// Validate CORS configuration at startup (runs once)
fn validate_cors_config(cors_config: &CorsConfig) {
    if !cors_config.enabled {
        return;
    }

    if cors_config.allowed_origins.is_empty() {
        warn!(
            "CORS enabled but allowed_origins is empty. \
            No cross-origin requests will be allowed. \
            Set allowed_origins explicitly or use '[\"*\"]' for any origin."
        );
    }

    let is_any_origin = cors_config.allowed_origins.iter().any(|o| o == "*");
    if is_any_origin && cors_config.allow_credentials {
        error!(
            "SECURITY WARNING: allow_any_origin + allow_credentials is a dangerous combination! \
            Disabling credentials."
        );
    }
}

/// Build CORS middleware from configuration
fn build_cors_middleware(cors_config: &CorsConfig) -> Cors {
    // 未启用时使用浏览器默认的同源策略
    if !cors_config.enabled {
        return Cors::default();
    }

    let is_any_origin = cors_config.allowed_origins.iter().any(|o| o == "*");

    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .allowed_header("Content-Type")
        .allowed_header("Authorization")
        .allowed_header("Accept")
        .expose_headers(vec![crate::api::constants::REQUEST_ID_HEADER])
        .max_age(cors_config.max_age as usize);

    if is_any_origin {
        cors = cors.allow_any_origin();
    } else {
        for origin in &cors_config.allowed_origins {
            cors = cors.allowed_origin(origin);
        }
    }

    // any_origin + credentials 组合不开启凭证
    if cors_config.allow_credentials && !is_any_origin {
        cors = cors.supports_credentials();
    }

    cors
}

/// Register services and the authenticated API scope on an app
///
/// 服务端与集成测试共用同一份装配。
pub fn configure_app(cfg: &mut web::ServiceConfig, services: &ServiceRegistry, api_prefix: &str) {
    let max_upload = get_config().import.max_file_size_mb * 1024 * 1024;

    cfg.app_data(web::Data::new(services.storage.clone()))
        .app_data(web::Data::new(services.auth.clone()))
        .app_data(web::Data::new(services.users.clone()))
        .app_data(web::Data::new(services.academic.clone()))
        .app_data(web::Data::new(services.courses.clone()))
        .app_data(web::Data::new(services.enrollments.clone()))
        .app_data(web::Data::new(services.criteria.clone()))
        .app_data(web::Data::new(services.tasks.clone()))
        .app_data(web::Data::new(services.scores.clone()))
        .app_data(web::Data::new(services.projects.clone()))
        .app_data(web::Data::new(services.registration.clone()))
        .app_data(web::Data::new(services.dashboard.clone()))
        .app_data(web::JsonConfig::default().limit(max_upload))
        .app_data(web::PayloadConfig::new(max_upload))
        .service(
            web::scope(api_prefix)
                .wrap(TokenAuth::new(services.auth.clone(), api_prefix))
                .configure(configure_api),
        );
}

/// Run the HTTP server
///
/// This function:
/// 1. Prepares server components (storage, migrations, services)
/// 2. Configures and starts the HTTP server
/// 3. Stops accepting connections on Ctrl+C, drains workers, then closes the pool
///
/// **Note**: Logging system must be initialized before calling this function
pub async fn run_server() -> Result<()> {
    let startup = lifetime::startup::prepare_server_startup()
        .await
        .map_err(|e| {
            error!("Server startup failed: {}", e);
            e
        })?;

    let storage = startup.storage.clone();
    let services = startup.services.clone();
    let api_prefix = startup.api_prefix.clone();

    let config = get_config();
    let cpu_count = match config.server.cpu_count {
        0 => num_cpus::get(),
        n => n,
    }
    .min(32);
    warn!("Using {} CPU cores for the server", cpu_count);

    let cors_config = config.cors.clone();
    validate_cors_config(&cors_config);

    let server = HttpServer::new(move || {
        let cors = build_cors_middleware(&cors_config);

        App::new()
            .wrap(RequestTrace)
            .wrap(cors)
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("Cache-Control", "no-cache, no-store, must-revalidate")),
            )
            .configure(|cfg| configure_app(cfg, &services, &api_prefix))
    })
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_millis(5000))
    .client_disconnect_timeout(Duration::from_millis(1000))
    .disable_signals()
    .shutdown_timeout(30)
    .workers(cpu_count);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    warn!("Starting server at http://{}", bind_address);
    let server = server.bind(&bind_address)?.run();
    let handle = server.handle();

    // Ctrl+C 后优雅停止：不再接收新连接，等待进行中的请求完成
    actix_web::rt::spawn(async move {
        lifetime::shutdown::wait_for_signal().await;
        handle.stop(true).await;
    });

    server.await?;
    lifetime::shutdown::close_storage(storage).await;
    warn!("Graceful shutdown: all tasks completed");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_cors_disabled_is_noop() {
        let cfg = CorsConfig {
            enabled: false,
            allowed_origins: vec![],
            allow_credentials: true,
            max_age: 3600,
        };
        validate_cors_config(&cfg);
        let _ = build_cors_middleware(&cfg);
    }

    #[test]
    fn test_build_cors_with_origins() {
        let cfg = CorsConfig {
            enabled: true,
            allowed_origins: vec!["http://localhost:5173".to_string()],
            allow_credentials: true,
            max_age: 600,
        };
        let _ = build_cors_middleware(&cfg);
    }
}
