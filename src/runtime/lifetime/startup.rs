use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::get_config;
use crate::services::ServiceRegistry;
use crate::storage::{SeaOrmStorage, StorageFactory};

pub struct StartupContext {
    pub storage: Arc<SeaOrmStorage>,
    pub services: ServiceRegistry,
    pub api_prefix: String,
}

/// 准备服务器启动的上下文
/// 包括存储（含迁移）、服务注册表和路由前缀
pub async fn prepare_server_startup() -> Result<StartupContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    let storage = StorageFactory::create()
        .await
        .context("Failed to create storage backend")?;
    info!("Using storage backend: {}", storage.backend_name());

    check_jwt_secret_security();

    let services = ServiceRegistry::new(storage.clone());

    // 清理过期会话，失败不影响启动
    match services.auth.purge_expired_sessions().await {
        Ok(count) if count > 0 => info!("Removed {} expired sessions at startup", count),
        Ok(_) => {}
        Err(e) => warn!("Failed to purge expired sessions (non-fatal): {}", e),
    }

    let api_prefix = normalize_prefix(&get_config().server.api_prefix);
    info!("School API available at: {}", api_prefix);

    debug!(
        "Pre-startup processing completed in {} ms",
        start_time.elapsed().as_millis()
    );

    Ok(StartupContext {
        storage,
        services,
        api_prefix,
    })
}

/// 保证前缀以 `/` 开头且不以 `/` 结尾
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// 检查 JWT Secret 安全性
fn check_jwt_secret_security() {
    let config = get_config();
    let len = config.auth.jwt_secret.len();
    if len > 0 && len < 32 {
        warn!(
            "WARNING: JWT Secret is too short ({} bytes). \
            Recommended minimum is 32 bytes for security.",
            len
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/api"), "/api");
        assert_eq!(normalize_prefix("api/"), "/api");
        assert_eq!(normalize_prefix(" /api/v1/ "), "/api/v1");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix(""), "");
    }
}
