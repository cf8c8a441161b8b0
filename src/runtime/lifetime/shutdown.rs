use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::storage::SeaOrmStorage;

/// 关闭超时时间（秒）
const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// 等待 Ctrl+C
pub async fn wait_for_signal() {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, draining in-flight requests...");
        }
        Err(e) => {
            warn!(
                "Failed to listen for Ctrl+C: {}. Proceeding with shutdown anyway.",
                e
            );
        }
    }
}

/// 关闭数据库连接池（HTTP server 已停止之后调用）
pub async fn close_storage(storage: Arc<SeaOrmStorage>) {
    match timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), storage.close()).await {
        Ok(Ok(())) => {
            info!("Database pool closed");
        }
        Ok(Err(e)) => {
            error!("Failed to close database pool: {}", e);
        }
        Err(_) => {
            error!(
                "Closing database pool timed out after {} seconds",
                SHUTDOWN_TIMEOUT_SECS
            );
        }
    }
}
