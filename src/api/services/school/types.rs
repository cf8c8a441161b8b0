//! API 通用类型定义

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// 输出目录常量
pub const TS_EXPORT_PATH: &str = "../web/src/services/types.generated.ts";

/// 统一响应信封 `{code, message, data}`
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    pub data: Option<T>,
}

/// 路径参数 `{id}`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IdPath {
    pub id: i32,
}

/// 健康检查响应
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub backend: String,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
