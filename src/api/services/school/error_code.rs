//! 统一 API 错误码定义

use serde_repr::{Deserialize_repr, Serialize_repr};
use ts_rs::TS;

use super::types::TS_EXPORT_PATH;
use crate::errors::SchoolError;

/// API 错误码枚举
///
/// 使用 serde_repr 序列化为数字，ts-rs 自动生成 TypeScript 类型。
/// 按千位分域：
/// - 0: 成功
/// - 1000-1099: 通用错误
/// - 2000-2099: 认证与权限
/// - 3000-3099: 数据校验与持久化
/// - 4000-4099: 名单导入
/// - 5000-5099: 成绩计算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
#[ts(rename = "ErrorCode")]
#[ts(repr(enum))]
#[repr(i32)]
pub enum ErrorCode {
    // 成功
    Success = 0,

    // 通用错误 1000-1099
    BadRequest = 1000,
    NotFound = 1004,
    InternalServerError = 1005,
    BatchSizeTooLarge = 1010,
    FileTooLarge = 1011,
    InvalidDateFormat = 1012,
    ServiceUnavailable = 1030,

    // 认证与权限 2000-2099
    AuthFailed = 2000,
    NotLoggedOn = 2001,
    PermissionDenied = 2002,
    RateLimitExceeded = 2004,

    // 数据校验与持久化 3000-3099
    ValidationFailed = 3000,
    Conflict = 3001,
    DatabaseError = 3002,

    // 名单导入 4000-4099
    ImportFailed = 4000,
    InvalidMultipartData = 4002,
    FileReadError = 4003,
    FileMissing = 4004,

    // 成绩计算 5000-5099
    GradingFailed = 5000,
}

impl From<&SchoolError> for ErrorCode {
    fn from(err: &SchoolError) -> Self {
        match err {
            SchoolError::Validation(_) => ErrorCode::ValidationFailed,
            SchoolError::NotFound(_) => ErrorCode::NotFound,
            SchoolError::Unauthorized(_) => ErrorCode::AuthFailed,
            SchoolError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            SchoolError::Conflict(_) => ErrorCode::Conflict,
            SchoolError::Import(_) => ErrorCode::ImportFailed,
            SchoolError::Serialization(_) => ErrorCode::BadRequest,
            SchoolError::DateParse(_) => ErrorCode::InvalidDateFormat,
            SchoolError::FileOperation(_) => ErrorCode::FileReadError,
            SchoolError::DatabaseConfig(_)
            | SchoolError::DatabaseConnection(_)
            | SchoolError::DatabaseOperation(_) => ErrorCode::DatabaseError,
            SchoolError::Grading(_) => ErrorCode::GradingFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_as_number() {
        assert_eq!(serde_json::to_string(&ErrorCode::NotLoggedOn).expect("json"), "2001");
        assert_eq!(serde_json::to_string(&ErrorCode::Success).expect("json"), "0");
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            ErrorCode::from(&SchoolError::conflict("dup")),
            ErrorCode::Conflict
        );
        assert_eq!(
            ErrorCode::from(&SchoolError::database_operation("boom")),
            ErrorCode::DatabaseError
        );
        assert_eq!(
            ErrorCode::from(&SchoolError::unauthorized("Wrong credentials")),
            ErrorCode::AuthFailed
        );
    }
}
