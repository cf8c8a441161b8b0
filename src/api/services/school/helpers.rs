//! API 帮助函数

use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::api::constants::MAX_BATCH_ROWS;
use crate::errors::SchoolError;

use super::error_code::ErrorCode;
use super::types::ApiResponse;

/// 构建 JSON 响应
pub fn json_response<T: Serialize>(
    status: StatusCode,
    code: ErrorCode,
    message: impl Into<String>,
    data: Option<T>,
) -> HttpResponse {
    HttpResponse::build(status)
        .append_header(("Content-Type", "application/json; charset=utf-8"))
        .json(ApiResponse {
            code: code as i32,
            message: message.into(),
            data,
        })
}

/// 构建成功响应
pub fn success_response<T: Serialize>(data: T) -> HttpResponse {
    json_response(StatusCode::OK, ErrorCode::Success, "OK", Some(data))
}

/// 构建错误响应
pub fn error_response(status: StatusCode, error_code: ErrorCode, message: &str) -> HttpResponse {
    json_response::<()>(status, error_code, message, None)
}

/// 从 SchoolError 构建错误响应（自动映射 HTTP 状态码和 ErrorCode）
pub fn error_from_school(err: &SchoolError) -> HttpResponse {
    let status = err.http_status();
    if status.is_server_error() {
        error!("API: {}", err);
    }
    error_response(status, ErrorCode::from(err), err.message())
}

/// 统一 Result → HttpResponse 转换
///
/// 成功时返回 200 OK + JSON 数据，失败时自动映射 SchoolError。
pub fn api_result<T, E>(result: Result<T, E>) -> HttpResponse
where
    T: Serialize,
    E: Into<SchoolError>,
{
    match result {
        Ok(data) => success_response(data),
        Err(e) => {
            let err: SchoolError = e.into();
            error_from_school(&err)
        }
    }
}

/// 批量请求行数检查
pub fn check_batch_size(rows: usize) -> Result<(), SchoolError> {
    if rows > MAX_BATCH_ROWS {
        Err(SchoolError::validation(format!(
            "Batch size {} exceeds the limit of {} rows",
            rows, MAX_BATCH_ROWS
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_result_maps_status() {
        let ok: Result<i32, SchoolError> = Ok(1);
        assert_eq!(api_result(ok).status(), StatusCode::OK);

        let missing: Result<i32, SchoolError> = Err(SchoolError::not_found("Course id not found"));
        assert_eq!(api_result(missing).status(), StatusCode::NOT_FOUND);

        let denied: Result<i32, SchoolError> = Err(SchoolError::permission_denied("nope"));
        assert_eq!(api_result(denied).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_batch_size_limit() {
        assert!(check_batch_size(MAX_BATCH_ROWS).is_ok());
        assert!(check_batch_size(MAX_BATCH_ROWS + 1).is_err());
    }
}
