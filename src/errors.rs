use std::fmt;

use actix_web::http::StatusCode;

#[derive(Debug, Clone)]
pub enum SchoolError {
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    FileOperation(String),
    Validation(String),
    NotFound(String),
    Unauthorized(String),
    PermissionDenied(String),
    Conflict(String),
    Import(String),
    Serialization(String),
    DateParse(String),
    Grading(String),
}

impl SchoolError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            SchoolError::DatabaseConfig(_) => "E001",
            SchoolError::DatabaseConnection(_) => "E002",
            SchoolError::DatabaseOperation(_) => "E003",
            SchoolError::FileOperation(_) => "E004",
            SchoolError::Validation(_) => "E005",
            SchoolError::NotFound(_) => "E006",
            SchoolError::Unauthorized(_) => "E007",
            SchoolError::PermissionDenied(_) => "E008",
            SchoolError::Conflict(_) => "E009",
            SchoolError::Import(_) => "E010",
            SchoolError::Serialization(_) => "E011",
            SchoolError::DateParse(_) => "E012",
            SchoolError::Grading(_) => "E013",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            SchoolError::DatabaseConfig(_) => "Database Configuration Error",
            SchoolError::DatabaseConnection(_) => "Database Connection Error",
            SchoolError::DatabaseOperation(_) => "Database Operation Error",
            SchoolError::FileOperation(_) => "File Operation Error",
            SchoolError::Validation(_) => "Validation Error",
            SchoolError::NotFound(_) => "Resource Not Found",
            SchoolError::Unauthorized(_) => "Unauthorized",
            SchoolError::PermissionDenied(_) => "Permission Denied",
            SchoolError::Conflict(_) => "Conflict",
            SchoolError::Import(_) => "Import Error",
            SchoolError::Serialization(_) => "Serialization Error",
            SchoolError::DateParse(_) => "Date Parse Error",
            SchoolError::Grading(_) => "Grading Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            SchoolError::DatabaseConfig(msg)
            | SchoolError::DatabaseConnection(msg)
            | SchoolError::DatabaseOperation(msg)
            | SchoolError::FileOperation(msg)
            | SchoolError::Validation(msg)
            | SchoolError::NotFound(msg)
            | SchoolError::Unauthorized(msg)
            | SchoolError::PermissionDenied(msg)
            | SchoolError::Conflict(msg)
            | SchoolError::Import(msg)
            | SchoolError::Serialization(msg)
            | SchoolError::DateParse(msg)
            | SchoolError::Grading(msg) => msg,
        }
    }

    /// HTTP 状态码映射
    ///
    /// Permission and conflict errors are reported as validation failures (400);
    /// clients only distinguish auth (401), missing (404) and server faults (500).
    pub fn http_status(&self) -> StatusCode {
        match self {
            SchoolError::Validation(_)
            | SchoolError::PermissionDenied(_)
            | SchoolError::Conflict(_)
            | SchoolError::Import(_)
            | SchoolError::DateParse(_)
            | SchoolError::Serialization(_) => StatusCode::BAD_REQUEST,
            SchoolError::NotFound(_) => StatusCode::NOT_FOUND,
            SchoolError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            SchoolError::DatabaseConfig(_)
            | SchoolError::DatabaseConnection(_)
            | SchoolError::DatabaseOperation(_)
            | SchoolError::FileOperation(_)
            | SchoolError::Grading(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 格式化为彩色输出（用于 CLI 模式）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for SchoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for SchoolError {}

// 便捷的构造函数
impl SchoolError {
    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        SchoolError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        SchoolError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        SchoolError::DatabaseOperation(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        SchoolError::FileOperation(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        SchoolError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        SchoolError::NotFound(msg.into())
    }

    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        SchoolError::Unauthorized(msg.into())
    }

    pub fn permission_denied<T: Into<String>>(msg: T) -> Self {
        SchoolError::PermissionDenied(msg.into())
    }

    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        SchoolError::Conflict(msg.into())
    }

    pub fn import<T: Into<String>>(msg: T) -> Self {
        SchoolError::Import(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        SchoolError::Serialization(msg.into())
    }

    pub fn date_parse<T: Into<String>>(msg: T) -> Self {
        SchoolError::DateParse(msg.into())
    }

    pub fn grading<T: Into<String>>(msg: T) -> Self {
        SchoolError::Grading(msg.into())
    }
}

impl From<sea_orm::DbErr> for SchoolError {
    fn from(err: sea_orm::DbErr) -> Self {
        SchoolError::DatabaseOperation(err.to_string())
    }
}

impl From<std::io::Error> for SchoolError {
    fn from(err: std::io::Error) -> Self {
        SchoolError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for SchoolError {
    fn from(err: serde_json::Error) -> Self {
        SchoolError::Serialization(err.to_string())
    }
}

impl From<chrono::ParseError> for SchoolError {
    fn from(err: chrono::ParseError) -> Self {
        SchoolError::DateParse(err.to_string())
    }
}

impl From<csv::Error> for SchoolError {
    fn from(err: csv::Error) -> Self {
        SchoolError::Import(format!("CSV parse error: {}", err))
    }
}

impl From<crate::utils::password::PasswordError> for SchoolError {
    fn from(err: crate::utils::password::PasswordError) -> Self {
        SchoolError::DatabaseOperation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SchoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let errors = [
            SchoolError::database_config("x"),
            SchoolError::database_connection("x"),
            SchoolError::database_operation("x"),
            SchoolError::file_operation("x"),
            SchoolError::validation("x"),
            SchoolError::not_found("x"),
            SchoolError::unauthorized("x"),
            SchoolError::permission_denied("x"),
            SchoolError::conflict("x"),
            SchoolError::import("x"),
            SchoolError::serialization("x"),
            SchoolError::date_parse("x"),
            SchoolError::grading("x"),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            SchoolError::validation("bad").http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SchoolError::permission_denied("role").http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SchoolError::unauthorized("nope").http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            SchoolError::not_found("gone").http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SchoolError::grading("boom").http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display_uses_simple_format() {
        let err = SchoolError::not_found("Course 7 not found");
        assert_eq!(err.to_string(), "Resource Not Found: Course 7 not found");
        assert_eq!(err.message(), "Course 7 not found");
    }

    #[test]
    fn test_from_db_err() {
        let err: SchoolError = sea_orm::DbErr::Custom("locked".into()).into();
        assert!(matches!(err, SchoolError::DatabaseOperation(_)));
        assert!(err.message().contains("locked"));
    }
}
