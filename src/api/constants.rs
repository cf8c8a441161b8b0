//! API 模块常量定义

/// 会话令牌所在的请求头
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// 请求 ID 响应头
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 无需登录即可访问的路径（相对于 API 前缀）
///
/// 以 `/` 结尾的条目按前缀匹配。
pub const PUBLIC_PATHS: &[&str] = &[
    "/health",
    "/auth/login",
    "/auth/register",
    "/registration/open-courses",
    "/registration/submit",
    "/project-registration/",
];

/// 单个批量请求最多包含的行数
pub const MAX_BATCH_ROWS: usize = 5000;
