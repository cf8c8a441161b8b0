pub mod auth;
pub mod request_trace;

pub use auth::{SessionToken, TokenAuth, is_public_path};
pub use request_trace::{RequestId, RequestTrace};
