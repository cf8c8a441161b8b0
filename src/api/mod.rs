//! HTTP layer: session tokens, middleware and the `/api` endpoints

pub mod constants;
pub mod jwt;
pub mod middleware;
pub mod services;
