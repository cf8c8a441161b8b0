//! Mode routing
//!
//! - Server mode (HTTP server, default)
//! - Maintenance commands live in `interfaces::cli`

pub mod server;

pub use server::{configure_app, run_server};
