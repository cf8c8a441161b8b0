//! CLI command implementations

mod config_gen;
mod create_admin;
mod maintenance;

pub use config_gen::config_generate;
pub use create_admin::create_admin;
pub use maintenance::{purge_sessions, recalculate_course};
