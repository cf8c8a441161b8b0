//! CLI interface module
//!
//! This module provides the maintenance commands of schoolhub.

pub mod commands;

use std::fmt;
use std::sync::Arc;

use crate::cli::Commands;
use crate::errors::SchoolError;
use crate::storage::{SeaOrmStorage, StorageFactory};
use commands::{config_generate, create_admin, purge_sessions, recalculate_course};

#[derive(Debug)]
pub enum CliError {
    StorageError(String),
    CommandError(String),
}

impl CliError {
    /// Format as simple output
    pub fn format_simple(&self) -> String {
        match self {
            CliError::StorageError(msg) => format!("Storage error: {}", msg),
            CliError::CommandError(msg) => format!("Command error: {}", msg),
        }
    }

    /// Format as colored output
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        match self {
            CliError::StorageError(msg) => {
                format!("{} {}", "Storage error:".red().bold(), msg.white())
            }
            CliError::CommandError(msg) => {
                format!("{} {}", "Command error:".red().bold(), msg.white())
            }
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for CliError {}

impl From<SchoolError> for CliError {
    fn from(err: SchoolError) -> Self {
        match err {
            SchoolError::DatabaseConfig(_) | SchoolError::DatabaseConnection(_) => {
                CliError::StorageError(err.to_string())
            }
            _ => CliError::CommandError(err.to_string()),
        }
    }
}

async fn open_storage() -> Result<Arc<SeaOrmStorage>, CliError> {
    StorageFactory::create()
        .await
        .map_err(|e| CliError::StorageError(e.to_string()))
}

/// Run a CLI command from clap-parsed input
pub async fn run_cli_command(cmd: Commands) -> Result<(), CliError> {
    match cmd {
        // 不需要数据库连接
        Commands::GenerateConfig { output_path, force } => config_generate(output_path, force),

        Commands::CreateAdmin {
            email,
            password,
            first_name,
            surname,
        } => create_admin(open_storage().await?, email, password, first_name, surname).await,

        Commands::Recalculate { course } => {
            recalculate_course(open_storage().await?, course).await
        }

        Commands::PurgeSessions => purge_sessions(open_storage().await?).await,

        Commands::Serve => Err(CliError::CommandError(
            "serve is not a maintenance command".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_school_error_mapping() {
        let err: CliError = SchoolError::database_connection("refused").into();
        assert!(matches!(err, CliError::StorageError(_)));

        let err: CliError = SchoolError::conflict("Email taken").into();
        assert!(matches!(err, CliError::CommandError(_)));
        assert!(err.format_simple().starts_with("Command error:"));
    }
}
