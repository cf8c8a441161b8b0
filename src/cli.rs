//! Command-line interface definitions using clap

use clap::{Parser, Subcommand};

/// SchoolHub - school administration backend
#[derive(Parser)]
#[command(name = "schoolhub")]
#[command(version)]
#[command(about = "School administration backend with a hierarchical grading engine", long_about = None)]
pub struct Cli {
    /// Configuration file path (default: config.toml)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Create an ADMIN account
    CreateAdmin {
        /// Login email of the new admin
        #[arg(long)]
        email: String,

        /// Password (if not provided, will prompt interactively)
        #[arg(long)]
        password: Option<String>,

        /// First name
        #[arg(long, default_value = "Admin")]
        first_name: String,

        /// Paternal surname
        #[arg(long, default_value = "Admin")]
        surname: String,
    },

    /// Generate example configuration file
    GenerateConfig {
        /// Output path (default: config.example.toml)
        output_path: Option<String>,

        /// Force overwrite without confirmation
        #[arg(long)]
        force: bool,
    },

    /// Recompute criterion scores and final grades of one course
    Recalculate {
        /// Course id
        #[arg(long)]
        course: i32,
    },

    /// Remove expired sessions
    PurgeSessions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_is_serve() {
        let cli = Cli::parse_from(["schoolhub"]);
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_create_admin() {
        let cli = Cli::parse_from([
            "schoolhub",
            "-c",
            "prod.toml",
            "create-admin",
            "--email",
            "root@school.test",
        ]);
        assert_eq!(cli.config.as_deref(), Some("prod.toml"));
        match cli.command {
            Some(Commands::CreateAdmin {
                email,
                password,
                first_name,
                ..
            }) => {
                assert_eq!(email, "root@school.test");
                assert!(password.is_none());
                assert_eq!(first_name, "Admin");
            }
            _ => panic!("expected create-admin"),
        }
    }

    #[test]
    fn test_parse_recalculate_requires_course() {
        assert!(Cli::try_parse_from(["schoolhub", "recalculate"]).is_err());
        let cli = Cli::try_parse_from(["schoolhub", "recalculate", "--course", "7"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Recalculate { course: 7 })
        ));
    }
}
