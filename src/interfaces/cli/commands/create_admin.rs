//! create-admin CLI 命令

use colored::Colorize;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use crate::interfaces::cli::CliError;
use crate::services::user_service::CreateUserRequest;
use crate::services::{AuthService, UserService};
use crate::storage::{Role, SeaOrmStorage};

const MIN_PASSWORD_LEN: usize = 8;

/// 交互式输入密码（带确认）
fn prompt_password_with_confirm() -> Result<String, CliError> {
    if !io::stdin().is_terminal() {
        return Err(CliError::CommandError(
            "No password provided. Use --password or run interactively.".to_string(),
        ));
    }

    let read = |prompt: &str| -> Result<String, CliError> {
        print!("{}", prompt);
        io::stdout()
            .flush()
            .map_err(|e| CliError::CommandError(e.to_string()))?;
        rpassword::read_password()
            .map_err(|e| CliError::CommandError(format!("Failed to read password: {}", e)))
    };

    let password = read("Enter password: ")?;
    let confirm = read("Confirm password: ")?;
    if password != confirm {
        return Err(CliError::CommandError("Passwords do not match".to_string()));
    }
    Ok(password)
}

fn check_password(password: &str) -> Result<(), CliError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CliError::CommandError(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// 运行 create-admin 命令
pub async fn create_admin(
    storage: Arc<SeaOrmStorage>,
    email: String,
    password: Option<String>,
    first_name: String,
    surname: String,
) -> Result<(), CliError> {
    let password = match password {
        Some(p) => p,
        None => prompt_password_with_confirm()?,
    };
    check_password(&password)?;

    let auth = Arc::new(AuthService::new(storage.clone()));
    let users = UserService::new(storage, auth);
    let created = users
        .create_user(CreateUserRequest {
            email: Some(email),
            password: Some(password),
            first_name,
            paternal_surname: surname,
            maternal_surname: String::new(),
            ci_number: None,
            phone: None,
            role: Role::Admin,
            is_active: Some(true),
            is_staff: Some(true),
        })
        .await?;

    println!(
        "{} Admin account created (id {}, {})",
        "✓".green().bold(),
        created.id,
        created.email.unwrap_or_default()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_password_length() {
        assert!(check_password("short").is_err());
        assert!(check_password("long-enough").is_ok());
    }
}
