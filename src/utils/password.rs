//! 密码哈希工具模块
//!
//! 使用 Argon2id 算法进行密码哈希和验证

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// 密码哈希错误
#[derive(Debug)]
pub enum PasswordError {
    HashError(String),
    VerifyError(String),
}

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HashError(msg) => write!(f, "Password hash error: {}", msg),
            Self::VerifyError(msg) => write!(f, "Password verify error: {}", msg),
        }
    }
}

impl std::error::Error for PasswordError {}

/// 对密码进行 Argon2id 哈希
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashError(e.to_string()))
}

/// 验证密码是否匹配哈希
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| PasswordError::VerifyError(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// 检测字符串是否是 Argon2 哈希格式
pub fn is_argon2_hash(s: &str) -> bool {
    s.starts_with("$argon2")
}

/// 校验用户存储的密码；账号未设置密码或哈希损坏时一律视为不匹配
pub fn check_stored_password(password: &str, stored: Option<&str>) -> bool {
    match stored {
        Some(hash) if is_argon2_hash(hash) => verify_password(password, hash).unwrap_or(false),
        _ => false,
    }
}

/// 处理用户输入的新密码
///
/// - `None` 或空字符串：返回 None（保持原值）
/// - 否则对密码进行哈希
pub fn process_new_password(password: Option<&str>) -> Result<Option<String>, PasswordError> {
    match password {
        Some(pwd) if !pwd.is_empty() => hash_password(pwd).map(Some),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let password = "test_password_123";
        let hash = hash_password(password).expect("hash should succeed");

        assert!(is_argon2_hash(&hash));
        assert!(verify_password(password, &hash).expect("verify should succeed"));
        assert!(!verify_password("wrong_password", &hash).expect("verify should succeed"));
    }

    #[test]
    fn test_check_stored_password() {
        let hash = hash_password("1234567").expect("hash should succeed");
        assert!(check_stored_password("1234567", Some(&hash)));
        assert!(!check_stored_password("7654321", Some(&hash)));
        assert!(!check_stored_password("1234567", None));
        assert!(!check_stored_password("1234567", Some("plaintext")));
    }

    #[test]
    fn test_process_new_password() {
        assert!(process_new_password(None).expect("ok").is_none());
        assert!(process_new_password(Some("")).expect("ok").is_none());
        let hashed = process_new_password(Some("secret")).expect("ok");
        assert!(hashed.is_some_and(|h| is_argon2_hash(&h)));
    }
}
