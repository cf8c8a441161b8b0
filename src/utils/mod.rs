pub mod password;

/// 生成随机令牌（字母数字）
pub fn generate_secure_token(length: usize) -> String {
    use std::iter;

    let chars = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

    iter::repeat_with(|| chars[rand::random_range(0..chars.len())] as char)
        .take(length)
        .collect()
}

/// 只保留数字（CI 号码规范化）
pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Title-case every whitespace separated word ("PÉREZ lópez" -> "Pérez López")
pub fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// 修剪字符串，空串返回 None
pub fn non_empty<S: AsRef<str>>(value: Option<S>) -> Option<String> {
    let value = value?;
    let trimmed = value.as_ref().trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Round to two decimals, the precision grades are stored with
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secure_token() {
        let token = generate_secure_token(32);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_digits_only() {
        assert_eq!(digits_only("12.345.678-LP"), "12345678");
        assert_eq!(digits_only("abc"), "");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("PÉREZ lópez"), "Pérez López");
        assert_eq!(title_case("  juan   carlos "), "Juan Carlos");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  x ")), Some("x".to_string()));
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty::<&str>(None), None);
        assert_eq!(non_empty(Some(String::from("y"))), Some("y".to_string()));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(17.333333), 17.33);
        assert_eq!(round2(86.666666), 86.67);
        assert_eq!(round2(0.0), 0.0);
    }
}
