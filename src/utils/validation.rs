use crate::utils::error::{Result, TriageError};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field: &str, value: impl ToString, reason: impl Into<String>) -> TriageError {
    TriageError::InvalidConfigValueError {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    let url = Url::parse(url_str)
        .map_err(|e| invalid(field_name, url_str, format!("Invalid URL format: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(invalid(
            field_name,
            url_str,
            format!("Unsupported URL scheme: {}", scheme),
        )),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }
    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }
    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| TriageError::MissingConfigError {
        field: field_name.to_string(),
    })
}

// 以下為請求輸入驗證，失敗時回傳 ValidationError（API 對應 422）

pub fn validate_length(field_name: &str, value: &str, min: usize, max: Option<usize>) -> Result<()> {
    let len = value.chars().count();
    if len < min {
        return Err(TriageError::ValidationError {
            message: format!("{} must be at least {} characters", field_name, min),
        });
    }
    if let Some(max) = max {
        if len > max {
            return Err(TriageError::ValidationError {
                message: format!("{} must be at most {} characters", field_name, max),
            });
        }
    }
    Ok(())
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)+$")
            .expect("email pattern is valid")
    })
}

pub fn validate_email(field_name: &str, value: &str) -> Result<()> {
    if !email_regex().is_match(value) {
        return Err(TriageError::ValidationError {
            message: format!("{} is not a valid email address", field_name),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("llm.base_url", "https://api.openai.com/v1").is_ok());
        assert!(validate_url("llm.base_url", "http://localhost:11434/v1").is_ok());
        assert!(validate_url("llm.base_url", "").is_err());
        assert!(validate_url("llm.base_url", "not a url").is_err());
        assert!(validate_url("llm.base_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("policy.auto_send_confidence", 0.8, 0.0, 1.0).is_ok());
        assert!(validate_range("policy.auto_send_confidence", 1.2, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_validate_length_counts_chars() {
        assert!(validate_length("subject", "héllo", 1, Some(5)).is_ok());
        assert!(validate_length("subject", "", 1, Some(5)).is_err());
        assert!(validate_length("subject", "toolong", 1, Some(5)).is_err());
        assert!(validate_length("body", &"x".repeat(10_000), 1, None).is_ok());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("customer_email", "john.doe@gmail.com").is_ok());
        assert!(validate_email("customer_email", "a+tag@sub.example.co").is_ok());
        assert!(validate_email("customer_email", "not-an-email").is_err());
        assert!(validate_email("customer_email", "user@localhost").is_err());
    }
}
