//! Text and clock helpers shared by models, repositories and the remote clients.

/// Trimmed text, or `None` for missing and blank input.
///
/// Optional form fields and environment values go through this before storage.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Trim a required text field, rejecting empty values with the field name.
pub fn require_text(value: &str, field: &str) -> crate::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(crate::Error::InvalidInput(format!("{field} cannot be empty")))
    } else {
        Ok(trimmed.to_string())
    }
}

/// First 180 characters of a remote error body, for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Local wall-clock timestamp in the `YYYY-MM-DD HH:MM:SS` form stored in text columns.
pub fn local_timestamp_text() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" folder-id ".to_string())),
            Some("folder-id".to_string())
        );
    }

    #[test]
    fn require_text_names_the_field() {
        let error = require_text("  ", "cnpj").unwrap_err();
        assert!(error.to_string().contains("cnpj"));
        assert_eq!(require_text(" 123 ", "cnpj").unwrap(), "123");
    }

    #[test]
    fn compact_text_limits_length() {
        let long = "x".repeat(500);
        assert_eq!(compact_text(&long).len(), 180);
    }
}
