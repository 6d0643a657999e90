//! Error types for description parsing.

use thiserror::Error;

/// Error type for description parsing.
#[derive(Debug, Error)]
pub enum DescriptionError {
    /// The document is not well-formed XML or does not deserialize at all
    #[error("Parse error: {0}")]
    Parse(String),
    /// The document parsed but required fields are missing or invalid
    #[error("Malformed description: {0}")]
    Malformed(String),
}

/// Convenience Result type alias for description parsing.
pub type Result<T> = std::result::Result<T, DescriptionError>;

/// Trim a parsed field and reject it when absent or blank.
pub(crate) fn required(value: Option<String>, field: &str, context: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DescriptionError::Malformed(format!("{} is missing {}", context, field)))
}

/// Trim an optional field, mapping blank values to `None`.
pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
