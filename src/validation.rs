use crate::error::{Result, TradeError};

/// Maximum message body length, in characters
pub const MAX_BODY_CHARS: usize = 400;
/// Maximum rating comment length, in characters
pub const MAX_COMMENT_CHARS: usize = 500;
/// Maximum length of a stored attachment reference
pub const MAX_ATTACHMENT_REF_CHARS: usize = 255;
/// Accepted image extensions for attachments
pub const ATTACHMENT_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

fn invalid(msg: impl Into<String>) -> TradeError {
    TradeError::ValidationFailed(msg.into())
}

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate a message body
    pub fn validate_body(body: &str) -> Result<()> {
        if body.trim().is_empty() {
            return Err(invalid("Message body cannot be empty"));
        }

        if body.chars().count() > MAX_BODY_CHARS {
            return Err(invalid(format!(
                "Message body too long (max {MAX_BODY_CHARS} characters)"
            )));
        }

        if body.contains('\0') {
            return Err(invalid("Message body contains invalid characters"));
        }

        Ok(())
    }

    /// Validate an optional rating comment
    pub fn validate_comment(comment: Option<&str>) -> Result<()> {
        let Some(comment) = comment else {
            return Ok(());
        };

        if comment.chars().count() > MAX_COMMENT_CHARS {
            return Err(invalid(format!(
                "Comment too long (max {MAX_COMMENT_CHARS} characters)"
            )));
        }

        Ok(())
    }

    /// Validate a rating score
    pub fn validate_score(score: i64) -> Result<u8> {
        match u8::try_from(score) {
            Ok(s @ 1..=5) => Ok(s),
            _ => Err(invalid(format!("Score must be between 1 and 5, got {score}"))),
        }
    }

    /// Validate a stored image reference
    pub fn validate_attachment_ref(reference: &str) -> Result<()> {
        if reference.trim().is_empty() {
            return Err(invalid("Attachment reference cannot be empty"));
        }

        if reference.chars().count() > MAX_ATTACHMENT_REF_CHARS {
            return Err(invalid(format!(
                "Attachment reference too long (max {MAX_ATTACHMENT_REF_CHARS} characters)"
            )));
        }

        // Check for path traversal attempts
        if reference.contains("..")
            || reference.starts_with('/')
            || reference.contains('~')
            || reference.contains('\0')
        {
            return Err(invalid(
                "Attachment reference contains potentially dangerous characters",
            ));
        }

        let extension = reference
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !ATTACHMENT_EXTENSIONS.contains(&extension.as_str()) {
            return Err(invalid("Attachment must be a png or jpeg image"));
        }

        Ok(())
    }

    /// Normalize an optional comment: trimmed, and absent when blank
    #[must_use]
    pub fn normalize_comment(comment: Option<&str>) -> Option<String> {
        comment
            .map(Self::sanitize_text)
            .filter(|c| !c.is_empty())
    }

    /// Sanitize text input
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t' || *c == '\r')
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Validate database URL
    pub fn validate_database_url(url: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Err(invalid("Database URL cannot be empty"));
        }

        if url.contains("://") && !url.starts_with("sqlite:") {
            return Err(invalid("Only SQLite databases are supported"));
        }

        if url.len() > 1000 {
            return Err(invalid("Database URL too long"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_length_counts_characters() {
        let body = "あ".repeat(MAX_BODY_CHARS);
        assert!(InputValidator::validate_body(&body).is_ok());
        let body = "a".repeat(MAX_BODY_CHARS + 1);
        assert!(InputValidator::validate_body(&body).is_err());
    }

    #[test]
    fn test_normalize_comment() {
        assert_eq!(InputValidator::normalize_comment(Some("   ")), None);
        assert_eq!(InputValidator::normalize_comment(None), None);
        assert_eq!(
            InputValidator::normalize_comment(Some(" good ")).as_deref(),
            Some("good")
        );
    }
}
