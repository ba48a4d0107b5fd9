//! Input validation applied before anything leaves the client.

use thiserror::Error;

use crate::constants::{MAX_MESSAGE_CHARS, MAX_UPLOAD_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Message is {0} characters, limit is {1}")]
    MessageTooLong(usize, usize),
    #[error("File name is empty")]
    EmptyFileName,
    #[error("File is empty")]
    EmptyFile,
    #[error("File is {0} bytes, limit is {1}")]
    FileTooLarge(usize, usize),
}

/// Check a message body before sending.  Returns the trimmed content, which
/// is what gets sent and what the optimistic entry carries.
pub fn validate_content(content: &str) -> Result<String, ValidationError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    let chars = trimmed.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(ValidationError::MessageTooLong(chars, MAX_MESSAGE_CHARS));
    }
    Ok(trimmed.to_owned())
}

/// Check an attachment before uploading.
pub fn validate_upload(file_name: &str, size: usize) -> Result<(), ValidationError> {
    if file_name.trim().is_empty() {
        return Err(ValidationError::EmptyFileName);
    }
    if size == 0 {
        return Err(ValidationError::EmptyFile);
    }
    if size > MAX_UPLOAD_SIZE {
        return Err(ValidationError::FileTooLarge(size, MAX_UPLOAD_SIZE));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_trimmed() {
        assert_eq!(validate_content("  hello  ").unwrap(), "hello");
    }

    #[test]
    fn whitespace_only_content_is_rejected() {
        assert_eq!(validate_content("   \n\t "), Err(ValidationError::EmptyMessage));
    }

    #[test]
    fn over_limit_content_is_rejected_by_char_count() {
        // Multibyte characters count once each, not per byte.
        let content = "ü".repeat(MAX_MESSAGE_CHARS + 1);
        assert_eq!(
            validate_content(&content),
            Err(ValidationError::MessageTooLong(
                MAX_MESSAGE_CHARS + 1,
                MAX_MESSAGE_CHARS
            ))
        );
        assert!(validate_content(&"ü".repeat(MAX_MESSAGE_CHARS)).is_ok());
    }

    #[test]
    fn upload_limits() {
        assert!(validate_upload("photo.png", 1024).is_ok());
        assert_eq!(validate_upload("", 1024), Err(ValidationError::EmptyFileName));
        assert_eq!(validate_upload("photo.png", 0), Err(ValidationError::EmptyFile));
        assert_eq!(
            validate_upload("big.bin", MAX_UPLOAD_SIZE + 1),
            Err(ValidationError::FileTooLarge(MAX_UPLOAD_SIZE + 1, MAX_UPLOAD_SIZE))
        );
    }
}
