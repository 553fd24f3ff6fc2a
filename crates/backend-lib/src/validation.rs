// ============================
// crates/backend-lib/src/validation.rs
// ============================
//! Inbound payload validation.

use crate::error::AppError;

/// Upper bound on message content after trimming, in bytes.
pub const MAX_CONTENT_BYTES: usize = 8 * 1024;

/// Maximum characters of content used for an implicit thread title.
pub const TITLE_MAX_CHARS: usize = 100;

/// Marker appended to a truncated implicit title.
pub const TITLE_ELLIPSIS: &str = "...";

/// Trim submitted content and enforce the emptiness/length bounds.
pub fn normalize_content(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::EmptyContent);
    }
    if trimmed.len() > MAX_CONTENT_BYTES {
        return Err(AppError::ContentTooLong);
    }
    Ok(trimmed.to_string())
}

/// Derive an implicit thread title from the leading message content:
/// the first [`TITLE_MAX_CHARS`] characters, with [`TITLE_ELLIPSIS`]
/// appended when the content was longer.
pub fn derive_title(content: &str) -> String {
    let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    if content.chars().count() > TITLE_MAX_CHARS {
        title.push_str(TITLE_ELLIPSIS);
    }
    title
}
