//! Helpers for sanitizing data before it is stored or logged.
//!
//! Job rows and spans are user-visible, so errors are bounded in length and
//! paths are reduced to their file name.

use std::path::Path;

/// Maximum number of characters kept from an error message.
pub const MAX_ERROR_CHARS: usize = 1000;

/// Truncates an error message to `MAX_ERROR_CHARS` characters.
pub fn truncate_error(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_CHARS) {
        Some((byte_idx, _)) => message[..byte_idx].to_string(),
        None => message.to_string(),
    }
}

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}
