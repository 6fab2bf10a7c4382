//! Extensions the browser can render inline.
//!
//! Anything not in the table is served only as a download. `None` is a
//! normal outcome, not an error.

use crate::services::paths;

const MIME_RULES: [(&str, &str); 5] = [
    ("jpg", "image/jpg"),
    ("jpeg", "image/jpg"),
    ("png", "image/png"),
    ("txt", "text/plain"),
    ("pdf", "application/pdf"),
];

/// Case-insensitive lookup; the leading dot is optional.
pub fn resolve_mime(extension: &str) -> Option<&'static str> {
    let extension = extension.strip_prefix('.').unwrap_or(extension);
    MIME_RULES
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(extension))
        .map(|(_, mime)| *mime)
}

pub fn mime_for_key(key: &str) -> Option<&'static str> {
    paths::extension(key).and_then(resolve_mime)
}

pub fn is_viewable(key: &str) -> bool {
    mime_for_key(key).is_some()
}
