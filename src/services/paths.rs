//! Key helpers for the virtual folder hierarchy.
//!
//! Folders do not exist in the store. A key ending in [`SEPARATOR`] is a
//! folder marker, and listings group keys into folders by the same
//! character. Everything in here is pure string handling.

use crate::services::blob_service::{BrowserError, BrowserResult};

/// Path separator used for both folder markers and listing delimiters.
pub const SEPARATOR: char = '/';

/// Root sentinel accepted (along with the empty string) by folder operations.
pub const ROOT: &str = "/";

/// Is `key` a folder marker? Zero-length keys are rejected rather than
/// classified either way.
pub fn is_folder(key: &str) -> BrowserResult<bool> {
    match key.chars().last() {
        Some(last) => Ok(last == SEPARATOR),
        None => Err(BrowserError::InvalidKey("key must not be empty".into())),
    }
}

pub fn is_root(folder: &str) -> bool {
    folder.is_empty() || folder == ROOT
}

/// Listing prefix for a folder path: the root sentinel maps to `""`.
pub fn folder_prefix(folder: &str) -> &str {
    if is_root(folder) { "" } else { folder }
}

/// Join a folder and an uploaded file name into a blob key.
///
/// Only the last segment of `file_name` is kept (browsers may send full
/// client paths), and exactly one separator sits between the two parts.
pub fn join_key(folder: &str, file_name: &str) -> BrowserResult<String> {
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(BrowserError::InvalidKey(format!(
            "`{file_name}` is not a usable file name"
        )));
    }

    let folder = folder_prefix(folder.trim()).trim_start_matches(SEPARATOR);
    let folder = folder.trim_end_matches(SEPARATOR);
    if folder.is_empty() {
        Ok(name.to_string())
    } else {
        Ok(format!("{folder}{SEPARATOR}{name}"))
    }
}

/// Folder containing `key`. Top-level keys live in [`ROOT`].
pub fn parent_folder(key: &str) -> String {
    let trimmed = key.strip_suffix(SEPARATOR).unwrap_or(key);
    match trimmed.rfind(SEPARATOR) {
        Some(pos) => trimmed[..=pos].to_string(),
        None => ROOT.to_string(),
    }
}

/// Last path segment. Folder names keep their trailing separator.
pub fn display_name(key: &str) -> &str {
    let trimmed = key.strip_suffix(SEPARATOR).unwrap_or(key);
    let start = trimmed.rfind(SEPARATOR).map(|pos| pos + 1).unwrap_or(0);
    &key[start..]
}

/// Extension of the key's last segment, including the leading dot.
pub fn extension(key: &str) -> Option<&str> {
    let name = display_name(key);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(pos) => Some(&name[pos..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_iff_trailing_separator() {
        for (key, expected) in [
            ("a/", true),
            ("/", true),
            ("a/b/", true),
            ("a", false),
            ("a/x.txt", false),
            ("a/b", false),
        ] {
            assert_eq!(is_folder(key).unwrap(), expected, "{key}");
            assert_eq!(is_folder(key).unwrap(), key.ends_with(SEPARATOR));
        }
    }

    #[test]
    fn empty_key_is_invalid() {
        assert!(matches!(is_folder(""), Err(BrowserError::InvalidKey(_))));
    }

    #[test]
    fn root_sentinels_map_to_empty_prefix() {
        assert_eq!(folder_prefix("/"), "");
        assert_eq!(folder_prefix(""), "");
        assert_eq!(folder_prefix("a/"), "a/");
    }

    #[test]
    fn join_key_uses_one_separator() {
        assert_eq!(join_key("/", "x.txt").unwrap(), "x.txt");
        assert_eq!(join_key("", "x.txt").unwrap(), "x.txt");
        assert_eq!(join_key("a/", "x.txt").unwrap(), "a/x.txt");
        assert_eq!(join_key("a", "x.txt").unwrap(), "a/x.txt");
        assert_eq!(join_key("/a/b/", "x.txt").unwrap(), "a/b/x.txt");
    }

    #[test]
    fn join_key_strips_client_paths() {
        assert_eq!(
            join_key("docs/", "C:\\Users\\me\\report.pdf").unwrap(),
            "docs/report.pdf"
        );
        assert_eq!(join_key("docs/", "../etc/passwd").unwrap(), "docs/passwd");
    }

    #[test]
    fn join_key_rejects_empty_names() {
        assert!(matches!(
            join_key("a/", ""),
            Err(BrowserError::InvalidKey(_))
        ));
        assert!(matches!(
            join_key("a/", "dir/"),
            Err(BrowserError::InvalidKey(_))
        ));
        assert!(matches!(
            join_key("a/", ".."),
            Err(BrowserError::InvalidKey(_))
        ));
    }

    #[test]
    fn parent_of_files_and_folders() {
        assert_eq!(parent_folder("a/b/y.png"), "a/b/");
        assert_eq!(parent_folder("a/b/"), "a/");
        assert_eq!(parent_folder("a/"), "/");
        assert_eq!(parent_folder("c.txt"), "/");
    }

    #[test]
    fn display_names() {
        assert_eq!(display_name("a/b/y.png"), "y.png");
        assert_eq!(display_name("a/b/"), "b/");
        assert_eq!(display_name("c.txt"), "c.txt");
    }

    #[test]
    fn extensions() {
        assert_eq!(extension("a/b/y.png"), Some(".png"));
        assert_eq!(extension("a/archive.tar.gz"), Some(".gz"));
        assert_eq!(extension("a/README"), None);
        assert_eq!(extension("a/.env"), None);
        assert_eq!(extension("a.d/README"), None);
    }
}
