//! Direct children of a virtual folder.

use crate::services::{mime, paths};
use serde::Serialize;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Retrievable content; `key` is the full blob name.
    File,
    /// Virtual sub-folder; `key` ends in the separator and can be listed again.
    FolderPrefix,
}

/// One child of a listed folder.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ListingEntry {
    pub kind: EntryKind,
    pub key: String,
}

impl ListingEntry {
    pub fn file(key: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::File,
            key: key.into(),
        }
    }

    pub fn folder(key: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::FolderPrefix,
            key: key.into(),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::FolderPrefix
    }

    /// Last path segment, for display.
    pub fn name(&self) -> &str {
        paths::display_name(&self.key)
    }

    /// Whether the file has an inline viewer. Folders never do.
    pub fn viewable(&self) -> bool {
        !self.is_folder() && mime::is_viewable(&self.key)
    }
}

/// Children of one folder in store order.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct ListingPage {
    pub entries: Vec<ListingEntry>,
}

impl ListingPage {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ListingEntry> {
        self.entries.iter()
    }
}

impl FromIterator<ListingEntry> for ListingPage {
    fn from_iter<I: IntoIterator<Item = ListingEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ListingPage {
    type Item = ListingEntry;
    type IntoIter = std::vec::IntoIter<ListingEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
