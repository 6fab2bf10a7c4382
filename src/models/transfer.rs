//! Results of uploads and deletes.

use bytes::Bytes;
use serde::Serialize;

/// One file received from a client, ready to be written under a folder.
#[derive(Clone, Debug)]
pub struct UploadFile {
    pub file_name: String,
    pub data: Bytes,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Blob key the file was written to.
    pub key: String,
    pub size_bytes: usize,
}

/// Outcome of a completed recursive folder delete.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct FolderDeleteReport {
    pub prefix: String,
    /// Objects removed by this call.
    pub deleted: usize,
    /// Objects that were already gone (earlier attempt or concurrent delete).
    pub already_absent: usize,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeleteOutcome {
    File { key: String },
    Folder(FolderDeleteReport),
}
