//! HTTP handlers for browsing and managing files.
//! Streams file bodies to avoid buffering in memory and delegates storage
//! concerns to `BlobService`.

use crate::{
    errors::AppError,
    models::{
        listing::{EntryKind, ListingPage},
        transfer::{DeleteOutcome, UploadFile, UploadReceipt},
    },
    services::{
        blob_service::{BlobService, FileContent},
        paths,
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Query params accepted by `GET /files`.
#[derive(Debug, Deserialize)]
pub struct FolderQuery {
    pub folder: Option<String>,
}

/// One folder's contents as rendered to clients.
#[derive(Debug, Serialize)]
pub struct FolderView {
    pub current_folder: String,
    /// `None` at the container root.
    pub parent_folder: Option<String>,
    pub entries: Vec<EntryView>,
}

#[derive(Debug, Serialize)]
pub struct EntryView {
    pub kind: EntryKind,
    pub key: String,
    pub name: String,
    pub viewable: bool,
}

impl FolderView {
    fn new(folder: &str, page: ListingPage) -> Self {
        let current_folder = if paths::is_root(folder) {
            paths::ROOT.to_string()
        } else {
            folder.to_string()
        };
        let parent_folder =
            (!paths::is_root(folder)).then(|| paths::parent_folder(&current_folder));
        let entries = page
            .iter()
            .map(|entry| EntryView {
                kind: entry.kind,
                key: entry.key.clone(),
                name: entry.name().to_string(),
                viewable: entry.viewable(),
            })
            .collect();

        Self {
            current_folder,
            parent_folder,
            entries,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub folder: String,
    pub uploaded: Vec<UploadReceipt>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub outcome: DeleteOutcome,
    /// The containing folder after the delete, `None` if it could not be
    /// listed. The delete itself has happened either way.
    pub folder: Option<FolderView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_error: Option<String>,
}

/// `GET /files?folder=` — list one folder, the root by default.
pub async fn list_files(
    State(service): State<BlobService>,
    Query(q): Query<FolderQuery>,
) -> Result<Json<FolderView>, AppError> {
    let folder = q.folder.unwrap_or_else(|| paths::ROOT.to_string());
    Ok(Json(folder_view(&service, &folder).await?))
}

/// `GET /view/{*path}` — folders list, files render inline.
pub async fn view_file(
    State(service): State<BlobService>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    if paths::is_folder(&path)? {
        return Ok(Json(folder_view(&service, &path).await?).into_response());
    }

    let content = service.view_file(&path).await?;
    Ok(stream_response(content, Disposition::Inline))
}

/// `GET /download/{*path}` — always a binary attachment.
pub async fn download_file(
    State(service): State<BlobService>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let content = service.get_file(&path).await?;
    Ok(stream_response(content, Disposition::Attachment))
}

/// `DELETE /files/{*path}` — delete a file, or a folder and its contents,
/// then show the containing folder. A failure to list that folder is
/// reported in the body; it does not turn the completed delete into an error.
pub async fn delete_entry(
    State(service): State<BlobService>,
    Path(path): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let outcome = service.delete_file(&path).await?;
    let parent = paths::parent_folder(&path);
    let (folder, folder_error) = match service.list_children(&parent).await {
        Ok(page) => (Some(FolderView::new(&parent, page)), None),
        Err(err) => {
            tracing::warn!(folder = %parent, error = %err, "listing after delete failed");
            (None, Some(err.to_string()))
        }
    };
    Ok(Json(DeleteResponse {
        outcome,
        folder,
        folder_error,
    }))
}

/// `POST /upload` — multipart form with a `folder` field, an optional
/// `overwrite` field, and one or more `file` parts.
pub async fn upload_files(
    State(service): State<BlobService>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let mut folder = paths::ROOT.to_string();
    let mut overwrite = false;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("folder") | Some("folderPath") => folder = field.text().await?,
            Some("overwrite") => overwrite = parse_flag(&field.text().await?)?,
            Some("file") | Some("files") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::bad_request("file part has no file name"))?;
                let data = field.bytes().await?;
                files.push(UploadFile { file_name, data });
            }
            other => {
                tracing::debug!(field = ?other, "ignoring unknown multipart field");
            }
        }
    }

    if files.is_empty() {
        return Err(AppError::bad_request("no files in upload"));
    }

    let uploaded = service.upload_files(&folder, files, overwrite).await?;
    Ok((StatusCode::CREATED, Json(UploadResponse { folder, uploaded })))
}

async fn folder_view(service: &BlobService, folder: &str) -> Result<FolderView, AppError> {
    let page = service.list_children(folder).await?;
    Ok(FolderView::new(folder, page))
}

enum Disposition {
    Inline,
    Attachment,
}

fn stream_response(content: FileContent, disposition: Disposition) -> Response {
    let file_name = paths::display_name(&content.key).replace('"', "");
    let (content_type, disposition) = match disposition {
        Disposition::Inline => (
            content.mime.unwrap_or("application/octet-stream"),
            format!("inline; filename=\"{file_name}\""),
        ),
        Disposition::Attachment => (
            "application/octet-stream",
            format!("attachment; filename=\"{file_name}\""),
        ),
    };

    let mut response = Response::new(Body::from_stream(content.body));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

fn parse_flag(value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" | "off" | "no" => Ok(false),
        "true" | "1" | "on" | "yes" => Ok(true),
        other => Err(AppError::bad_request(format!(
            "overwrite must be true or false, got `{other}`"
        ))),
    }
}
