//! Image re-hosting on Google Drive.
//!
//! Uploads a local file with a `multipart/related` request, grants
//! anyone-with-link read access, and derives the view URI from the file id.

use crate::error::StoreError;
use crate::materialize::ObjectStore;
use reqwest::Client;
use serde_json::{Value, json};
use std::fmt;
use std::path::Path;
use tracing::{debug, instrument};

const UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FILES_API: &str = "https://www.googleapis.com/drive/v3/files";
const BOUNDARY: &str = "post_scribe_upload_boundary";

/// Public view URI for a Drive file id.
pub fn shareable_uri(file_id: &str) -> String {
    format!(
        "https://drive.google.com/uc?export=view&id={}",
        urlencoding::encode(file_id)
    )
}

/// Guess a MIME type from the file extension.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
}

/// Body of a `multipart/related` upload: JSON metadata, then the file bytes.
pub fn multipart_body(name: &str, mime: &str, bytes: &[u8]) -> Vec<u8> {
    let metadata = json!({ "name": name });
    let mut body = Vec::with_capacity(bytes.len() + 256);
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{BOUNDARY}\r\nContent-Type: {mime}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Drive v3 client used as the image [`ObjectStore`].
pub struct GoogleDrive {
    /// Shared HTTP client.
    client: Client,
    /// OAuth bearer token with a Drive scope.
    access_token: String,
}

impl GoogleDrive {
    pub fn new(client: Client, access_token: impl Into<String>) -> Self {
        Self {
            client,
            access_token: access_token.into(),
        }
    }
}

impl fmt::Debug for GoogleDrive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleDrive").finish_non_exhaustive()
    }
}

async fn checked(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// File id from an upload response.
fn uploaded_file_id(created: &Value) -> Result<&str, StoreError> {
    created
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Decode("upload response has no id".to_string()))
}

impl ObjectStore for GoogleDrive {
    #[instrument(level = "info", skip_all, fields(path = %local_path.display()))]
    async fn upload(&self, local_path: &Path) -> Result<String, StoreError> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|source| StoreError::Read {
                path: local_path.display().to_string(),
                source,
            })?;
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image");
        let body = multipart_body(name, mime_for(local_path), &bytes);

        let resp = self
            .client
            .post(format!("{UPLOAD_API}?uploadType=multipart&fields=id"))
            .bearer_auth(&self.access_token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;
        let created: Value = checked(resp).await?.json().await?;

        let id = uploaded_file_id(&created)?;
        debug!(file_id = id, "Uploaded image");
        Ok(id.to_string())
    }

    #[instrument(level = "info", skip_all, fields(%file_id))]
    async fn set_public_readable(&self, file_id: &str) -> Result<(), StoreError> {
        let resp = self
            .client
            .post(format!(
                "{FILES_API}/{}/permissions",
                urlencoding::encode(file_id)
            ))
            .bearer_auth(&self.access_token)
            .json(&json!({ "role": "reader", "type": "anyone" }))
            .send()
            .await?;
        checked(resp).await.map(|_| ())
    }

    fn shareable_uri(&self, file_id: &str) -> String {
        shareable_uri(file_id)
    }
}
