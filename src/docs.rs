//! Target document store.
//!
//! [`DocumentStore`] is the only component allowed to mutate the target
//! document, and the pipeline calls [`DocumentStore::batch_update`] once per
//! batch. [`GoogleDocs`] talks to the Docs REST API with a bearer token; the
//! batch carries `requiredRevisionId` so a document edited between the
//! snapshot and the write is rejected instead of corrupted.

use crate::compose::EditOp;
use crate::error::{BatchError, ComposeError, DocumentError};
use reqwest::Client;
use serde_json::{Value, json};
use std::fmt;
use tracing::{info, instrument, warn};

const DOCS_API: &str = "https://docs.googleapis.com/v1";

/// What the composer needs to know about the target before writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub document_id: String,
    /// `endIndex` of the last body element, in UTF-16 units.
    pub end_offset: usize,
    /// Revision the offsets were read at; sent back as `requiredRevisionId`.
    pub revision_id: Option<String>,
}

pub trait DocumentStore {
    async fn get_document(&self, document_id: &str) -> Result<DocumentSnapshot, DocumentError>;

    /// Apply `ops` atomically against the revision captured in `snapshot`.
    async fn batch_update(
        &self,
        snapshot: &DocumentSnapshot,
        ops: &[EditOp],
    ) -> Result<(), BatchError>;

    async fn create_document(&self, title: &str) -> Result<String, DocumentError>;
}

/// Docs API JSON for one edit.
pub fn to_docs_request(op: &EditOp) -> Value {
    match op {
        EditOp::InsertText { at, text } => json!({
            "insertText": {
                "location": { "index": at },
                "text": text,
            }
        }),
        EditOp::StyleRange { start, end, style } => json!({
            "updateParagraphStyle": {
                "range": { "startIndex": start, "endIndex": end },
                "paragraphStyle": { "namedStyleType": style.named_style_type() },
                "fields": "namedStyleType",
            }
        }),
        EditOp::InsertImage { at, uri, size } => json!({
            "insertInlineImage": {
                "location": { "index": at },
                "uri": uri,
                "objectSize": {
                    "height": { "magnitude": size.height_pt, "unit": "PT" },
                    "width": { "magnitude": size.width_pt, "unit": "PT" },
                },
            }
        }),
    }
}

/// Full `batchUpdate` body for a composed batch.
pub fn batch_update_body(ops: &[EditOp], revision_id: Option<&str>) -> Value {
    let requests: Vec<Value> = ops.iter().map(to_docs_request).collect();
    match revision_id {
        Some(rev) => json!({
            "requests": requests,
            "writeControl": { "requiredRevisionId": rev },
        }),
        None => json!({ "requests": requests }),
    }
}

/// Read the end offset (last structural element's `endIndex`) and revision.
pub fn parse_snapshot(document_id: &str, doc: &Value) -> Result<DocumentSnapshot, DocumentError> {
    let content = doc
        .pointer("/body/content")
        .and_then(Value::as_array)
        .ok_or_else(|| DocumentError::Decode("document has no body content".to_string()))?;
    let end_offset = content
        .last()
        .and_then(|el| el.get("endIndex"))
        .and_then(Value::as_u64)
        .unwrap_or(1) as usize;
    let revision_id = doc
        .get("revisionId")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(DocumentSnapshot {
        document_id: document_id.to_string(),
        end_offset,
        revision_id,
    })
}

fn is_revision_mismatch(status: u16, body: &str) -> bool {
    status == 400 && body.to_ascii_lowercase().contains("revision")
}

/// Docs v1 REST client.
pub struct GoogleDocs {
    /// Shared HTTP client.
    client: Client,
    /// OAuth bearer token with a Docs scope.
    access_token: String,
    /// Docs API root, `https://docs.googleapis.com/v1`.
    api_base: String,
}

impl GoogleDocs {
    pub fn new(client: Client, access_token: impl Into<String>) -> Self {
        Self {
            client,
            access_token: access_token.into(),
            api_base: DOCS_API.to_string(),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, DocumentError> {
        let resp = request.bearer_auth(&self.access_token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(DocumentError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<Value>()
            .await
            .map_err(|e| DocumentError::Decode(e.to_string()))
    }
}

impl fmt::Debug for GoogleDocs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleDocs")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl DocumentStore for GoogleDocs {
    #[instrument(level = "info", skip_all, fields(%document_id))]
    async fn get_document(&self, document_id: &str) -> Result<DocumentSnapshot, DocumentError> {
        let url = format!("{}/documents/{}", self.api_base, document_id);
        let doc = self.send(self.client.get(url)).await?;
        let snapshot = parse_snapshot(document_id, &doc)?;
        info!(end_offset = snapshot.end_offset, "Read document snapshot");
        Ok(snapshot)
    }

    #[instrument(level = "info", skip_all, fields(document_id = %snapshot.document_id, ops = ops.len()))]
    async fn batch_update(
        &self,
        snapshot: &DocumentSnapshot,
        ops: &[EditOp],
    ) -> Result<(), BatchError> {
        let url = format!(
            "{}/documents/{}:batchUpdate",
            self.api_base, snapshot.document_id
        );
        let body = batch_update_body(ops, snapshot.revision_id.as_deref());
        match self.send(self.client.post(url).json(&body)).await {
            Ok(_) => {
                info!("Batch update applied");
                Ok(())
            }
            Err(DocumentError::Rejected { status, body }) if is_revision_mismatch(status, &body) => {
                warn!(status, "Document changed since snapshot");
                Err(ComposeError::StaleRevision {
                    document_id: snapshot.document_id.clone(),
                }
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(level = "info", skip_all, fields(%title))]
    async fn create_document(&self, title: &str) -> Result<String, DocumentError> {
        let url = format!("{}/documents", self.api_base);
        let doc = self
            .send(self.client.post(url).json(&json!({ "title": title })))
            .await?;
        let id = doc
            .get("documentId")
            .and_then(Value::as_str)
            .ok_or_else(|| DocumentError::Decode("create response has no documentId".to_string()))?;
        info!(document_id = id, "Created document");
        Ok(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{ImageSize, ParagraphStyle};

    #[test]
    fn test_insert_text_request() {
        let req = to_docs_request(&EditOp::InsertText {
            at: 12,
            text: "Hello\n\n".to_string(),
        });
        assert_eq!(
            req,
            json!({"insertText": {"location": {"index": 12}, "text": "Hello\n\n"}})
        );
    }

    #[test]
    fn test_style_request() {
        let req = to_docs_request(&EditOp::StyleRange {
            start: 1,
            end: 6,
            style: ParagraphStyle::Heading1,
        });
        assert_eq!(req["updateParagraphStyle"]["range"]["startIndex"], 1);
        assert_eq!(req["updateParagraphStyle"]["range"]["endIndex"], 6);
        assert_eq!(
            req["updateParagraphStyle"]["paragraphStyle"]["namedStyleType"],
            "HEADING_1"
        );
        assert_eq!(req["updateParagraphStyle"]["fields"], "namedStyleType");
    }

    #[test]
    fn test_inline_image_request() {
        let req = to_docs_request(&EditOp::InsertImage {
            at: 40,
            uri: "https://drive.google.com/uc?export=view&id=abc".to_string(),
            size: ImageSize::square(300.0),
        });
        let image = &req["insertInlineImage"];
        assert_eq!(image["location"]["index"], 40);
        assert_eq!(image["objectSize"]["height"]["magnitude"], 300.0);
        assert_eq!(image["objectSize"]["width"]["unit"], "PT");
    }

    #[test]
    fn test_batch_body_carries_write_control() {
        let ops = [EditOp::InsertText {
            at: 1,
            text: "x".to_string(),
        }];
        let body = batch_update_body(&ops, Some("rev-7"));
        assert_eq!(body["writeControl"]["requiredRevisionId"], "rev-7");
        assert_eq!(body["requests"].as_array().unwrap().len(), 1);

        let body = batch_update_body(&ops, None);
        assert!(body.get("writeControl").is_none());
    }

    #[test]
    fn test_parse_snapshot_uses_last_end_index() {
        let doc = json!({
            "documentId": "d1",
            "revisionId": "rev-1",
            "body": {"content": [
                {"endIndex": 1, "sectionBreak": {}},
                {"startIndex": 1, "endIndex": 42, "paragraph": {}}
            ]}
        });
        let snapshot = parse_snapshot("d1", &doc).unwrap();
        assert_eq!(
            snapshot,
            DocumentSnapshot {
                document_id: "d1".to_string(),
                end_offset: 42,
                revision_id: Some("rev-1".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_snapshot_requires_body() {
        assert!(matches!(
            parse_snapshot("d1", &json!({"documentId": "d1"})),
            Err(DocumentError::Decode(_))
        ));
        let empty = parse_snapshot("d1", &json!({"body": {"content": []}})).unwrap();
        assert_eq!(empty.end_offset, 1);
    }

    #[test]
    fn test_revision_mismatch_detection() {
        assert!(is_revision_mismatch(
            400,
            "The required revision ID does not match the latest revision."
        ));
        assert!(!is_revision_mismatch(400, "Invalid requests[0].insertText"));
        assert!(!is_revision_mismatch(403, "revision"));
    }
}
