//! Data models flowing through the pipeline.
//!
//! - [`RawContent`]: what the page renderer scraped from one post
//! - [`MaterializedImage`] / [`ImagePartition`]: outcome of downloading and re-hosting images
//! - [`PostRecord`]: one fully processed post, the unit the composer consumes
//! - [`BatchReport`] / [`UrlOutcome`]: per-URL results handed back to the caller

use serde::{Deserialize, Serialize};

/// Raw text and image candidates scraped from one source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContent {
    /// Visible text of the landmark, or of the whole page as a fallback.
    pub text: String,
    /// Approved image URLs in first-seen order.
    pub image_candidates: Vec<String>,
}

/// An image that was stored locally and is reachable at `hosted_uri`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedImage {
    pub source_url: String,
    pub hosted_uri: String,
    pub local_path: String,
}

/// Result of materializing one post's images.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePartition {
    /// Hosted URIs ready for inline insertion.
    pub succeeded: Vec<String>,
    /// Source URLs that could not be materialized; inserted as bare links.
    pub failed: Vec<String>,
}

/// A processed post ready to be written into the target document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub source_url: String,
    pub heading: String,
    pub body: String,
    pub insights: Option<Vec<String>>,
    pub images: Vec<String>,
    pub failed_links: Vec<String>,
}

/// Final state of one source URL after a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UrlStatus {
    /// Post written with every image inline.
    Added { heading: String, images: usize },
    /// Post written; some images were inserted as plain links instead.
    AddedWithImageFailures {
        heading: String,
        images: usize,
        failed_images: usize,
    },
    /// Nothing from this URL reached the document.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlOutcome {
    pub url: String,
    #[serde(flatten)]
    pub status: UrlStatus,
}

impl UrlOutcome {
    /// Human-readable one-liner for terminal output.
    pub fn describe(&self) -> String {
        match &self.status {
            UrlStatus::Added { heading, images } => {
                format!("added \"{heading}\" with {images} image(s)")
            }
            UrlStatus::AddedWithImageFailures {
                heading,
                images,
                failed_images,
            } => format!(
                "added \"{heading}\" with {images} image(s); {failed_images} image(s) failed and were linked instead"
            ),
            UrlStatus::Failed { error } => format!("post failed entirely: {error}"),
        }
    }
}

/// Everything a caller learns about one batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub generated_at: String,
    pub document_id: Option<String>,
    pub success: bool,
    pub message: String,
    pub results: Vec<UrlOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_status_serialization_is_tagged() {
        let outcome = UrlOutcome {
            url: "https://www.linkedin.com/posts/a".to_string(),
            status: UrlStatus::AddedWithImageFailures {
                heading: "Shipping Faster".to_string(),
                images: 1,
                failed_images: 2,
            },
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "added_with_image_failures");
        assert_eq!(json["url"], "https://www.linkedin.com/posts/a");
        assert_eq!(json["failed_images"], 2);
    }

    #[test]
    fn test_batch_report_deserialization() {
        let json = r#"{
            "generated_at": "2025-05-06T08:00:00Z",
            "document_id": "doc-1",
            "success": false,
            "message": "1 of 2 post(s) added",
            "results": [
                {"url": "u1", "status": "added", "heading": "H", "images": 0},
                {"url": "u2", "status": "failed", "error": "scrape failed"}
            ]
        }"#;

        let report: BatchReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.document_id.as_deref(), Some("doc-1"));
        assert_eq!(report.results.len(), 2);
        assert!(matches!(report.results[1].status, UrlStatus::Failed { .. }));
    }

    #[test]
    fn test_describe_distinguishes_outcomes() {
        let added = UrlOutcome {
            url: "u".to_string(),
            status: UrlStatus::Added {
                heading: "H".to_string(),
                images: 2,
            },
        };
        let partial = UrlOutcome {
            url: "u".to_string(),
            status: UrlStatus::AddedWithImageFailures {
                heading: "H".to_string(),
                images: 0,
                failed_images: 1,
            },
        };
        let failed = UrlOutcome {
            url: "u".to_string(),
            status: UrlStatus::Failed {
                error: "boom".to_string(),
            },
        };

        assert_eq!(added.describe(), "added \"H\" with 2 image(s)");
        assert!(partial.describe().contains("failed and were linked instead"));
        assert_eq!(failed.describe(), "post failed entirely: boom");
    }
}
