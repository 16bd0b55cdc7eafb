//! Error taxonomy for the scrape-to-document pipeline.
//!
//! Each pipeline stage owns its error type. Stage errors are either absorbed
//! into data (image fetches become `failed` links), abort a single URL
//! (scrape and transform), or abort the whole batch (compose and document).

use std::time::Duration;
use thiserror::Error;

/// Rendering a source page failed.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// Navigation did not finish within the configured bound.
    #[error("navigation to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// Neither the landmark nor the page body yielded any text.
    #[error("no content could be extracted from {url}")]
    NoContent { url: String },

    /// The browser engine itself failed (launch, CDP, evaluation).
    #[error("browser error: {0}")]
    Browser(String),
}

/// Fetching image bytes failed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {0}")]
    Status(u16),
}

/// The object store could not publish a file.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("reading {path} failed: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("object store returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected object store response: {0}")]
    Decode(String),
}

/// A single image could not be downloaded, stored, or re-hosted.
///
/// Never aborts a batch; the materializer turns it into a `failed` entry.
#[derive(Error, Debug)]
pub enum ImageFetchError {
    #[error("download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("writing {path} for {url} failed: {source}")]
    Write {
        url: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("re-hosting {url} failed: {source}")]
    Rehost {
        url: String,
        #[source]
        source: StoreError,
    },
}

impl ImageFetchError {
    /// The source URL this failure belongs to.
    pub fn url(&self) -> &str {
        match self {
            ImageFetchError::Download { url, .. }
            | ImageFetchError::Write { url, .. }
            | ImageFetchError::Rehost { url, .. } => url,
        }
    }
}

/// The language-model service call failed.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("model service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model response had no choices")]
    NoChoices,
}

/// A text transform could not produce its output.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("{stage} failed: {source}")]
    Model {
        stage: &'static str,
        #[source]
        source: ModelError,
    },

    #[error("{stage} returned an empty response")]
    Empty { stage: &'static str },
}

/// The edit sequence could not be composed or no longer matches the document.
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("document end offset {0} is invalid; it must be at least 1")]
    InvalidEndOffset(usize),

    #[error("document {document_id} changed after its end offset was read")]
    StaleRevision { document_id: String },
}

/// The document store rejected or failed a call.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("document request failed: {0}")]
    Request(String),

    #[error("document store returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected document response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for DocumentError {
    fn from(e: reqwest::Error) -> Self {
        DocumentError::Request(e.to_string())
    }
}

/// Failure of a single URL's contribution to a batch.
#[derive(Error, Debug)]
pub enum PostError {
    #[error("scrape failed: {0}")]
    Scrape(#[from] ScrapeError),

    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
}

/// Failure of the batch-level document mutation.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_timeout_display() {
        let err = ScrapeError::Timeout {
            url: "https://www.linkedin.com/posts/x".to_string(),
            timeout: Duration::from_secs(60),
        };
        assert_eq!(
            err.to_string(),
            "navigation to https://www.linkedin.com/posts/x timed out after 60s"
        );
    }

    #[test]
    fn test_image_fetch_error_url() {
        let err = ImageFetchError::Rehost {
            url: "https://media.licdn.com/a".to_string(),
            source: StoreError::Rejected {
                status: 403,
                body: "quota".to_string(),
            },
        };
        assert_eq!(err.url(), "https://media.licdn.com/a");
        assert_eq!(
            err.to_string(),
            "re-hosting https://media.licdn.com/a failed: object store returned 403: quota"
        );
        assert!(std::error::Error::source(&err).is_some());

        let err = ImageFetchError::Write {
            url: "https://media.licdn.com/b".to_string(),
            path: "images/b.jpg".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.url(), "https://media.licdn.com/b");
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_transform_error_names_stage() {
        let err = TransformError::Empty { stage: "derive_heading" };
        assert_eq!(err.to_string(), "derive_heading returned an empty response");

        let err = TransformError::Model {
            stage: "clean_text",
            source: ModelError::Status {
                status: 429,
                body: "rate limited".to_string(),
            },
        };
        assert!(err.to_string().starts_with("clean_text failed"));
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn test_post_error_from_stage_errors() {
        let err: PostError = ScrapeError::NoContent {
            url: "u".to_string(),
        }
        .into();
        assert!(matches!(err, PostError::Scrape(ScrapeError::NoContent { .. })));

        let err: PostError = TransformError::Empty { stage: "clean_text" }.into();
        assert!(matches!(err, PostError::Transform(_)));
    }

    #[test]
    fn test_batch_error_is_transparent() {
        let err: BatchError = ComposeError::InvalidEndOffset(0).into();
        assert_eq!(
            err.to_string(),
            "document end offset 0 is invalid; it must be at least 1"
        );

        let err: BatchError = DocumentError::Rejected {
            status: 400,
            body: "bad index".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "document store returned 400: bad index");
    }
}
