//! Batch orchestration: URLs in, one atomic document update out.
//!
//! Each URL is rendered, transformed, and has its images materialized on its
//! own; a scrape or transform failure only removes that URL from the batch.
//! Surviving posts are composed against a single document snapshot and
//! written with one `batch_update`. Nothing touches the document before that
//! final call, so an aborted run leaves it unchanged.

use crate::api::LanguageModel;
use crate::compose::{ImageSize, compose};
use crate::config::PipelineConfig;
use crate::docs::DocumentStore;
use crate::error::{BatchError, PostError};
use crate::materialize::{ImageFetch, Materializer, ObjectStore};
use crate::models::{BatchReport, PostRecord, UrlOutcome, UrlStatus};
use crate::scrapers::{BrowserEngine, render};
use crate::transform::TextTransformer;
use crate::utils::url_slug;
use chrono::Local;
use futures::stream::{self, StreamExt};
use std::path::Path;
use tracing::{error, info, instrument, warn};

/// Where the batch is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Existing(String),
    /// Create a new document with this title first.
    New(String),
}

/// The collaborators one batch runs against.
pub struct Pipeline<'a, E, L, F, O, D> {
    /// Launches one browser session per URL.
    pub engine: &'a E,
    /// Used for cleaning, headings, and insights.
    pub model: &'a L,
    pub materializer: Materializer<'a, F, O>,
    /// The only writer of the target document.
    pub docs: &'a D,
    pub config: &'a PipelineConfig,
}

impl<'a, E, L, F, O, D> Pipeline<'a, E, L, F, O, D>
where
    E: BrowserEngine,
    L: LanguageModel,
    F: ImageFetch,
    O: ObjectStore,
    D: DocumentStore,
{
    /// Process `urls` in order and append the successful posts to `target`.
    ///
    /// # Arguments
    ///
    /// * `urls` - Post URLs; document order follows this order
    /// * `target` - Existing document id, or the title of a document to create
    ///
    /// # Returns
    ///
    /// A [`BatchReport`] with one outcome per URL. Never fails as a whole; the
    /// report's `success` and `message` carry the batch result.
    #[instrument(level = "info", skip_all, fields(urls = urls.len()))]
    pub async fn run(&self, urls: &[String], target: &Target) -> BatchReport {
        let document_id = match target {
            Target::Existing(id) => id.clone(),
            Target::New(title) => match self.docs.create_document(title).await {
                Ok(id) => id,
                Err(e) => {
                    error!(error = %e, "Could not create target document");
                    return report(
                        None,
                        false,
                        format!("Document update failed: could not create document: {e}"),
                        urls.iter()
                            .map(|url| failed(url, "target document could not be created"))
                            .collect(),
                    );
                }
            },
        };

        let results: Vec<(String, Result<PostRecord, PostError>)> = stream::iter(urls)
            .then(|url| async move {
                let result = self.process_url(url).await;
                if let Err(e) = &result {
                    warn!(%url, error = %e, "Post failed; skipping it");
                }
                (url.clone(), result)
            })
            .collect()
            .await;

        let posts: Vec<PostRecord> = results
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok().cloned())
            .collect();
        info!(
            total = results.len(),
            succeeded = posts.len(),
            "Finished processing posts"
        );

        if posts.is_empty() {
            let outcomes = results.into_iter().map(|(url, r)| outcome(url, r, None)).collect();
            return report(
                Some(document_id),
                false,
                "No posts could be processed; the document was left unchanged.".to_string(),
                outcomes,
            );
        }

        let write = self.write_batch(&document_id, &posts).await;
        if let Err(e) = &write {
            error!(error = %e, "Document update failed");
        }
        let write_error = write.err().map(|e| e.to_string());

        let outcomes: Vec<UrlOutcome> = results
            .into_iter()
            .map(|(url, r)| outcome(url, r, write_error.as_deref()))
            .collect();
        let (success, message) = summarize(&outcomes, write_error.as_deref());
        report(Some(document_id), success, message, outcomes)
    }

    /// Scrape, transform, and materialize one URL into a [`PostRecord`].
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn process_url(&self, url: &str) -> Result<PostRecord, PostError> {
        let raw = render(self.engine, url, self.config).await?;

        let transformer = TextTransformer::new(self.model, self.config.prepend_summary);
        let body = transformer.clean_text(&raw.text).await?;
        let heading = transformer.derive_heading(&body).await?;
        let insights = if self.config.derive_insights {
            Some(transformer.derive_insights(&body).await?)
        } else {
            None
        };

        let images = self
            .materializer
            .materialize(
                &raw.image_candidates,
                Path::new(&self.config.image_folder),
                &url_slug(url),
            )
            .await;

        info!(
            %heading,
            images = images.succeeded.len(),
            failed_images = images.failed.len(),
            "Post ready"
        );
        Ok(PostRecord {
            source_url: url.to_string(),
            heading,
            body,
            insights,
            images: images.succeeded,
            failed_links: images.failed,
        })
    }

    /// One snapshot, one composition, one atomic update.
    async fn write_batch(&self, document_id: &str, posts: &[PostRecord]) -> Result<(), BatchError> {
        let snapshot = self.docs.get_document(document_id).await?;
        let composition = compose(
            snapshot.end_offset,
            posts,
            ImageSize::square(self.config.image_size_pt),
        )?;
        info!(
            ops = composition.ops.len(),
            start = composition.start,
            inserted = composition.inserted_len(),
            "Composed document batch"
        );
        self.docs.batch_update(&snapshot, &composition.ops).await
    }
}

fn failed(url: &str, error: impl Into<String>) -> UrlOutcome {
    UrlOutcome {
        url: url.to_string(),
        status: UrlStatus::Failed {
            error: error.into(),
        },
    }
}

fn outcome(
    url: String,
    result: Result<PostRecord, PostError>,
    write_error: Option<&str>,
) -> UrlOutcome {
    let status = match (result, write_error) {
        (Err(e), _) => UrlStatus::Failed {
            error: e.to_string(),
        },
        (Ok(_), Some(write_error)) => UrlStatus::Failed {
            error: format!("document update failed: {write_error}"),
        },
        (Ok(post), None) if post.failed_links.is_empty() => UrlStatus::Added {
            heading: post.heading,
            images: post.images.len(),
        },
        (Ok(post), None) => UrlStatus::AddedWithImageFailures {
            heading: post.heading,
            images: post.images.len(),
            failed_images: post.failed_links.len(),
        },
    };
    UrlOutcome { url, status }
}

/// Overall success flag and a message separating the three failure kinds.
pub fn summarize(outcomes: &[UrlOutcome], write_error: Option<&str>) -> (bool, String) {
    if let Some(e) = write_error {
        return (
            false,
            format!("Document update failed: {e}. No posts were added."),
        );
    }

    let added = outcomes
        .iter()
        .filter(|o| !matches!(o.status, UrlStatus::Failed { .. }))
        .count();
    let with_image_failures = outcomes
        .iter()
        .filter(|o| matches!(o.status, UrlStatus::AddedWithImageFailures { .. }))
        .count();
    let failed = outcomes.len() - added;

    let mut message = format!("Added {added} of {} post(s).", outcomes.len());
    if with_image_failures > 0 {
        message.push_str(&format!(
            " {with_image_failures} post(s) were added but some images failed and were linked instead."
        ));
    }
    if failed > 0 {
        message.push_str(&format!(" {failed} post(s) failed entirely."));
    }
    (failed == 0, message)
}

fn report(
    document_id: Option<String>,
    success: bool,
    message: String,
    results: Vec<UrlOutcome>,
) -> BatchReport {
    BatchReport {
        generated_at: Local::now().to_rfc3339(),
        document_id,
        success,
        message,
        results,
    }
}
