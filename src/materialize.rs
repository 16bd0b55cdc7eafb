//! Image download, local storage, and optional re-hosting.
//!
//! Every URL is handled on its own: a failed download, write, or upload
//! becomes an [`ImageFetchError`] for that URL and the rest continue. The
//! per-URL results are then partitioned into hosted URIs and fallback links.

use crate::error::{FetchError, ImageFetchError, StoreError};
use crate::models::{ImagePartition, MaterializedImage};
use crate::utils::sanitize_prefix;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};
use url::Url;

/// Extensions kept as-is; anything else is saved as `.jpg`.
pub const KNOWN_IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "bmp"];
const DEFAULT_EXTENSION: &str = "jpg";

/// Name of the append-only log of URLs that could not be materialized.
pub const FAILURE_LOG: &str = "failed_downloads.txt";

/// Source of image bytes.
pub trait ImageFetch {
    /// Bytes at `url`; any non-2xx status is an error.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

impl ImageFetch for Client {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = self.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Remote store that can publish a local file under a shareable URI.
pub trait ObjectStore {
    /// Upload the file and return the store's id for it.
    async fn upload(&self, local_path: &Path) -> Result<String, StoreError>;

    async fn set_public_readable(&self, file_id: &str) -> Result<(), StoreError>;

    fn shareable_uri(&self, file_id: &str) -> String;
}

/// Type placeholder for `Materializer`s built without an object store.
#[cfg(test)]
pub(crate) struct NoRehost;

#[cfg(test)]
impl ObjectStore for NoRehost {
    async fn upload(&self, _local_path: &Path) -> Result<String, StoreError> {
        unreachable!("NoRehost is never passed as a store")
    }

    async fn set_public_readable(&self, _file_id: &str) -> Result<(), StoreError> {
        unreachable!("NoRehost is never passed as a store")
    }

    fn shareable_uri(&self, file_id: &str) -> String {
        file_id.to_string()
    }
}

/// `{prefix}_{index}.{ext}` with the extension taken from the URL path.
pub fn image_filename(url: &str, prefix: &str, index: usize) -> String {
    format!("{}_{}.{}", sanitize_prefix(prefix), index, extension_for(url))
}

fn extension_for(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or_default().to_string());
    Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| KNOWN_IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Split per-URL results into hosted URIs and failed source URLs, input order kept.
pub fn partition(results: Vec<Result<MaterializedImage, ImageFetchError>>) -> ImagePartition {
    let mut out = ImagePartition::default();
    for result in results {
        match result {
            Ok(image) => out.succeeded.push(image.hosted_uri),
            Err(e) => out.failed.push(e.url().to_string()),
        }
    }
    out
}

/// Downloads a post's images and, when a store is configured, re-hosts them.
pub struct Materializer<'a, F, O> {
    /// Where image bytes come from.
    fetcher: &'a F,
    /// Re-hosting target; `None` keeps source URLs as hosted URIs.
    store: Option<&'a O>,
}

impl<'a, F, O> Materializer<'a, F, O>
where
    F: ImageFetch,
    O: ObjectStore,
{
    /// With `store == None` the source URL doubles as the hosted URI.
    pub fn new(fetcher: &'a F, store: Option<&'a O>) -> Self {
        Self { fetcher, store }
    }

    /// Fetch, store, and optionally re-host each URL under `folder`.
    ///
    /// # Arguments
    ///
    /// * `urls` - Approved image URLs, in document order
    /// * `folder` - Local directory for the downloaded files and the failure log
    /// * `prefix` - Filename prefix, sanitized before use
    ///
    /// # Returns
    ///
    /// An [`ImagePartition`]. Never fails as a whole: each URL that could not be
    /// materialized lands in `failed` and in [`FAILURE_LOG`].
    #[instrument(level = "info", skip_all, fields(count = urls.len(), folder = %folder.display(), %prefix))]
    pub async fn materialize(&self, urls: &[String], folder: &Path, prefix: &str) -> ImagePartition {
        if urls.is_empty() {
            return ImagePartition::default();
        }

        let mut results = Vec::with_capacity(urls.len());
        if let Err(e) = fs::create_dir_all(folder).await {
            warn!(error = %e, "Image folder unavailable; every image falls back to a link");
            for url in urls {
                results.push(Err(ImageFetchError::Write {
                    url: url.clone(),
                    path: folder.display().to_string(),
                    source: std::io::Error::new(e.kind(), e.to_string()),
                }));
            }
        } else {
            for (i, url) in urls.iter().enumerate() {
                let path = folder.join(image_filename(url, prefix, i + 1));
                let result = self.materialize_one(url, path).await;
                if let Err(e) = &result {
                    warn!(%url, error = %e, "Image failed; keeping it as a link");
                }
                results.push(result);
            }
        }

        let failed: Vec<&str> = results
            .iter()
            .filter_map(|r| r.as_ref().err().map(|e| e.url()))
            .collect();
        if !failed.is_empty() {
            if let Err(e) = append_failure_log(folder, &failed).await {
                warn!(error = %e, "Could not append to failure log");
            }
        }

        let partition = partition(results);
        info!(
            succeeded = partition.succeeded.len(),
            failed = partition.failed.len(),
            "Materialized images"
        );
        partition
    }

    async fn materialize_one(
        &self,
        url: &str,
        path: PathBuf,
    ) -> Result<MaterializedImage, ImageFetchError> {
        let bytes = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|source| ImageFetchError::Download {
                url: url.to_string(),
                source,
            })?;

        fs::write(&path, &bytes)
            .await
            .map_err(|source| ImageFetchError::Write {
                url: url.to_string(),
                path: path.display().to_string(),
                source,
            })?;

        let hosted_uri = match self.store {
            Some(store) => self.rehost(store, url, &path).await?,
            None => url.to_string(),
        };

        Ok(MaterializedImage {
            source_url: url.to_string(),
            hosted_uri,
            local_path: path.display().to_string(),
        })
    }

    async fn rehost(&self, store: &O, url: &str, path: &Path) -> Result<String, ImageFetchError> {
        let rehost_err = |source: StoreError| ImageFetchError::Rehost {
            url: url.to_string(),
            source,
        };
        let file_id = store.upload(path).await.map_err(rehost_err)?;
        store
            .set_public_readable(&file_id)
            .await
            .map_err(rehost_err)?;
        Ok(store.shareable_uri(&file_id))
    }
}

async fn append_failure_log(folder: &Path, urls: &[&str]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(folder.join(FAILURE_LOG))
        .await?;
    let mut lines = String::new();
    for url in urls {
        lines.push_str(url);
        lines.push('\n');
    }
    file.write_all(lines.as_bytes()).await?;
    file.flush().await
}
