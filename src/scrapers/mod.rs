//! Page rendering for dynamic post pages.
//!
//! A post page only has its full text and image grid after client-side
//! rendering, so scraping goes through a headless browser:
//!
//! 1. **Navigate** with a bounded timeout
//! 2. **Wait** for the landmark (falls back to the whole page when absent)
//! 3. **Settle**: scroll until the page height stops growing
//! 4. **Extract** visible text and approved image URLs
//!
//! The browser is reached through [`BrowserEngine`] / [`BrowserSession`];
//! [`chromium`] provides the Chrome DevTools implementation.

pub mod chromium;
pub mod images;

use crate::config::PipelineConfig;
use crate::error::ScrapeError;
use crate::models::RawContent;
use images::{ImagePolicy, extract_images};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Launches isolated browser sessions.
pub trait BrowserEngine {
    type Session: BrowserSession;

    async fn launch(&self) -> Result<Self::Session, ScrapeError>;
}

/// One live browser page. Owned by a single scrape and closed when it ends.
pub trait BrowserSession {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), ScrapeError>;

    /// `true` once `selector` matches, `false` if `timeout` elapses first.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> bool;

    async fn pause(&self, duration: Duration);

    async fn scroll_height(&self) -> Result<u64, ScrapeError>;

    async fn scroll_to_bottom(&self) -> Result<(), ScrapeError>;

    /// Visible text of the first element matching `selector`, if any.
    async fn inner_text(&self, selector: &str) -> Result<Option<String>, ScrapeError>;

    /// Serialized DOM of the current page.
    async fn html(&self) -> Result<String, ScrapeError>;

    async fn close(self) -> Result<(), ScrapeError>;
}

/// How the settle loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleOutcome {
    pub scrolls: usize,
    /// `false` when the iteration cap stopped the loop before the height stabilized.
    pub converged: bool,
}

/// Scroll until two consecutive height measurements are equal.
///
/// Each iteration measures first; a repeat of the previous height ends the
/// loop without scrolling again. `max_iterations` bounds the number of
/// scrolls for pages that never stop growing.
pub async fn settle<S: BrowserSession>(
    session: &S,
    interval: Duration,
    max_iterations: usize,
) -> Result<SettleOutcome, ScrapeError> {
    let mut previous: Option<u64> = None;
    let mut scrolls = 0usize;

    loop {
        let height = session.scroll_height().await?;
        if previous == Some(height) {
            debug!(scrolls, height, "Page height settled");
            return Ok(SettleOutcome {
                scrolls,
                converged: true,
            });
        }
        if scrolls >= max_iterations {
            warn!(scrolls, height, "Settle loop hit iteration cap");
            return Ok(SettleOutcome {
                scrolls,
                converged: false,
            });
        }
        previous = Some(height);
        session.scroll_to_bottom().await?;
        scrolls += 1;
        session.pause(interval).await;
    }
}

/// Render `url` and return its text and approved image URLs.
///
/// The session is closed on every path, including errors.
#[instrument(level = "info", skip_all, fields(%url))]
pub async fn render<E: BrowserEngine>(
    engine: &E,
    url: &str,
    config: &PipelineConfig,
) -> Result<RawContent, ScrapeError> {
    let session = engine.launch().await?;
    let result = scrape_session(&session, url, config).await;
    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close browser session");
    }
    result
}

async fn scrape_session<S: BrowserSession>(
    session: &S,
    url: &str,
    config: &PipelineConfig,
) -> Result<RawContent, ScrapeError> {
    session.navigate(url, config.navigation_timeout()).await?;

    let landmark = config.landmark_selector.as_str();
    let has_landmark = session
        .wait_for_selector(landmark, config.landmark_timeout())
        .await;
    if !has_landmark {
        warn!(landmark, "Landmark never appeared; falling back to whole page");
    }

    session.pause(config.initial_settle()).await;
    let outcome = settle(session, config.settle_interval(), config.max_settle_iterations).await?;
    debug!(?outcome, "Settle loop finished");

    let text = read_text(session, has_landmark.then_some(landmark)).await?;
    if text.trim().is_empty() {
        return Err(ScrapeError::NoContent {
            url: url.to_string(),
        });
    }

    let policy = ImagePolicy::from_config(config);
    let image_candidates = extract_images(session, url, &policy).await?;

    info!(
        text_bytes = text.len(),
        images = image_candidates.len(),
        scrolls = outcome.scrolls,
        "Rendered post"
    );
    Ok(RawContent {
        text,
        image_candidates,
    })
}

async fn read_text<S: BrowserSession>(
    session: &S,
    landmark: Option<&str>,
) -> Result<String, ScrapeError> {
    if let Some(selector) = landmark {
        match session.inner_text(selector).await {
            Ok(Some(text)) if !text.trim().is_empty() => return Ok(text),
            Ok(_) => debug!(selector, "Landmark had no text; using body"),
            Err(e) => warn!(selector, error = %e, "Landmark text failed; using body"),
        }
    }
    Ok(session.inner_text("body").await?.unwrap_or_default())
}
