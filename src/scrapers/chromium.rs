//! Headless Chromium over the Chrome DevTools Protocol.
//!
//! Each [`ChromiumEngine::launch`] starts a dedicated browser process with
//! one page; [`ChromiumSession::close`] shuts the process down and joins the
//! CDP handler task.

use super::{BrowserEngine, BrowserSession};
use crate::config::PipelineConfig;
use crate::error::ScrapeError;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use chromiumoxide::error::CdpError;
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, instrument, warn};

const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Slack added on top of the navigation bound for every CDP request.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    /// Run without a visible window.
    pub headless: bool,
    /// Bound on a single CDP request. Must outlast the navigation timeout,
    /// or `goto` fails inside the handler before our own deadline fires.
    pub request_timeout: Duration,
}

impl ChromiumEngine {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            headless: config.headless,
            request_timeout: request_timeout_for(config.navigation_timeout()),
        }
    }
}

/// CDP request bound that never undercuts `navigation`.
pub fn request_timeout_for(navigation: Duration) -> Duration {
    navigation + REQUEST_TIMEOUT_MARGIN
}

/// A live page plus the browser process and CDP handler task behind it.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    /// Drives the CDP connection; aborted on close.
    handler: JoinHandle<()>,
}

fn browser_err(e: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::Browser(e.to_string())
}

/// A CDP timeout during `goto` is still a navigation timeout.
fn navigation_err(url: &str, limit: Duration, e: CdpError) -> ScrapeError {
    match e {
        CdpError::Timeout => ScrapeError::Timeout {
            url: url.to_string(),
            timeout: limit,
        },
        other => browser_err(other),
    }
}

/// Poll CDP events until the connection ends and return how many errored.
///
/// Decode errors for unknown CDP events are recoverable, so they are logged
/// and polling continues.
async fn pump_events<S, E>(events: &mut S) -> usize
where
    S: Stream<Item = Result<(), E>> + Unpin,
    E: std::fmt::Display,
{
    let mut errors = 0;
    while let Some(event) = events.next().await {
        if let Err(e) = event {
            errors += 1;
            debug!(error = %e, "CDP handler error");
        }
    }
    errors
}

impl BrowserEngine for ChromiumEngine {
    type Session = ChromiumSession;

    #[instrument(level = "info", skip_all, fields(headless = self.headless))]
    async fn launch(&self) -> Result<ChromiumSession, ScrapeError> {
        let mut builder = BrowserConfig::builder().request_timeout(self.request_timeout);
        if !self.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(browser_err)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(browser_err)?;
        let handler = tokio::spawn(async move {
            pump_events(&mut handler).await;
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(browser_err(e));
            }
        };
        Ok(ChromiumSession {
            browser,
            page,
            handler,
        })
    }
}

impl BrowserSession for ChromiumSession {
    async fn navigate(&self, url: &str, limit: Duration) -> Result<(), ScrapeError> {
        match timeout(limit, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(navigation_err(url, limit, e)),
            Err(_) => Err(ScrapeError::Timeout {
                url: url.to_string(),
                timeout: limit,
            }),
        }
    }

    async fn wait_for_selector(&self, selector: &str, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(SELECTOR_POLL).await;
        }
    }

    async fn pause(&self, duration: Duration) {
        sleep(duration).await;
    }

    async fn scroll_height(&self) -> Result<u64, ScrapeError> {
        let height: f64 = self
            .page
            .evaluate("document.body.scrollHeight")
            .await
            .map_err(browser_err)?
            .into_value()
            .map_err(browser_err)?;
        Ok(height.max(0.0) as u64)
    }

    async fn scroll_to_bottom(&self) -> Result<(), ScrapeError> {
        self.page
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .map_err(browser_err)?;
        Ok(())
    }

    async fn inner_text(&self, selector: &str) -> Result<Option<String>, ScrapeError> {
        let Ok(element) = self.page.find_element(selector).await else {
            return Ok(None);
        };
        element.inner_text().await.map_err(browser_err)
    }

    async fn html(&self) -> Result<String, ScrapeError> {
        self.page.content().await.map_err(browser_err)
    }

    async fn close(self) -> Result<(), ScrapeError> {
        let ChromiumSession {
            mut browser,
            page: _,
            handler,
        } = self;
        let closed = browser.close().await.map_err(browser_err);
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "Browser process did not exit cleanly");
        }
        handler.abort();
        closed.map(|_| ())
    }
}
