//! Content image extraction for rendered post pages.
//!
//! Candidates are `img[src]` values and every `srcset` entry of
//! `picture source` elements inside the landmark, in document order. A
//! candidate survives when it:
//!
//! - is non-empty and not an inline `data:` payload
//! - resolves against the page URL
//! - has no deny token in its URL, alt text, or class
//! - is served from the platform's media host (or a subdomain of it)
//!
//! Survivors are deduplicated by exact URL, first occurrence wins.

use super::BrowserSession;
use crate::config::PipelineConfig;
use crate::error::ScrapeError;
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Substrings that mark page chrome rather than post content.
pub const DENY_TOKENS: [&str; 6] = ["profile", "avatar", "banner", "emoji", "icon", "logo"];

static CANDIDATES: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img, picture source").expect("static selector"));

/// Where to look and what to accept.
#[derive(Debug, Clone)]
pub struct ImagePolicy {
    /// Scope for candidates; the whole document when it matches nothing.
    pub landmark_selector: String,
    /// Lowercased host; subdomains also match.
    pub media_host: String,
    /// Fixed scroll+wait cycles before reading the DOM.
    pub scroll_cycles: usize,
    pub scroll_wait: Duration,
}

impl ImagePolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            landmark_selector: config.landmark_selector.clone(),
            media_host: config.media_host.to_ascii_lowercase(),
            scroll_cycles: config.image_scroll_cycles,
            scroll_wait: config.image_scroll_wait(),
        }
    }

    fn host_matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        host == self.media_host || host.ends_with(&format!(".{}", self.media_host))
    }
}

/// Scroll a fixed number of times so lazy images load, then classify the DOM.
#[instrument(level = "info", skip_all, fields(%base_url))]
pub async fn extract_images<S: BrowserSession>(
    session: &S,
    base_url: &str,
    policy: &ImagePolicy,
) -> Result<Vec<String>, ScrapeError> {
    for _ in 0..policy.scroll_cycles {
        session.scroll_to_bottom().await?;
        session.pause(policy.scroll_wait).await;
    }
    let html = session.html().await?;
    let images = classify_images(&html, base_url, policy);
    info!(count = images.len(), "Extracted content images");
    Ok(images)
}

/// Apply the inclusion policy to an HTML document.
pub fn classify_images(html: &str, base_url: &str, policy: &ImagePolicy) -> Vec<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let landmark = match Selector::parse(&policy.landmark_selector) {
        Ok(selector) => document.select(&selector).next(),
        Err(e) => {
            warn!(selector = %policy.landmark_selector, error = ?e, "Invalid landmark selector");
            None
        }
    };
    let root = landmark.unwrap_or_else(|| document.root_element());

    root.select(&CANDIDATES)
        .flat_map(|el| {
            let alt = el.value().attr("alt").unwrap_or_default();
            let class = el.value().attr("class").unwrap_or_default();
            candidate_sources(el)
                .into_iter()
                .filter_map(|src| admit(src, alt, class, base.as_ref(), policy))
                .collect::<Vec<_>>()
        })
        .unique()
        .collect()
}

fn candidate_sources(el: ElementRef<'_>) -> Vec<&str> {
    match el.value().name() {
        "img" => el.value().attr("src").into_iter().collect(),
        "source" => el
            .value()
            .attr("srcset")
            .map(parse_srcset)
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// URLs of a `srcset` attribute, descriptors dropped.
pub fn parse_srcset(srcset: &str) -> Vec<&str> {
    srcset
        .split(',')
        .filter_map(|entry| entry.split_whitespace().next())
        .collect()
}

fn contains_deny_token(value: &str) -> bool {
    let lower = value.to_lowercase();
    DENY_TOKENS.iter().any(|token| lower.contains(token))
}

fn admit(
    src: &str,
    alt: &str,
    class: &str,
    base: Option<&Url>,
    policy: &ImagePolicy,
) -> Option<String> {
    let src = src.trim();
    if src.is_empty() || src.to_ascii_lowercase().starts_with("data:") {
        return None;
    }

    let resolved = match base {
        Some(base) => base.join(src),
        None => Url::parse(src),
    };
    let resolved = match resolved {
        Ok(url) => url,
        Err(e) => {
            debug!(src, error = %e, "Unresolvable image source");
            return None;
        }
    };
    let url = resolved.to_string();

    if contains_deny_token(&url) || contains_deny_token(alt) || contains_deny_token(class) {
        debug!(%url, "Rejected chrome image");
        return None;
    }
    match resolved.host_str() {
        Some(host) if policy.host_matches(host) => Some(url),
        _ => {
            debug!(%url, "Rejected off-host image");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::testing::{FakePage, FakeSession};

    const POST_URL: &str = "https://www.linkedin.com/posts/jane_launch-activity-1";

    fn policy() -> ImagePolicy {
        ImagePolicy::from_config(&PipelineConfig::default())
    }

    #[test]
    fn test_srcset_entries_resolved_in_order() {
        let html = r#"<html><body><article>
            <picture><source srcset="a.jpg 1x, b.jpg 2x"></picture>
        </article></body></html>"#;

        let images = classify_images(html, "https://media.licdn.com/dms/image/post/", &policy());
        assert_eq!(
            images,
            vec![
                "https://media.licdn.com/dms/image/post/a.jpg",
                "https://media.licdn.com/dms/image/post/b.jpg",
            ]
        );
    }

    #[test]
    fn test_rejects_deny_tokens_in_url_alt_and_class() {
        let html = r#"<article>
            <img src="https://media.licdn.com/dms/image/profile-displayphoto/1">
            <img src="https://media.licdn.com/dms/image/2" alt="Company LOGO">
            <img src="https://media.licdn.com/dms/image/3" class="feed-shared-Avatar">
            <img src="https://media.licdn.com/dms/image/feedshare/4" alt="chart">
        </article>"#;

        let images = classify_images(html, POST_URL, &policy());
        assert_eq!(images, vec!["https://media.licdn.com/dms/image/feedshare/4"]);
    }

    #[test]
    fn test_no_admitted_url_carries_a_deny_token() {
        for token in DENY_TOKENS {
            for (src, alt, class) in [
                (format!("https://media.licdn.com/x/{token}/1"), String::new(), String::new()),
                ("https://media.licdn.com/x/2".to_string(), token.to_uppercase(), String::new()),
                ("https://media.licdn.com/x/3".to_string(), String::new(), format!("a-{token}-b")),
            ] {
                let html = format!(
                    r#"<article><img src="{src}" alt="{alt}" class="{class}"></article>"#
                );
                assert!(
                    classify_images(&html, POST_URL, &policy()).is_empty(),
                    "token {token} admitted via src={src} alt={alt} class={class}"
                );
            }
        }
    }

    #[test]
    fn test_rejects_empty_inline_and_off_host() {
        let html = r#"<article>
            <img src="">
            <img src="data:image/png;base64,iVBORw0KGgo=">
            <img src="https://static.licdn.com/sc/h/photo.png">
            <img src="https://evil.example/media.licdn.com/x.jpg">
            <img>
        </article>"#;

        assert!(classify_images(html, POST_URL, &policy()).is_empty());
    }

    #[test]
    fn test_accepts_media_subdomain() {
        let html = r#"<article><img src="https://cdn.media.licdn.com/x.jpg"></article>"#;
        assert_eq!(
            classify_images(html, POST_URL, &policy()),
            vec!["https://cdn.media.licdn.com/x.jpg"]
        );
    }

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let html = r#"<article>
            <img src="https://media.licdn.com/b.jpg">
            <img src="https://media.licdn.com/a.jpg">
            <picture><source srcset="https://media.licdn.com/b.jpg 1x, https://media.licdn.com/c.jpg 2x"></picture>
            <img src="https://media.licdn.com/a.jpg">
        </article>"#;

        assert_eq!(
            classify_images(html, POST_URL, &policy()),
            vec![
                "https://media.licdn.com/b.jpg",
                "https://media.licdn.com/a.jpg",
                "https://media.licdn.com/c.jpg",
            ]
        );
    }

    #[test]
    fn test_scoped_to_landmark_when_present() {
        let html = r#"<body>
            <img src="https://media.licdn.com/outside.jpg">
            <article><img src="https://media.licdn.com/inside.jpg"></article>
        </body>"#;
        assert_eq!(
            classify_images(html, POST_URL, &policy()),
            vec!["https://media.licdn.com/inside.jpg"]
        );
    }

    #[test]
    fn test_whole_document_without_landmark() {
        let html = r#"<body><div><img src="https://media.licdn.com/only.jpg"></div></body>"#;
        assert_eq!(
            classify_images(html, POST_URL, &policy()),
            vec!["https://media.licdn.com/only.jpg"]
        );
    }

    #[test]
    fn test_parse_srcset() {
        assert_eq!(parse_srcset("a.jpg 1x, b.jpg 2x"), vec!["a.jpg", "b.jpg"]);
        assert_eq!(parse_srcset(" c.jpg 480w ,, d.jpg"), vec!["c.jpg", "d.jpg"]);
    }

    #[tokio::test]
    async fn test_extract_images_scrolls_fixed_cycles() {
        let (session, counters) = FakeSession::new(FakePage {
            html: r#"<article><img src="https://media.licdn.com/p.jpg"></article>"#.to_string(),
            ..FakePage::default()
        });
        let policy = ImagePolicy {
            scroll_cycles: 3,
            scroll_wait: Duration::ZERO,
            ..policy()
        };

        let images = extract_images(&session, POST_URL, &policy).await.unwrap();
        assert_eq!(images, vec!["https://media.licdn.com/p.jpg"]);
        assert_eq!(counters.scrolls.get(), 3);
    }
}
