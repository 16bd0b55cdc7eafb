//! Small helpers shared across the pipeline: log truncation, filename and
//! prefix sanitizing, UTF-16 length measurement, and output directory checks.

use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Truncate a string for logging purposes.
///
/// Cuts at a char boundary at or below `max` bytes and appends the number of
/// bytes dropped.
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Length of `s` in UTF-16 code units, the unit Google Docs indexes by.
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Reduce a filename prefix to alphanumerics, spaces and underscores.
///
/// Falls back to `"post"` when nothing survives.
pub fn sanitize_prefix(prefix: &str) -> String {
    let cleaned: String = prefix
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "post".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Last non-empty path segment of a URL, used to namespace a post's images.
///
/// ```ignore
/// assert_eq!(url_slug("https://www.linkedin.com/posts/jane_launch-123/"), "jane_launch-123");
/// ```
pub fn url_slug(url: &str) -> String {
    let path_segment = Url::parse(url).ok().and_then(|u| {
        u.path_segments()
            .and_then(|mut segs| segs.rfind(|s| !s.is_empty()).map(str::to_string))
    });
    match path_segment {
        Some(seg) => urlencoding::decode(&seg)
            .map(|s| s.into_owned())
            .unwrap_or(seg),
        None => url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
