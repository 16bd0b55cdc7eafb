//! Pipeline tuning loaded from an optional YAML file.
//!
//! Every field has a default, so an absent or partial file is fine:
//!
//! ```yaml
//! model: gpt-4o-mini
//! temperature: 0.3
//! landmark_selector: article
//! media_host: media.licdn.com
//! image_folder: images
//! rehost_images: true
//! ```

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Chat model name sent with every completion request.
    pub model: String,
    pub temperature: f32,
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    /// Attempts after the first failure, at the client boundary only.
    pub model_retries: usize,

    pub navigation_timeout_ms: u64,
    pub landmark_timeout_ms: u64,
    /// Fixed pause after the landmark appears, before the settle loop.
    pub initial_settle_ms: u64,
    pub settle_interval_ms: u64,
    pub max_settle_iterations: usize,
    pub landmark_selector: String,
    pub headless: bool,

    pub image_scroll_cycles: usize,
    pub image_scroll_wait_ms: u64,
    /// Host serving post media; images elsewhere are rejected.
    pub media_host: String,

    pub image_folder: String,
    /// Upload images to Drive; otherwise the source URL is inserted directly.
    pub rehost_images: bool,
    /// Inline image width and height, in points.
    pub image_size_pt: f64,

    /// Prepend a one-line summary to the cleaned body.
    pub prepend_summary: bool,
    pub derive_insights: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            api_base: "https://api.openai.com/v1".to_string(),
            model_retries: 2,
            navigation_timeout_ms: 60_000,
            landmark_timeout_ms: 15_000,
            initial_settle_ms: 3_000,
            settle_interval_ms: 1_000,
            max_settle_iterations: 30,
            landmark_selector: "article".to_string(),
            headless: true,
            image_scroll_cycles: 3,
            image_scroll_wait_ms: 1_500,
            media_host: "media.licdn.com".to_string(),
            image_folder: "images".to_string(),
            rehost_images: true,
            image_size_pt: 300.0,
            prepend_summary: false,
            derive_insights: true,
        }
    }
}

impl PipelineConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn landmark_timeout(&self) -> Duration {
        Duration::from_millis(self.landmark_timeout_ms)
    }

    pub fn initial_settle(&self) -> Duration {
        Duration::from_millis(self.initial_settle_ms)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    pub fn image_scroll_wait(&self) -> Duration {
        Duration::from_millis(self.image_scroll_wait_ms)
    }
}

/// Parse a YAML document into a config, defaulting every missing field.
pub fn parse_config(yaml: &str) -> Result<PipelineConfig, serde_yaml::Error> {
    if yaml.trim().is_empty() {
        return Ok(PipelineConfig::default());
    }
    serde_yaml::from_str(yaml)
}

/// Load the config file at `path`, or defaults when no path is given.
#[instrument(level = "info")]
pub async fn load_config(path: Option<&str>) -> Result<PipelineConfig, Box<dyn Error>> {
    let Some(path) = path else {
        info!("No config file given; using defaults");
        return Ok(PipelineConfig::default());
    };
    let yaml = tokio::fs::read_to_string(path).await?;
    let config = parse_config(&yaml)?;
    info!(path, model = %config.model, "Loaded configuration");
    Ok(config)
}
