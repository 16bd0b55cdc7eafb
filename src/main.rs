//! # Post Scribe
//!
//! Collects LinkedIn posts into a Google Doc. Each post is rendered in a
//! headless browser, its text is cleaned and titled by a language model, its
//! images are downloaded and re-hosted on Drive, and every post of the run is
//! appended to the document in a single atomic `batchUpdate`.
//!
//! ## Usage
//!
//! ```sh
//! post_scribe --doc-id 1AbC... https://www.linkedin.com/posts/a
//! ```
//!
//! ## Architecture
//!
//! 1. **Rendering**: load the post, wait for it to settle, read text and images
//! 2. **Transforming**: clean the text, derive a heading and key takeaways
//! 3. **Materializing**: download images and re-host them under shareable URIs
//! 4. **Composing**: turn every surviving post into one ordered edit batch
//! 5. **Reporting**: print per-URL outcomes and write a JSON report

use clap::Parser;
use reqwest::Client;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod compose;
mod config;
mod docs;
mod drive;
mod error;
mod materialize;
mod models;
mod outputs;
mod pipeline;
mod scrapers;
mod transform;
mod utils;

use api::{OpenAiChat, RetryComplete};
use cli::{Cli, load_urls};
use docs::GoogleDocs;
use drive::GoogleDrive;
use materialize::Materializer;
use outputs::json;
use pipeline::{Pipeline, Target};
use scrapers::chromium::ChromiumEngine;
use utils::ensure_writable_dir;

const MODEL_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("post_scribe starting up");

    let args = Cli::parse();
    debug!(doc_id = ?args.doc_id, new_doc_title = ?args.new_doc_title, report_dir = ?args.report_dir, "Parsed CLI arguments");

    // Fail before any scraping if the report can't be written
    if let Some(dir) = &args.report_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(path = %dir, error = %e, "Report directory is not writable");
            return Err(e);
        }
    }

    let urls = load_urls(&args).await?;
    let config = config::load_config(args.config.as_deref()).await?;
    info!(count = urls.len(), model = %config.model, "Loaded URLs and configuration");

    let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
    let model = RetryComplete::new(
        OpenAiChat::new(
            client.clone(),
            config.api_base.clone(),
            args.openai_api_key.clone(),
            config.model.clone(),
            config.temperature,
        ),
        config.model_retries,
        MODEL_RETRY_BASE_DELAY,
    );
    let engine = ChromiumEngine::from_config(&config);
    let docs = GoogleDocs::new(client.clone(), args.google_access_token.clone());
    let drive = config
        .rehost_images
        .then(|| GoogleDrive::new(client.clone(), args.google_access_token.clone()));
    if drive.is_none() {
        warn!("Image re-hosting disabled; inserting source URLs directly");
    }

    let target = match (&args.doc_id, &args.new_doc_title) {
        (Some(id), _) => Target::Existing(id.clone()),
        (None, Some(title)) => Target::New(title.clone()),
        (None, None) => return Err("either --doc-id or --new-doc-title is required".into()),
    };

    let pipeline = Pipeline {
        engine: &engine,
        model: &model,
        materializer: Materializer::new(&client, drive.as_ref()),
        docs: &docs,
        config: &config,
    };
    let report = pipeline.run(&urls, &target).await;

    for outcome in &report.results {
        println!("{}: {}", outcome.url, outcome.describe());
    }
    println!("{}", report.message);

    if let Some(dir) = &args.report_dir {
        match json::write_report(&report, std::path::Path::new(dir)).await {
            Ok(path) => info!(path = %path.display(), "Report saved"),
            Err(e) => error!(error = %e, "Failed to write report"),
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        success = report.success,
        "Execution complete"
    );

    if report.success {
        Ok(())
    } else {
        Err(report.message.into())
    }
}
