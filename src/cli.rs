//! Command-line interface.
//!
//! Secrets and the config path fall back to environment variables so they
//! stay out of shell history.

use clap::{ArgGroup, Parser};
use std::error::Error;

/// Append LinkedIn posts to a Google Doc: scrape, clean, summarize, and
/// insert them in one batch.
///
/// ```sh
/// post_scribe --doc-id 1AbC... https://www.linkedin.com/posts/a https://www.linkedin.com/posts/b
/// post_scribe --new-doc-title "Weekly digest" --urls-file urls.txt -r ./reports
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
#[command(group(ArgGroup::new("target").required(true).args(["doc_id", "new_doc_title"])))]
pub struct Cli {
    /// Post URLs, processed in the order given
    pub urls: Vec<String>,

    /// File with one post URL per line; blank lines are ignored
    #[arg(short, long)]
    pub urls_file: Option<String>,

    /// Id of the existing document to append to
    #[arg(short, long)]
    pub doc_id: Option<String>,

    /// Create a new document with this title and append to it
    #[arg(short, long)]
    pub new_doc_title: Option<String>,

    /// Optional path to config.yaml file
    #[arg(short, long, env = "POST_SCRIBE_CONFIG")]
    pub config: Option<String>,

    /// Directory for JSON run reports
    #[arg(short, long)]
    pub report_dir: Option<String>,

    /// API key for the chat completions endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,

    /// OAuth access token with Docs and Drive scopes
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    pub google_access_token: String,
}

/// Non-empty, trimmed lines of a URL list.
pub fn parse_url_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Positional URLs followed by those in `--urls-file`.
pub async fn load_urls(cli: &Cli) -> Result<Vec<String>, Box<dyn Error>> {
    let mut urls = cli.urls.clone();
    if let Some(path) = &cli.urls_file {
        let text = tokio::fs::read_to_string(path).await?;
        urls.extend(parse_url_lines(&text));
    }
    if urls.is_empty() {
        return Err("no post URLs given".into());
    }
    Ok(urls)
}
