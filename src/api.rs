//! Language-model client with an optional retry decorator.
//!
//! # Architecture
//!
//! - [`LanguageModel`]: core trait, one request in, one completion out
//! - [`OpenAiChat`]: OpenAI-compatible `chat/completions` client
//! - [`RetryComplete`]: decorator that adds exponential backoff to any [`LanguageModel`]
//!
//! Retries live here, at the service boundary. Pipeline stages call
//! `complete` exactly once and treat any error as final.

use crate::error::ModelError;
use rand::{Rng, rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// `"system"` or `"user"`.
    pub role: &'static str,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// Trait for async language-model completion.
///
/// Implementors hold their own model name and temperature, so callers only
/// supply the conversation.
pub trait LanguageModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError>;
}

/// Adds exponential backoff retry logic to any [`LanguageModel`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryComplete<T> {
    /// The wrapped model client.
    inner: T,
    /// Attempts allowed after the first failure.
    max_retries: usize,
    /// Delay before the first retry; doubles per attempt.
    base_delay: StdDuration,
    /// Ceiling on a single delay, before jitter.
    max_delay: StdDuration,
}

impl<T> RetryComplete<T>
where
    T: LanguageModel,
{
    /// Wrap `inner` with backoff.
    ///
    /// # Arguments
    ///
    /// * `inner` - Client that performs a single completion
    /// * `max_retries` - Attempts after the first failure (`0` disables retry)
    /// * `base_delay` - Delay before the first retry
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryComplete<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryComplete")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

/// Largest doubling exponent applied to the base delay.
const MAX_BACKOFF_EXPONENT: usize = 16;

/// Delay before retry number `attempt` (1-based), without jitter.
///
/// # Arguments
///
/// * `base` - Delay before the first retry
/// * `max` - Upper bound on any single delay
/// * `attempt` - Retry number, starting at 1
///
/// # Returns
///
/// `min(base * 2^(attempt-1), max)`; the exponent is clamped so large retry
/// counts from config cannot overflow the shift.
pub fn backoff_delay(base: StdDuration, max: StdDuration, attempt: usize) -> StdDuration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT) as u32;
    base.saturating_mul(1u32 << exponent).min(max)
}

impl<T> LanguageModel for RetryComplete<T>
where
    T: LanguageModel,
{
    #[instrument(level = "info", skip_all)]
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.complete(messages).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "complete() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = backoff_delay(self.base_delay, self.max_delay, attempt);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "complete() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct OpenAiChat {
    /// Shared HTTP client.
    client: Client,
    /// Base URL, e.g. `https://api.openai.com/v1`.
    api_base: String,
    /// Bearer key; never logged.
    api_key: String,
    /// Model name sent with each request.
    model: String,
    /// Sampling temperature sent with each request.
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

impl fmt::Debug for OpenAiChat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiChat")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

impl LanguageModel for OpenAiChat {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        let t0 = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages,
        };
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.trim())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            warn!(
                elapsed_ms = t0.elapsed().as_millis() as u64,
                status = status.as_u16(),
                "Chat completion rejected"
            );
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or(ModelError::NoChoices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Flaky {
        failures_left: Cell<usize>,
        calls: Cell<usize>,
    }

    impl LanguageModel for Flaky {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ModelError> {
            self.calls.set(self.calls.get() + 1);
            if self.failures_left.get() > 0 {
                self.failures_left.set(self.failures_left.get() - 1);
                return Err(ModelError::NoChoices);
            }
            Ok("done".to_string())
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failure() {
        let flaky = Flaky {
            failures_left: Cell::new(1),
            calls: Cell::new(0),
        };
        let retry = RetryComplete::new(flaky, 2, StdDuration::from_millis(1));

        let out = retry.complete(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(out, "done");
        assert_eq!(retry.inner.calls.get(), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let flaky = Flaky {
            failures_left: Cell::new(10),
            calls: Cell::new(0),
        };
        let retry = RetryComplete::new(flaky, 1, StdDuration::from_millis(1));

        let err = retry.complete(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, ModelError::NoChoices));
        assert_eq!(retry.inner.calls.get(), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_calls_once() {
        let flaky = Flaky {
            failures_left: Cell::new(1),
            calls: Cell::new(0),
        };
        let retry = RetryComplete::new(flaky, 0, StdDuration::from_millis(1));

        assert!(retry.complete(&[]).await.is_err());
        assert_eq!(retry.inner.calls.get(), 1);
    }

    #[test]
    fn test_backoff_delay_doubles_then_caps() {
        let base = StdDuration::from_millis(500);
        let max = StdDuration::from_secs(30);
        assert_eq!(backoff_delay(base, max, 1), StdDuration::from_millis(500));
        assert_eq!(backoff_delay(base, max, 2), StdDuration::from_secs(1));
        assert_eq!(backoff_delay(base, max, 4), StdDuration::from_secs(4));
        assert_eq!(backoff_delay(base, max, 7), max);
    }

    #[test]
    fn test_backoff_delay_survives_huge_attempt_counts() {
        let base = StdDuration::from_millis(500);
        let max = StdDuration::from_secs(30);
        for attempt in [33, 64, 1_000, usize::MAX] {
            assert_eq!(backoff_delay(base, max, attempt), max);
        }
        assert_eq!(backoff_delay(base, max, 0), base);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let chat = OpenAiChat::new(Client::new(), "http://localhost:8080/v1/", "k", "m", 0.0);
        assert_eq!(chat.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_chat_request_shape() {
        let messages = [ChatMessage::system("sys"), ChatMessage::user("hello")];
        let body = ChatRequest {
            model: "gpt-4o-mini",
            temperature: 0.5,
            messages: &messages,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
    }
}
