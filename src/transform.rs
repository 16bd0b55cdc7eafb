//! Text transforms backed by the language model.
//!
//! Three independent single-shot calls: clean the scraped text, derive a
//! heading, derive insight bullets. Any failure aborts the current post.

use crate::api::{ChatMessage, LanguageModel};
use crate::error::TransformError;
use crate::utils::truncate_for_log;
use tracing::{debug, instrument};

const CLEAN_PROMPT: &str = "You receive the raw visible text of a LinkedIn post page. \
Return only the main body of the post exactly as the author wrote it. \
Remove navigation, reactions, comment threads, author bios, follower counts, \
timestamps, hashtags lists at the very end, and any other platform chrome. \
Do not add commentary.";

const CLEAN_WITH_SUMMARY_PROMPT: &str = "You receive the raw visible text of a LinkedIn post page. \
Start with a single line summarizing the post, then a blank line, then only the main body \
of the post exactly as the author wrote it. Remove navigation, reactions, comment threads, \
author bios, follower counts, timestamps and any other platform chrome. Do not add commentary.";

const HEADING_PROMPT: &str = "Write a short, professional title (at most 12 words) for the following post. \
Reply with the title only, no quotes.";

const INSIGHTS_PROMPT: &str = "List 3 to 5 key takeaways from the following post. \
Each takeaway must be one standalone line. Reply with the lines only.";

/// Runs the three text transforms against one language model.
pub struct TextTransformer<'a, L> {
    model: &'a L,
    prepend_summary: bool,
}

impl<'a, L> TextTransformer<'a, L>
where
    L: LanguageModel,
{
    pub fn new(model: &'a L, prepend_summary: bool) -> Self {
        Self {
            model,
            prepend_summary,
        }
    }

    /// Strip platform chrome and keep the post's body prose.
    #[instrument(level = "info", skip_all, fields(raw_len = raw.len()))]
    pub async fn clean_text(&self, raw: &str) -> Result<String, TransformError> {
        let system = if self.prepend_summary {
            CLEAN_WITH_SUMMARY_PROMPT
        } else {
            CLEAN_PROMPT
        };
        self.ask("clean_text", system, raw).await
    }

    #[instrument(level = "info", skip_all)]
    pub async fn derive_heading(&self, cleaned: &str) -> Result<String, TransformError> {
        let response = self.ask("derive_heading", HEADING_PROMPT, cleaned).await?;
        let heading = strip_quotes(first_line(&response));
        // An empty heading would give the document an empty style range.
        if heading.is_empty() {
            return Err(TransformError::Empty {
                stage: "derive_heading",
            });
        }
        Ok(heading.to_string())
    }

    #[instrument(level = "info", skip_all)]
    pub async fn derive_insights(&self, cleaned: &str) -> Result<Vec<String>, TransformError> {
        let response = self.ask("derive_insights", INSIGHTS_PROMPT, cleaned).await?;
        Ok(parse_insights(&response))
    }

    async fn ask(
        &self,
        stage: &'static str,
        system: &str,
        input: &str,
    ) -> Result<String, TransformError> {
        let messages = [ChatMessage::system(system), ChatMessage::user(input)];
        let response = self
            .model
            .complete(&messages)
            .await
            .map_err(|source| TransformError::Model { stage, source })?;

        let trimmed = response.trim();
        if trimmed.is_empty() {
            return Err(TransformError::Empty { stage });
        }
        debug!(stage, preview = %truncate_for_log(trimmed, 120), "Model responded");
        Ok(trimmed.to_string())
    }
}

/// Split a model response into insight lines, dropping blanks and bullet markers.
pub fn parse_insights(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|line| strip_bullet(line.trim()))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_bullet(line: &str) -> &str {
    let rest = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "));
    if let Some(rest) = rest {
        return rest.trim();
    }
    // "1." / "2)" numbering
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let after = &line[digits..];
        if let Some(rest) = after.strip_prefix('.').or_else(|| after.strip_prefix(')')) {
            return rest.trim();
        }
    }
    line
}

fn first_line(s: &str) -> &str {
    s.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("")
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c: char| c == '"' || c == '\'' || c == '“' || c == '”')
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use std::cell::RefCell;

    struct Scripted {
        replies: RefCell<Vec<Result<String, ModelError>>>,
        prompts: RefCell<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, ModelError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into_iter().rev().collect()),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl LanguageModel for Scripted {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
            self.prompts.borrow_mut().push(messages[0].content.clone());
            self.replies
                .borrow_mut()
                .pop()
                .unwrap_or(Err(ModelError::NoChoices))
        }
    }

    #[test]
    fn test_parse_insights_drops_blanks_and_bullets() {
        let response = "- Ship small\n\n* Measure twice\n3. Talk to users\n• Write it down\n   \n";
        assert_eq!(
            parse_insights(response),
            vec!["Ship small", "Measure twice", "Talk to users", "Write it down"]
        );
    }

    #[test]
    fn test_parse_insights_keeps_plain_lines() {
        assert_eq!(
            parse_insights("2024 was a big year\nHiring is hard"),
            vec!["2024 was a big year", "Hiring is hard"]
        );
    }

    #[tokio::test]
    async fn test_heading_is_first_line_without_quotes() {
        let model = Scripted::new(vec![Ok("\"Lessons From a Failed Launch\"\n".to_string())]);
        let t = TextTransformer::new(&model, false);
        assert_eq!(
            t.derive_heading("body").await.unwrap(),
            "Lessons From a Failed Launch"
        );
    }

    #[tokio::test]
    async fn test_quote_only_heading_is_empty_error() {
        let model = Scripted::new(vec![Ok("\"\"".to_string())]);
        let t = TextTransformer::new(&model, false);
        let err = t.derive_heading("body").await.unwrap_err();
        assert!(matches!(
            err,
            TransformError::Empty {
                stage: "derive_heading"
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_response_is_transform_error() {
        let model = Scripted::new(vec![Ok("   \n".to_string())]);
        let t = TextTransformer::new(&model, false);
        let err = t.clean_text("raw").await.unwrap_err();
        assert!(matches!(err, TransformError::Empty { stage: "clean_text" }));
    }

    #[tokio::test]
    async fn test_model_error_carries_stage() {
        let model = Scripted::new(vec![Err(ModelError::Status {
            status: 500,
            body: "oops".to_string(),
        })]);
        let t = TextTransformer::new(&model, false);
        let err = t.derive_insights("body").await.unwrap_err();
        assert!(matches!(
            err,
            TransformError::Model {
                stage: "derive_insights",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_summary_prompt_selected_by_config() {
        let model = Scripted::new(vec![Ok("a".to_string()), Ok("b".to_string())]);
        TextTransformer::new(&model, true).clean_text("x").await.unwrap();
        TextTransformer::new(&model, false).clean_text("x").await.unwrap();

        let prompts = model.prompts.borrow();
        assert_eq!(prompts[0], CLEAN_WITH_SUMMARY_PROMPT);
        assert_eq!(prompts[1], CLEAN_PROMPT);
    }
}
