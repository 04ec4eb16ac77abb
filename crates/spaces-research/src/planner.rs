//! Sub-question planning.
//!
//! The generator breaks the (message + conversation tail) into 2–4 focused
//! sub-questions; any failure falls back to a single-question plan carrying
//! the raw message.

use tracing::debug;

use spaces_inference::{ChatOptions, LlmProvider};

const PLAN_PROMPT: &str = "Break the research question below into focused sub-questions \
that can each be answered by searching a document collection. \
Return a numbered list of 2 to 4 sub-questions and nothing else.";

/// Parse a numbered/bulleted list out of model output.
fn parse_questions(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')' || c == '-' || c == '*')
                .trim()
                .to_string()
        })
        .filter(|line| line.len() > 8)
        .collect()
}

/// Produce the retrieval plan for one ask.
pub async fn plan(provider: &LlmProvider, message: &str, conversation_tail: &str) -> Vec<String> {
    let seed = if conversation_tail.is_empty() {
        message.to_string()
    } else {
        format!("{message}\n\nConversation so far:\n{conversation_tail}")
    };

    let raw = provider
        .chat(
            &seed,
            "",
            PLAN_PROMPT,
            ChatOptions {
                max_tokens: 160,
                temperature: 0.2,
            },
        )
        .await;

    let questions = raw.as_deref().map(parse_questions).unwrap_or_default();
    if (2..=4).contains(&questions.len()) {
        debug!(
            subsystem = "research",
            component = "planner",
            op = "plan",
            result_count = questions.len(),
            "Planned sub-questions"
        );
        return questions;
    }
    if questions.len() > 4 {
        return questions.into_iter().take(4).collect();
    }

    // Single-question fallback: the raw message.
    vec![message.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use spaces_inference::MockInferenceBackend;

    #[tokio::test]
    async fn parses_numbered_plan() {
        let mock = MockInferenceBackend::new().with_fixed_response(
            "1. What does the GDPR say about transfers?\n2. Which safeguards apply to exports?",
        );
        let provider = LlmProvider::Mock(Arc::new(mock));
        let out = plan(&provider, "cross-border transfers", "").await;
        assert_eq!(out.len(), 2);
        assert!(out[0].contains("GDPR"));
    }

    #[tokio::test]
    async fn caps_at_four_questions() {
        let mock = MockInferenceBackend::new().with_fixed_response(
            "1. First question here?\n2. Second question here?\n3. Third question here?\n4. Fourth question here?\n5. Fifth question here?",
        );
        let provider = LlmProvider::Mock(Arc::new(mock));
        let out = plan(&provider, "big topic", "").await;
        assert_eq!(out.len(), 4);
    }

    #[tokio::test]
    async fn generator_failure_falls_back_to_raw_message() {
        let out = plan(&LlmProvider::None, "what is our retention policy?", "").await;
        assert_eq!(out, vec!["what is our retention policy?".to_string()]);
    }

    #[tokio::test]
    async fn degenerate_output_falls_back() {
        let mock = MockInferenceBackend::new().with_fixed_response("ok");
        let provider = LlmProvider::Mock(Arc::new(mock));
        let out = plan(&provider, "the question", "").await;
        assert_eq!(out, vec!["the question".to_string()]);
    }

    #[test]
    fn parse_strips_list_markers() {
        let parsed = parse_questions("1) Alpha question text?\n- Beta question text?\n* short");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], "Alpha question text?");
        assert_eq!(parsed[1], "Beta question text?");
    }
}
