//! Follow-up question generation and relevance filtering.
//!
//! Follow-ups are only emitted when confidence is low; each candidate must
//! clear a minimum token-overlap relevance against the current question or
//! the recent conversation, so the model cannot steer the session off-topic.

use std::collections::HashSet;

use spaces_inference::{ChatOptions, LlmProvider};

const FOLLOWUP_PROMPT: &str = "Ask clarifying follow-up questions that would help answer the \
user's current request. Keep them short, specific, and tied to the user's intent. \
Return a numbered list.";

fn normalize(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .trim()
        .to_string()
}

fn tokens(value: &str) -> HashSet<String> {
    normalize(value)
        .split_whitespace()
        .filter(|t| t.len() > 1)
        .map(String::from)
        .collect()
}

/// Jaccard similarity of token sets.
pub fn jaccard_similarity(left: &str, right: &str) -> f32 {
    let l = tokens(left);
    let r = tokens(right);
    if l.is_empty() || r.is_empty() {
        return 0.0;
    }
    let inter = l.intersection(&r).count() as f32;
    let union = l.union(&r).count() as f32;
    inter / union
}

/// Drop duplicates, echoes of the question, and candidates below the
/// relevance floor against both the question and the conversation snippet.
pub fn filter_followups(
    candidates: Vec<String>,
    question: &str,
    conversation_snippet: &str,
    relevance_min: f32,
    max: usize,
) -> Vec<String> {
    let q_norm = normalize(question);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for candidate in candidates {
        let trimmed = candidate.trim().to_string();
        if trimmed.is_empty() {
            continue;
        }
        let norm = normalize(&trimmed);
        if norm.is_empty() || norm == q_norm || !seen.insert(norm.clone()) {
            continue;
        }
        let question_sim = jaccard_similarity(&trimmed, question);
        let convo_sim = if conversation_snippet.is_empty() {
            0.0
        } else {
            jaccard_similarity(&trimmed, conversation_snippet)
        };
        if question_sim < relevance_min && convo_sim < relevance_min {
            continue;
        }
        out.push(trimmed);
        if out.len() >= max {
            break;
        }
    }
    out
}

/// Generate and filter follow-up questions.
pub async fn generate_followups(
    provider: &LlmProvider,
    question: &str,
    context_preview: &str,
    conversation_snippet: &str,
    relevance_min: f32,
    max: usize,
) -> Vec<String> {
    if max == 0 {
        return Vec::new();
    }

    let convo_block = if conversation_snippet.is_empty() {
        String::new()
    } else {
        format!("Conversation so far:\n{conversation_snippet}\n\n")
    };
    let prompt = format!(
        "{convo_block}Current question: {question}\nContext preview: {context_preview}"
    );

    let raw = provider
        .chat(
            &prompt,
            "",
            FOLLOWUP_PROMPT,
            ChatOptions {
                max_tokens: 140,
                temperature: 0.2,
            },
        )
        .await;

    let candidates: Vec<String> = raw
        .map(|text| {
            text.lines()
                .map(|line| {
                    line.trim()
                        .trim_start_matches(|c: char| {
                            c.is_ascii_digit() || c == '.' || c == ')' || c == '-'
                        })
                        .trim()
                        .to_string()
                })
                .filter(|line| line.ends_with('?') || line.len() > 6)
                .collect()
        })
        .unwrap_or_default();

    filter_followups(candidates, question, conversation_snippet, relevance_min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jaccard_of_disjoint_is_zero() {
        assert_eq!(jaccard_similarity("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn jaccard_of_identical_is_one() {
        assert!((jaccard_similarity("data retention", "data retention") - 1.0).abs() < 1e-6);
    }

    #[test]
    fn filter_drops_irrelevant_candidates() {
        let out = filter_followups(
            vec![
                "Which regions does the data retention policy cover?".to_string(),
                "What is your favorite color?".to_string(),
            ],
            "what is the data retention policy",
            "",
            0.08,
            5,
        );
        assert_eq!(out.len(), 1);
        assert!(out[0].contains("retention"));
    }

    #[test]
    fn filter_drops_echoes_and_duplicates() {
        let out = filter_followups(
            vec![
                "what is the data retention policy".to_string(),
                "Which systems enforce the retention policy?".to_string(),
                "Which systems enforce the retention policy?".to_string(),
            ],
            "what is the data retention policy",
            "",
            0.08,
            5,
        );
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn filter_respects_cap() {
        let candidates: Vec<String> = (0..5)
            .map(|i| format!("retention policy question number {i}?"))
            .collect();
        let out = filter_followups(candidates, "retention policy", "", 0.08, 2);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn conversation_relevance_can_rescue_candidate() {
        let out = filter_followups(
            vec!["Should the archive tier use glacier storage?".to_string()],
            "what next",
            "we discussed the archive tier and glacier storage costs",
            0.08,
            5,
        );
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn no_provider_yields_no_followups() {
        let out = generate_followups(
            &LlmProvider::None,
            "question",
            "preview",
            "",
            0.08,
            2,
        )
        .await;
        assert!(out.is_empty());
    }
}
