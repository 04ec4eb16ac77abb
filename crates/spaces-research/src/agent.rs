//! The Deep Research agent.
//!
//! One `ask` runs an explicit state machine under a hard wall-clock budget:
//!
//! ```text
//! PLAN → LOCAL_RETRIEVE → COVERAGE_EVAL
//!       ├─ weak → REWRITE → LOCAL_RETRIEVE (once) → COVERAGE_EVAL
//!       │                                         ├─ weak | force_web → WEB_SEARCH
//!       │                                         └─ strong ─┐
//!       └─ strong ─────────────────────────────────────────── ├→ MISSING_CONCEPTS → SYNTHESIS
//!                                                             └→ SYNTHESIS
//! ```
//!
//! Every transition checks the remaining budget; once it drops below the
//! per-phase floor the run short-circuits to synthesis with whatever
//! evidence exists, so a stalled sub-call degrades the answer instead of
//! hanging the request.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use spaces_core::{
    ActivityKind, ChunkHit, EmbeddingBackend, RefSource, Reference, ResearchMessage, Result,
    Settings, Tenant, WebHit, WebSearch,
};
use spaces_db::Database;
use spaces_inference::{ChatOptions, LlmProvider};
use spaces_search::{HybridOptions, Retriever};

use crate::budget::Budget;
use crate::confidence::{confidence_score, source_confidence, ConfidenceInputs};
use crate::coverage::{Coverage, CoverageThresholds};
use crate::followup::generate_followups;
use crate::planner;
use crate::session::SessionStore;
use crate::urls::gather_url_contexts;

const REWRITE_PROMPT: &str = "Rewrite the user question into a concise search phrase. \
Use 6-12 words, drop filler, keep proper nouns. Return only the phrase.";

const MISSING_PROMPT: &str = "Given the question and the available context preview, list \
concepts or subtopics that are NOT covered by the context but would be needed to answer \
fully. Return a short comma-separated list, or nothing if the context suffices.";

const SYNTHESIS_PROMPT: &str = "You must ground every claim in the provided context. \
If the context is insufficient, explicitly say what is missing and avoid speculation. \
Cite the relevant evidence by referring to the section labels (LOCAL KB, USER URL, WEB).";

const REFINE_PROMPT: &str = "Refine and improve the draft answer using the provided context. \
Ground each statement in the context; if evidence is missing or conflicting, say so clearly \
rather than guessing. Prefer concise, factual language.";

/// Pages fetched in full from the web results.
const WEB_FETCH_PAGES: usize = 2;

/// One question to the agent.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub conversation_id: String,
    pub message: String,
    pub force_web: bool,
    pub urls: Vec<String>,
    pub provider_override: Option<String>,
}

/// The agent's answer with its evidence metadata.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResearchOutcome {
    pub conversation_id: String,
    pub answer: String,
    pub confidence: f32,
    pub web_attempted: bool,
    pub elapsed_seconds: f64,
    pub references: Vec<Reference>,
    pub followup_questions: Vec<String>,
}

/// Stateful per-conversation research agent.
pub struct DeepResearchAgent {
    retriever: Retriever,
    provider: LlmProvider,
    web: Option<Arc<dyn WebSearch>>,
    embedder: Arc<dyn EmbeddingBackend>,
    sessions: SessionStore,
    db: Database,
    settings: Arc<Settings>,
}

impl DeepResearchAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        retriever: Retriever,
        provider: LlmProvider,
        web: Option<Arc<dyn WebSearch>>,
        embedder: Arc<dyn EmbeddingBackend>,
        sessions: SessionStore,
        db: Database,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            retriever,
            provider,
            web,
            embedder,
            sessions,
            db,
            settings,
        }
    }

    /// Start a conversation for a tenant.
    pub async fn start(&self, tenant: Tenant) -> Result<String> {
        self.sessions.start(tenant).await
    }

    /// Run one research turn. Never hangs: returns a best partial answer
    /// when the budget runs out.
    pub async fn ask(&self, tenant: Tenant, request: AskRequest) -> Result<ResearchOutcome> {
        let budget = Budget::new(self.settings.research_budget());
        let provider = self
            .provider
            .with_override(request.provider_override.as_deref(), &self.settings);
        let thresholds = CoverageThresholds::from(&*self.settings);

        self.sessions
            .repo()
            .ensure(&request.conversation_id, tenant, None)
            .await?;
        let mut session = self.sessions.load(tenant, &request.conversation_id).await?;
        session
            .messages
            .push(ResearchMessage::new("user", request.message.clone()));

        let recent_snippet = conversation_tail(&session.messages, 8, 1000);

        // ── PLAN ────────────────────────────────────────────────────────────
        let sub_questions = if budget.exhausted() {
            vec![request.message.clone()]
        } else {
            self.timed(&budget, Duration::from_secs(20), {
                let provider = provider.clone();
                let message = request.message.clone();
                let tail = recent_snippet.clone();
                async move { planner::plan(&provider, &message, &tail).await }
            })
            .await
            .unwrap_or_else(|| vec![request.message.clone()])
        };
        debug!(
            subsystem = "research",
            component = "agent",
            op = "plan",
            conversation_id = %request.conversation_id,
            result_count = sub_questions.len(),
            "Plan ready"
        );

        // ── USER URLS ──────────────────────────────────────────────────────
        let mut url_contexts: Vec<String> = Vec::new();
        let mut url_refs: Vec<Reference> = Vec::new();
        if !request.urls.is_empty() {
            if let Some(web) = &self.web {
                let gathered = gather_url_contexts(
                    web,
                    &self.embedder,
                    &request.urls,
                    &request.message,
                    self.settings.research_top_k_local,
                    &budget,
                )
                .await;
                for (rank, ctx) in gathered.iter().enumerate() {
                    url_contexts.push(format!("External URL: {}\n{}", ctx.url, ctx.text));
                    url_refs.push(Reference {
                        source: RefSource::Url,
                        document_id: None,
                        chunk_index: None,
                        title: None,
                        url: Some(ctx.url.clone()),
                        snippet: Some(truncate_chars(&ctx.text, 480).to_string()),
                        rank: rank + 1,
                    });
                }
            } else {
                warn!(
                    subsystem = "research",
                    component = "agent",
                    "URLs supplied but no web provider configured; skipping URL evidence"
                );
            }
        }

        // ── LOCAL_RETRIEVE ─────────────────────────────────────────────────
        let mut all_hits: Vec<ChunkHit> = Vec::new();
        let mut local_contexts: Vec<String> = Vec::new();
        self.retrieve_round(&sub_questions, tenant, &budget, &mut all_hits, &mut local_contexts)
            .await;

        // ── COVERAGE_EVAL / REWRITE ────────────────────────────────────────
        let mut coverage = Coverage::evaluate(&all_hits);
        let mut rewritten_query: Option<String> = None;
        if !coverage.is_strong(thresholds) && !budget.exhausted() {
            rewritten_query = self
                .timed(&budget, Duration::from_secs(15), {
                    let provider = provider.clone();
                    let message = request.message.clone();
                    let tail = recent_snippet.clone();
                    async move {
                        provider
                            .chat(
                                &message,
                                &tail,
                                REWRITE_PROMPT,
                                ChatOptions {
                                    max_tokens: 64,
                                    temperature: 0.2,
                                },
                            )
                            .await
                    }
                })
                .await
                .flatten()
                .and_then(|raw| raw.lines().next().map(|l| l.trim().to_string()))
                .filter(|phrase| !phrase.is_empty());

            if let Some(phrase) = &rewritten_query {
                self.retrieve_round(
                    std::slice::from_ref(phrase),
                    tenant,
                    &budget,
                    &mut all_hits,
                    &mut local_contexts,
                )
                .await;
                coverage = Coverage::evaluate(&all_hits);
            }
        }

        // ── WEB_SEARCH ─────────────────────────────────────────────────────
        let weak_after_rewrite = !coverage.is_strong(thresholds);
        let mut web_attempted = false;
        let mut web_hits: Vec<WebHit> = Vec::new();
        let mut web_contexts: Vec<String> = Vec::new();
        if should_search_web(request.force_web, weak_after_rewrite, self.web.is_some())
            && !budget.exhausted()
        {
            web_attempted = true;
            let web = self.web.as_ref().expect("gated on web.is_some()");
            let phrase = rewritten_query.as_deref().unwrap_or(&request.message);
            match self
                .timed(
                    &budget,
                    Duration::from_secs(self.settings.research_web_timeout_secs),
                    web.search(phrase, self.settings.research_top_k_web),
                )
                .await
            {
                Some(Ok(hits)) => web_hits = hits,
                Some(Err(e)) => {
                    warn!(subsystem = "research", component = "agent", error = %e, "Web search failed");
                }
                None => {
                    warn!(subsystem = "research", component = "agent", "Web search timed out");
                }
            }

            for hit in &web_hits {
                web_contexts.push(format!(
                    "Web result: {}\nURL: {}\nSnippet: {}",
                    hit.title, hit.url, hit.snippet
                ));
            }
            // Full page text for the best few results.
            for hit in web_hits.iter().take(WEB_FETCH_PAGES) {
                if budget.exhausted() {
                    break;
                }
                if let Some(Ok(page)) = self
                    .timed(
                        &budget,
                        Duration::from_secs(self.settings.research_web_timeout_secs),
                        web.fetch(&hit.url),
                    )
                    .await
                {
                    web_contexts.push(format!(
                        "Web page: {}\nURL: {}\n{}",
                        hit.title,
                        hit.url,
                        truncate_chars(&page, 2000)
                    ));
                }
            }
        }

        // ── MISSING_CONCEPTS ───────────────────────────────────────────────
        let mut missing_concepts: Vec<String> = Vec::new();
        let mut missing_contexts: Vec<String> = Vec::new();
        for _ in 0..self.settings.research_missing_loops {
            if budget.exhausted() {
                break;
            }
            let preview_src =
                render_groups(&local_contexts, &url_contexts, &web_contexts, &missing_contexts);
            let preview = truncate_chars(&preview_src, 1200).to_string();
            let raw = self
                .timed(&budget, Duration::from_secs(15), {
                    let provider = provider.clone();
                    let message = request.message.clone();
                    async move {
                        provider
                            .chat(
                                &format!("Question: {message}\nContext preview: {preview}"),
                                "",
                                MISSING_PROMPT,
                                ChatOptions {
                                    max_tokens: 80,
                                    temperature: 0.2,
                                },
                            )
                            .await
                    }
                })
                .await
                .flatten();

            let fresh: Vec<String> = raw
                .map(|text| parse_concept_list(&text))
                .unwrap_or_default()
                .into_iter()
                .filter(|c| !missing_concepts.contains(c))
                .take(self.settings.research_missing_top_k)
                .collect();
            if fresh.is_empty() {
                break;
            }

            for concept in &fresh {
                if budget.exhausted() {
                    break;
                }
                let k = (self.settings.research_top_k_local / 2).max(4);
                match self
                    .retriever
                    .hybrid(concept, tenant, k, HybridOptions::default())
                    .await
                {
                    Ok(hits) if !hits.is_empty() => {
                        missing_contexts
                            .push(hits.iter().map(|h| h.content.as_str()).collect::<Vec<_>>().join("\n\n"));
                        merge_hits(&mut all_hits, hits);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            subsystem = "research",
                            component = "agent",
                            concept = %concept,
                            error = %e,
                            "Missing-concept retrieval failed"
                        );
                    }
                }
            }
            missing_concepts.extend(fresh);
        }
        coverage = Coverage::evaluate(&all_hits);

        // ── SYNTHESIS ──────────────────────────────────────────────────────
        if !missing_concepts.is_empty() {
            missing_contexts.push(format!(
                "Missing concepts to cover: {}",
                missing_concepts.join(", ")
            ));
        }
        let full_context =
            render_groups(&local_contexts, &url_contexts, &web_contexts, &missing_contexts);

        let synthesis_input = if recent_snippet.is_empty() {
            full_context.clone()
        } else {
            format!("Conversation so far:\n{recent_snippet}\n\n{full_context}")
        };

        let draft = if budget.remaining() > Duration::from_secs(1) {
            self.timed(&budget, budget.remaining(), {
                let provider = provider.clone();
                let message = request.message.clone();
                let context = synthesis_input.clone();
                async move {
                    provider
                        .chat(
                            &message,
                            &context,
                            SYNTHESIS_PROMPT,
                            ChatOptions {
                                max_tokens: 800,
                                temperature: 0.2,
                            },
                        )
                        .await
                }
            })
            .await
            .flatten()
        } else {
            None
        };
        let used_llm = draft.is_some();

        // Best partial when no model output exists: the evidence itself.
        let mut answer = draft
            .clone()
            .unwrap_or_else(|| truncate_chars(&full_context, 1200).to_string());

        // Light refinement pass when there is evidence and time.
        if let Some(draft_text) = &draft {
            if !all_hits.is_empty() && budget.remaining() > Duration::from_secs(10) {
                let refine_input = format!(
                    "Question: {}\n\nDraft Answer:\n{}\n\nContext:\n{}",
                    request.message,
                    draft_text,
                    truncate_chars(&full_context, 15_000)
                );
                let refined = self
                    .timed(&budget, budget.remaining(), {
                        let provider = provider.clone();
                        async move {
                            provider
                                .chat(
                                    &refine_input,
                                    "",
                                    REFINE_PROMPT,
                                    ChatOptions {
                                        max_tokens: 900,
                                        temperature: 0.2,
                                    },
                                )
                                .await
                        }
                    })
                    .await
                    .flatten();
                if let Some(refined) = refined {
                    answer = refined;
                }
            }
        }

        // ── CONFIDENCE / REFERENCES / FOLLOW-UPS ───────────────────────────
        let confidence = confidence_score(ConfidenceInputs {
            coverage,
            has_web_evidence: !web_contexts.is_empty(),
            used_llm,
            baseline: self.settings.research_confidence_baseline,
        });
        let src_confidence = source_confidence(
            coverage.total_hits,
            coverage.unique_docs,
            web_hits.len(),
            url_contexts.len(),
        );

        let mut references = self.local_references(&all_hits, tenant).await;
        references.extend(url_refs);
        for (rank, hit) in web_hits.iter().enumerate() {
            references.push(Reference {
                source: RefSource::Web,
                document_id: None,
                chunk_index: None,
                title: Some(hit.title.clone()),
                url: Some(hit.url.clone()),
                snippet: Some(hit.snippet.clone()),
                rank: rank + 1,
            });
        }

        let followup_questions = if self.settings.research_followup_autosend
            && confidence < self.settings.research_confidence_threshold
            && !budget.exhausted()
        {
            generate_followups(
                &provider,
                &request.message,
                truncate_chars(&full_context, 1200),
                &recent_snippet,
                self.settings.research_followup_relevance_min,
                self.settings.research_followup_max,
            )
            .await
        } else {
            Vec::new()
        };

        // ── PERSIST / RETURN ───────────────────────────────────────────────
        let elapsed_seconds = budget.elapsed_seconds();
        let mut assistant = ResearchMessage::new("assistant", answer.clone());
        assistant.references = references.clone();
        assistant.confidence = Some(confidence);
        assistant.elapsed_seconds = Some(elapsed_seconds);
        assistant.web_attempted = web_attempted;
        assistant.followup_questions = followup_questions.clone();
        session.messages.push(assistant);

        if let Err(e) = self.sessions.save(tenant, &session).await {
            warn!(
                subsystem = "research",
                component = "agent",
                error = %e,
                "Session persist failed; answer still returned"
            );
        }
        if let Err(e) = self
            .db
            .activity
            .record(
                tenant.user_id,
                ActivityKind::DeepResearch,
                json!({
                    "conversation_id": request.conversation_id.clone(),
                    "confidence": confidence,
                    "web_attempted": web_attempted,
                    "source_confidence": src_confidence,
                }),
            )
            .await
        {
            debug!(subsystem = "research", error = %e, "Activity record failed");
        }

        info!(
            subsystem = "research",
            component = "agent",
            op = "ask",
            conversation_id = %request.conversation_id,
            user_id = tenant.user_id,
            confidence,
            web_attempted,
            total_hits = coverage.total_hits,
            duration_ms = (elapsed_seconds * 1000.0) as u64,
            "Research turn complete"
        );

        Ok(ResearchOutcome {
            conversation_id: request.conversation_id,
            answer,
            confidence,
            web_attempted,
            elapsed_seconds,
            references,
            followup_questions,
        })
    }

    /// One hybrid retrieval pass over a set of queries, merging new hits.
    async fn retrieve_round(
        &self,
        queries: &[String],
        tenant: Tenant,
        budget: &Budget,
        all_hits: &mut Vec<ChunkHit>,
        contexts: &mut Vec<String>,
    ) {
        for query in queries {
            if budget.exhausted() {
                break;
            }
            match self
                .timed(
                    budget,
                    Duration::from_secs(20),
                    self.retriever.hybrid(
                        query,
                        tenant,
                        self.settings.research_top_k_local,
                        HybridOptions::default(),
                    ),
                )
                .await
            {
                Some(Ok(hits)) if !hits.is_empty() => {
                    contexts.push(
                        hits.iter()
                            .map(|h| h.content.as_str())
                            .collect::<Vec<_>>()
                            .join("\n\n"),
                    );
                    merge_hits(all_hits, hits);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(
                        subsystem = "research",
                        component = "agent",
                        query = %query,
                        error = %e,
                        "Retrieval failed for sub-question"
                    );
                }
                None => {
                    warn!(
                        subsystem = "research",
                        component = "agent",
                        query = %query,
                        "Retrieval timed out for sub-question"
                    );
                }
            }
        }
    }

    /// Rank local hits for citation and enrich with document metadata.
    async fn local_references(&self, hits: &[ChunkHit], tenant: Tenant) -> Vec<Reference> {
        let mut ranked: Vec<&ChunkHit> = hits.iter().collect();
        ranked.sort_by(|a, b| {
            score_for_ranking(b)
                .partial_cmp(&score_for_ranking(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let keep = self.settings.research_top_k_local.max(5);
        ranked.truncate(keep);

        let doc_ids: Vec<i64> = ranked.iter().map(|h| h.document_id).collect();
        let meta = self
            .db
            .documents
            .get_many(&doc_ids, tenant.user_id)
            .await
            .unwrap_or_default();

        ranked
            .into_iter()
            .enumerate()
            .map(|(rank, hit)| {
                let doc = meta.get(&hit.document_id);
                Reference {
                    source: RefSource::Local,
                    document_id: Some(hit.document_id),
                    chunk_index: Some(hit.chunk_index),
                    title: doc.map(|d| d.file_name.clone()).or(hit.file_name.clone()),
                    url: doc.and_then(|d| d.blob_url.clone()),
                    snippet: Some(truncate_chars(&hit.content, 480).to_string()),
                    rank: rank + 1,
                }
            })
            .collect()
    }

    /// Run a future under the smaller of `cap` and the remaining budget.
    /// `None` means the deadline fired first.
    async fn timed<T>(
        &self,
        budget: &Budget,
        cap: Duration,
        fut: impl std::future::Future<Output = T>,
    ) -> Option<T> {
        tokio::time::timeout(budget.sub_deadline(cap), fut).await.ok()
    }
}

/// The WEB_SEARCH gate.
fn should_search_web(force_web: bool, weak_after_rewrite: bool, provider_available: bool) -> bool {
    provider_available && (force_web || weak_after_rewrite)
}

/// Append hits not already present (dedupe across sub-questions).
fn merge_hits(all: &mut Vec<ChunkHit>, fresh: Vec<ChunkHit>) {
    let seen: HashSet<(i64, i32)> = all.iter().map(|h| h.dedupe_key()).collect();
    all.extend(fresh.into_iter().filter(|h| !seen.contains(&h.dedupe_key())));
}

fn score_for_ranking(hit: &ChunkHit) -> f32 {
    match (hit.distance, hit.score) {
        (Some(d), _) => -d,
        (None, Some(s)) => s,
        (None, None) => 0.0,
    }
}

/// Render the grouped context in the fixed order local → url → web →
/// missing.
fn render_groups(local: &[String], url: &[String], web: &[String], missing: &[String]) -> String {
    let mut blocks = Vec::new();
    if !local.is_empty() {
        blocks.push(format!("=== LOCAL KB EVIDENCE ===\n{}", local.join("\n\n")));
    }
    if !url.is_empty() {
        blocks.push(format!("=== USER URL EVIDENCE ===\n{}", url.join("\n\n")));
    }
    if !web.is_empty() {
        blocks.push(format!("=== WEB EVIDENCE ===\n{}", web.join("\n\n")));
    }
    if !missing.is_empty() {
        blocks.push(format!("=== MISSING CONCEPTS ===\n{}", missing.join("\n\n")));
    }
    if blocks.is_empty() {
        "(No relevant context found in your knowledge base.)".to_string()
    } else {
        blocks.join("\n\n")
    }
}

fn parse_concept_list(raw: &str) -> Vec<String> {
    raw.split(|c| c == ',' || c == '\n')
        .map(|part| part.trim().trim_start_matches(['-', '•', '*']).trim().to_string())
        .filter(|part| !part.is_empty() && part.len() < 80)
        .take(6)
        .collect()
}

/// Last `max_messages` user/assistant contents, capped at `max_chars` from
/// the tail (char-boundary safe).
fn conversation_tail(messages: &[ResearchMessage], max_messages: usize, max_chars: usize) -> String {
    let joined = messages
        .iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .rev()
        .take(max_messages)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let total: usize = joined.chars().count();
    if total <= max_chars {
        return joined;
    }
    joined.chars().skip(total - max_chars).collect()
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(document_id: i64, chunk_index: i32) -> ChunkHit {
        ChunkHit {
            chunk_id: ChunkHit::synthetic_id(document_id, chunk_index),
            document_id,
            chunk_index,
            content: "c".into(),
            distance: None,
            score: None,
            file_name: None,
            source_type: None,
        }
    }

    #[test]
    fn web_gate_requires_provider() {
        assert!(!should_search_web(true, true, false));
        assert!(should_search_web(true, false, true));
        assert!(should_search_web(false, true, true));
        assert!(!should_search_web(false, false, true));
    }

    #[test]
    fn merge_hits_dedupes_across_rounds() {
        let mut all = vec![hit(1, 0), hit(2, 0)];
        merge_hits(&mut all, vec![hit(1, 0), hit(3, 0)]);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn groups_render_in_fixed_order() {
        let out = render_groups(
            &["local evidence".into()],
            &["url evidence".into()],
            &["web evidence".into()],
            &["missing-topic retrieval".into()],
        );
        let local = out.find("LOCAL KB EVIDENCE").unwrap();
        let url = out.find("USER URL EVIDENCE").unwrap();
        let web = out.find("WEB EVIDENCE").unwrap();
        let missing = out.find("MISSING CONCEPTS").unwrap();
        assert!(local < url && url < web && web < missing);
        assert!(out.contains("missing-topic retrieval"));
    }

    #[test]
    fn empty_groups_render_placeholder() {
        let out = render_groups(&[], &[], &[], &[]);
        assert!(out.contains("No relevant context"));
    }

    #[test]
    fn concept_list_parsing() {
        let parsed = parse_concept_list("- data residency, encryption at rest\n• audit logs");
        assert_eq!(
            parsed,
            vec![
                "data residency".to_string(),
                "encryption at rest".to_string(),
                "audit logs".to_string()
            ]
        );
    }

    #[test]
    fn conversation_tail_takes_recent_messages() {
        let messages: Vec<ResearchMessage> = (0..20)
            .map(|i| ResearchMessage::new(if i % 2 == 0 { "user" } else { "assistant" }, format!("message {i}")))
            .collect();
        let tail = conversation_tail(&messages, 4, 1000);
        assert!(tail.contains("message 19"));
        assert!(tail.contains("message 16"));
        assert!(!tail.contains("message 10"));
    }

    #[test]
    fn conversation_tail_caps_chars() {
        let messages = vec![ResearchMessage::new("user", "x".repeat(5000))];
        let tail = conversation_tail(&messages, 8, 100);
        assert_eq!(tail.chars().count(), 100);
    }

    #[test]
    fn ranking_prefers_low_distance_then_high_score() {
        let mut near = hit(1, 0);
        near.distance = Some(0.1);
        let mut far = hit(2, 0);
        far.distance = Some(0.9);
        let mut lexical = hit(3, 0);
        lexical.score = Some(0.5);

        assert!(score_for_ranking(&near) > score_for_ranking(&far));
        assert!(score_for_ranking(&lexical) > score_for_ranking(&far));
    }
}
