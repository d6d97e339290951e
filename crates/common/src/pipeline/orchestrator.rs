//! Answer orchestrator - runs the retrieval-to-answer sequence
//!
//! Provides:
//! - The end-to-end flow: analyze, retrieve, assess, escalate, answer
//! - Graceful degradation when a collaborator is missing or failing
//! - Deterministic fallback answers when the model cannot be used

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::Result;
use crate::metrics::{
    record_chat, record_fallback, record_model, record_retrieval, record_web_search,
};
use crate::pipeline::assembler::ContextAssembler;
use crate::pipeline::cache::RetrievalCache;
use crate::pipeline::confidence::{ConfidenceConfig, ConfidenceEvaluator};
use crate::pipeline::prompt::{build_chat_prompt, pair_exchanges, PromptInputs};
use crate::pipeline::query::{QueryAnalyzer, QueryAnalyzerConfig};
use crate::pipeline::sources::extract_sources;
use crate::pipeline::websearch::{
    optimize_search_query, parse_web_results, RelevanceGate, RelevanceGateConfig, WebFindings,
};
use crate::pipeline::{
    AnswerResult, ContextAssemblerConfig, ConversationTurn, RetrievedChunk, WebResult,
};
use crate::providers::{CompletionModel, CompletionOutcome, WebSearcher};

/// Returned when neither the knowledge base nor web search produced context.
const NO_INFORMATION_RESPONSE: &str = "I'm sorry, I couldn't find any relevant information for \
     your query. Please upload relevant technical documentation or try rephrasing your question.";

/// Returned when the pipeline itself fails.
const RECOVERY_RESPONSE: &str = "I apologize, but I encountered an error while processing your \
     request. Please try again.";

/// Only the most recent stored turns feed prompt history.
const HISTORY_MAX_TURNS: usize = 5;

/// Fallback summaries sample this many context lines.
const FALLBACK_SUMMARY_LINES: usize = 5;

/// Fallback summaries are clipped to this many characters.
const FALLBACK_SUMMARY_CHARS: usize = 300;

/// Resolved agent identity for a scoped chat request.
///
/// Handlers look the agent up once and pass the scope down, so the
/// pipeline itself never needs a registry lookup.
#[derive(Debug, Clone)]
pub struct AgentScope {
    /// Agent display name
    pub name: String,
    /// Vector namespace holding the agent's documents
    pub namespace: String,
    /// Extra prompt instructions attached to the agent
    pub instructions: Option<String>,
}

/// Supplies similarity-ranked chunks for a query.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Retrieves up to `top_k` chunks, restricted to `namespace` when given.
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        namespace: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>>;
}

/// Reads stored conversation turns, oldest first.
#[async_trait]
pub trait ConversationReader: Send + Sync {
    async fn history(&self, conversation_id: Uuid) -> Result<Vec<ConversationTurn>>;
}

/// Tunables for the orchestrator's sub-components.
#[derive(Debug, Clone)]
pub struct AnswerOrchestratorConfig {
    /// Query complexity analysis
    pub analyzer: QueryAnalyzerConfig,
    /// Knowledge-base confidence cascade
    pub confidence: ConfidenceConfig,
    /// Web link relevance gate
    pub gate: RelevanceGateConfig,
    /// Context assembly
    pub assembler: ContextAssemblerConfig,
    /// Web links surfaced per answer
    pub max_web_links: usize,
}

impl Default for AnswerOrchestratorConfig {
    fn default() -> Self {
        Self {
            analyzer: QueryAnalyzerConfig::default(),
            confidence: ConfidenceConfig::default(),
            gate: RelevanceGateConfig::default(),
            assembler: ContextAssemblerConfig::default(),
            max_web_links: 3,
        }
    }
}

/// Drives one chat turn from raw message to final answer.
///
/// The orchestrator is the single recovery boundary for the pipeline:
/// collaborator failures degrade the answer instead of failing the
/// request, and `respond` never returns an error.
pub struct AnswerOrchestrator {
    analyzer: QueryAnalyzer,
    evaluator: ConfidenceEvaluator,
    gate: RelevanceGate,
    assembler: ContextAssembler,
    max_web_links: usize,
    knowledge: Arc<dyn ChunkSource>,
    cache: Arc<RetrievalCache>,
    web: Option<Arc<dyn WebSearcher>>,
    model: Option<Arc<dyn CompletionModel>>,
    conversations: Option<Arc<dyn ConversationReader>>,
}

impl AnswerOrchestrator {
    /// Create an orchestrator over the given collaborators.
    ///
    /// `web`, `model`, and `conversations` are optional capabilities;
    /// passing `None` disables web escalation, model generation, or
    /// history loading respectively.
    pub fn new(
        config: AnswerOrchestratorConfig,
        knowledge: Arc<dyn ChunkSource>,
        cache: Arc<RetrievalCache>,
        web: Option<Arc<dyn WebSearcher>>,
        model: Option<Arc<dyn CompletionModel>>,
        conversations: Option<Arc<dyn ConversationReader>>,
    ) -> Self {
        Self {
            analyzer: QueryAnalyzer::new(config.analyzer),
            evaluator: ConfidenceEvaluator::new(config.confidence),
            gate: RelevanceGate::new(config.gate),
            assembler: ContextAssembler::new(config.assembler),
            max_web_links: config.max_web_links,
            knowledge,
            cache,
            web,
            model,
            conversations,
        }
    }

    /// Runs the full pipeline for one message and always produces an
    /// answer.
    ///
    /// Prior turns are taken from `history` when the caller already
    /// holds them, otherwise loaded through the conversation reader.
    /// Anything that escapes the inner flow is converted into a generic
    /// recovery answer here.
    pub async fn respond(
        &self,
        message: &str,
        conversation_id: Option<Uuid>,
        scope: Option<&AgentScope>,
        history: Option<&[ConversationTurn]>,
    ) -> AnswerResult {
        let started = Instant::now();
        match self
            .try_respond(message, conversation_id, scope, history, started)
            .await
        {
            Ok(result) => result,
            Err(error) => {
                tracing::error!(%error, "Answer pipeline failed, returning recovery answer");
                record_chat(started.elapsed().as_secs_f64(), "recovered", 0);
                AnswerResult {
                    response: RECOVERY_RESPONSE.to_string(),
                    sources: Vec::new(),
                    chunks_found: 0,
                }
            }
        }
    }

    async fn try_respond(
        &self,
        message: &str,
        conversation_id: Option<Uuid>,
        scope: Option<&AgentScope>,
        history: Option<&[ConversationTurn]>,
        started: Instant,
    ) -> Result<AnswerResult> {
        let turns = match history {
            Some(turns) => turns.to_vec(),
            None => self.load_history(conversation_id).await,
        };
        let recent_start = turns.len().saturating_sub(HISTORY_MAX_TURNS);
        let exchanges = pair_exchanges(&turns[recent_start..]);

        let profile = self.analyzer.analyze(message);
        tracing::debug!(
            complexity = profile.complexity.as_str(),
            depth = profile.optimal_chunk_count,
            "Resolved retrieval depth"
        );

        let namespace = scope.map(|s| s.namespace.as_str());
        let retrieval_started = Instant::now();
        let chunks = match self
            .cache
            .get_or_fetch(namespace, message, profile.optimal_chunk_count, || {
                self.knowledge
                    .retrieve(message, profile.optimal_chunk_count, namespace)
            })
            .await
        {
            Ok(chunks) => chunks,
            Err(error) => {
                tracing::warn!(%error, "Knowledge base retrieval failed, continuing without chunks");
                Vec::new()
            }
        };
        record_retrieval(
            retrieval_started.elapsed().as_secs_f64(),
            namespace.is_some(),
            chunks.len(),
        );

        let kb_context = self.assembler.build(&chunks, None);
        let assessment = self.evaluator.evaluate(&chunks);
        tracing::debug!(
            confidence = assessment.confidence,
            reason = assessment.reason.as_str(),
            chunks = chunks.len(),
            "Evaluated knowledge base confidence"
        );

        let mut findings: Option<WebFindings> = None;
        let mut links: Vec<WebResult> = Vec::new();
        if assessment.should_search_web {
            match &self.web {
                Some(searcher) => {
                    let mut web = self.run_web_search(searcher.as_ref(), message).await;
                    web.links.truncate(self.max_web_links);
                    if self.gate.should_include_links(message, &kb_context, &web) {
                        links = web.links.clone();
                    }
                    findings = Some(web);
                }
                None => tracing::debug!("Web search skipped, no searcher configured"),
            }
        }

        let context = self.assembler.build(&chunks, findings.as_ref());
        if context.is_empty() {
            record_chat(started.elapsed().as_secs_f64(), "no_context", 0);
            return Ok(AnswerResult {
                response: NO_INFORMATION_RESPONSE.to_string(),
                sources: Vec::new(),
                chunks_found: 0,
            });
        }

        let (response, outcome) = match &self.model {
            Some(model) => {
                let prompt = build_chat_prompt(&PromptInputs {
                    message,
                    context: &context,
                    links: &links,
                    history: &exchanges,
                    agent_instructions: scope.and_then(|s| s.instructions.as_deref()),
                });
                match self.invoke_model(model.as_ref(), &prompt).await {
                    Some(answer) => (answer, "answered"),
                    None => (fallback_response(&context, message, &links), "fallback"),
                }
            }
            None => {
                record_fallback("model_disabled");
                (fallback_response(&context, message, &links), "fallback")
            }
        };

        let sources = extract_sources(&chunks, &links);
        record_chat(started.elapsed().as_secs_f64(), outcome, chunks.len());

        Ok(AnswerResult {
            response,
            sources,
            chunks_found: chunks.len(),
        })
    }

    async fn load_history(&self, conversation_id: Option<Uuid>) -> Vec<ConversationTurn> {
        match (conversation_id, &self.conversations) {
            (Some(id), Some(reader)) => match reader.history(id).await {
                Ok(turns) => turns,
                Err(error) => {
                    tracing::warn!(%error, conversation_id = %id, "Failed to load conversation history");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        }
    }

    async fn run_web_search(&self, searcher: &dyn WebSearcher, message: &str) -> WebFindings {
        let query = optimize_search_query(message);
        tracing::debug!(%query, "Running web search");

        let started = Instant::now();
        match searcher.search(&query).await {
            Ok(raw) => {
                record_web_search(started.elapsed().as_secs_f64(), true);
                parse_web_results(&raw)
            }
            Err(error) => {
                record_web_search(started.elapsed().as_secs_f64(), false);
                tracing::warn!(%error, "Web search failed, continuing without results");
                WebFindings::default()
            }
        }
    }

    async fn invoke_model(&self, model: &dyn CompletionModel, prompt: &str) -> Option<String> {
        let started = Instant::now();
        match model.complete(prompt).await {
            Ok(CompletionOutcome::Answered(text)) => {
                record_model(started.elapsed().as_secs_f64(), "answered");
                Some(text)
            }
            Ok(CompletionOutcome::Empty) => {
                record_model(started.elapsed().as_secs_f64(), "empty");
                record_fallback("model_empty");
                tracing::warn!("Model returned an empty completion, using fallback answer");
                None
            }
            Err(error) => {
                record_model(started.elapsed().as_secs_f64(), "error");
                record_fallback("model_error");
                tracing::warn!(%error, "Model call failed, using fallback answer");
                None
            }
        }
    }
}

/// Builds the deterministic answer used when the model cannot.
///
/// With context available, its first lines are surfaced directly along
/// with up to two links; without context the user is pointed at the
/// links that survived the gate, or asked for documentation.
fn fallback_response(context: &str, query: &str, links: &[WebResult]) -> String {
    if !context.is_empty() {
        let summary = context
            .lines()
            .take(FALLBACK_SUMMARY_LINES)
            .collect::<Vec<_>>()
            .join(" ");
        let summary: String = summary
            .trim()
            .chars()
            .take(FALLBACK_SUMMARY_CHARS)
            .collect();
        let mut response = format!("Here's what I found: {}...", summary);

        if !links.is_empty() {
            response.push_str("\n\n**Helpful Links:**\n");
            for (i, link) in links.iter().take(2).enumerate() {
                response.push_str(&format!("{}. [{}]({})\n", i + 1, link.title, link.url));
            }
        }

        response.push_str("\n(Note: LLM service temporarily unavailable - showing raw data)");
        return response;
    }

    let mut response = format!("I couldn't find specific documentation for '{}'. ", query);
    if !links.is_empty() {
        response.push_str("However, I found these helpful resources:\n\n");
        for (i, link) in links.iter().take(3).enumerate() {
            response.push_str(&format!("{}. [{}]({})\n", i + 1, link.title, link.url));
        }
        response.push_str("\nTry these links or upload relevant technical manuals for more specific help.");
    } else {
        response.push_str("Try uploading relevant technical manuals or rephrasing your question.");
    }
    response
}
