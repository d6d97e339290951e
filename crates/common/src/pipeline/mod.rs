//! Answer pipeline - retrieval, confidence evaluation, and response assembly
//!
//! Provides:
//! - Query complexity analysis that picks the retrieval depth
//! - Cached knowledge-base retrieval with score filtering
//! - Confidence evaluation driving conditional web-search escalation
//! - Web result parsing, relevance gating, and context assembly
//! - Prompt construction, source attribution, and the answer orchestrator

pub mod assembler;
pub mod cache;
pub mod confidence;
pub mod orchestrator;
pub mod prompt;
pub mod query;
pub mod sources;
pub mod websearch;

pub use assembler::{ContextAssembler, ContextAssemblerConfig};
pub use cache::{RetrievalCache, RetrievalCacheConfig};
pub use confidence::{ConfidenceAssessment, ConfidenceConfig, ConfidenceEvaluator, ConfidenceReason};
pub use orchestrator::{
    AgentScope, AnswerOrchestrator, AnswerOrchestratorConfig, ChunkSource, ConversationReader,
};
pub use prompt::{build_chat_prompt, ConversationExchange, PromptInputs};
pub use query::{QueryAnalyzer, QueryAnalyzerConfig, QueryComplexity, QueryComplexityProfile};
pub use sources::extract_sources;
pub use websearch::{
    optimize_search_query, parse_web_results, RelevanceGate, RelevanceGateConfig, WebFindings,
};

use serde::{Deserialize, Serialize};

/// Metadata attached to a stored chunk at ingestion time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Name of the document the chunk was extracted from
    #[serde(default)]
    pub filename: String,
    /// Origin of the document (e.g. "document" for direct uploads)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// RFC 3339 timestamp recorded when the document was ingested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_time: Option<String>,
    /// MIME type reported at upload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Zero-based position of the chunk within its document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    /// Chunk text, duplicated into metadata so retrieval can return it
    #[serde(default)]
    pub text: String,
}

/// A chunk returned from the vector index, ordered by similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Chunk text content
    pub text: String,
    /// Cosine similarity against the query embedding
    pub similarity_score: f32,
    /// Metadata stored alongside the vector
    pub metadata: ChunkMetadata,
    /// 1-based position in the result list
    pub rank: usize,
}

/// A single web search hit surfaced to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebResult {
    /// Result title
    pub title: String,
    /// Result URL
    pub url: String,
    /// Short snippet, clipped to 200 characters
    pub snippet: String,
}

/// Where a cited source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Ingested document chunk
    Document,
    /// Link surfaced by web search
    WebLink,
}

/// A citation attached to an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Document filename, or the page title for web links
    pub filename: String,
    /// Similarity of the best matching chunk; 0.0 for web links
    pub similarity_score: f32,
    /// Citation kind
    pub source_type: SourceType,
    /// Target URL, present for web links only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Snippet of the linked page, present for web links only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// Ingestion timestamp, present for document sources only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_time: Option<String>,
}

/// Final product of the answer pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    /// Natural-language answer text
    pub response: String,
    /// Citations backing the answer
    pub sources: Vec<Source>,
    /// Number of knowledge-base chunks that survived filtering
    pub chunks_found: usize,
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
        }
    }
}

/// One stored message, in conversation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who wrote the message
    pub sender: Sender,
    /// Message text
    pub text: String,
}
