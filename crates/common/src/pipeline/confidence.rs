//! Confidence evaluation - decides whether retrieval alone is enough
//!
//! Provides:
//! - Aggregate signals computed once over the retrieved chunks
//! - An ordered, first-match-wins rule cascade producing a confidence
//!   level, a web-search escalation decision, and a reason label

use serde::{Deserialize, Serialize};

use crate::pipeline::RetrievedChunk;

/// Reason attached to a confidence assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceReason {
    /// Retrieval produced no usable chunks
    NoKbResults,
    /// Several chunks agree strongly with the query
    HighConfidenceKbMatch,
    /// Scores are decent and there is enough text to answer from
    SufficientKbContext,
    /// Partial match; web search should supplement it
    ModerateKbMatchNeedsWeb,
    /// Weak match; web search is the main hope
    LowKbConfidence,
}

impl ConfidenceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceReason::NoKbResults => "no_kb_results",
            ConfidenceReason::HighConfidenceKbMatch => "high_confidence_kb_match",
            ConfidenceReason::SufficientKbContext => "sufficient_kb_context",
            ConfidenceReason::ModerateKbMatchNeedsWeb => "moderate_kb_match_needs_web",
            ConfidenceReason::LowKbConfidence => "low_kb_confidence",
        }
    }
}

/// Thresholds for the confidence cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    /// Average similarity required for a high-confidence match
    pub high_similarity: f32,
    /// Chunks at or above `high_similarity` required for a
    /// high-confidence match
    pub min_high_confidence_chunks: usize,
    /// Average similarity required for the sufficient-context tier
    pub sufficient_similarity: f32,
    /// Total chunk text length required for the sufficient-context tier
    pub min_context_length: usize,
    /// Average similarity required for the moderate tier
    pub moderate_similarity: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            high_similarity: 0.8,
            min_high_confidence_chunks: 2,
            sufficient_similarity: 0.6,
            min_context_length: 500,
            moderate_similarity: 0.4,
        }
    }
}

/// Signals aggregated over the retrieved chunks, computed once and
/// shared by every rule in the cascade.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalSignals {
    pub result_count: usize,
    pub avg_similarity: f32,
    pub high_confidence_chunks: usize,
    pub total_context_length: usize,
}

impl RetrievalSignals {
    fn compute(chunks: &[RetrievedChunk], config: &ConfidenceConfig) -> Self {
        if chunks.is_empty() {
            return Self {
                result_count: 0,
                avg_similarity: 0.0,
                high_confidence_chunks: 0,
                total_context_length: 0,
            };
        }

        let score_sum: f32 = chunks.iter().map(|c| c.similarity_score).sum();
        Self {
            result_count: chunks.len(),
            avg_similarity: score_sum / chunks.len() as f32,
            high_confidence_chunks: chunks
                .iter()
                .filter(|c| c.similarity_score >= config.high_similarity)
                .count(),
            total_context_length: chunks.iter().map(|c| c.text.chars().count()).sum(),
        }
    }
}

/// Result of evaluating retrieval quality for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    /// Confidence in answering from the knowledge base alone
    pub confidence: f32,
    /// Whether web search should run to supplement retrieval
    pub should_search_web: bool,
    /// Which rule fired
    pub reason: ConfidenceReason,
    /// Mean similarity across retrieved chunks
    pub avg_similarity: f32,
    /// Chunks at or above the high-similarity threshold
    pub high_confidence_chunks: usize,
    /// Combined character length of all chunk text
    pub total_context_length: usize,
}

/// One row of the cascade. Rules are checked in order and the first
/// match wins; the final rule matches unconditionally.
struct ConfidenceRule {
    confidence: f32,
    should_search_web: bool,
    reason: ConfidenceReason,
    applies: fn(&RetrievalSignals, &ConfidenceConfig) -> bool,
}

fn no_results(signals: &RetrievalSignals, _: &ConfidenceConfig) -> bool {
    signals.result_count == 0
}

fn strong_agreement(signals: &RetrievalSignals, config: &ConfidenceConfig) -> bool {
    signals.avg_similarity >= config.high_similarity
        && signals.high_confidence_chunks >= config.min_high_confidence_chunks
}

fn broad_context(signals: &RetrievalSignals, config: &ConfidenceConfig) -> bool {
    signals.avg_similarity >= config.sufficient_similarity
        && signals.total_context_length >= config.min_context_length
}

fn partial_match(signals: &RetrievalSignals, config: &ConfidenceConfig) -> bool {
    signals.avg_similarity >= config.moderate_similarity
}

fn fallthrough(_: &RetrievalSignals, _: &ConfidenceConfig) -> bool {
    true
}

const RULES: &[ConfidenceRule] = &[
    ConfidenceRule {
        confidence: 0.0,
        should_search_web: true,
        reason: ConfidenceReason::NoKbResults,
        applies: no_results,
    },
    ConfidenceRule {
        confidence: 0.9,
        should_search_web: false,
        reason: ConfidenceReason::HighConfidenceKbMatch,
        applies: strong_agreement,
    },
    ConfidenceRule {
        confidence: 0.7,
        should_search_web: false,
        reason: ConfidenceReason::SufficientKbContext,
        applies: broad_context,
    },
    ConfidenceRule {
        confidence: 0.5,
        should_search_web: true,
        reason: ConfidenceReason::ModerateKbMatchNeedsWeb,
        applies: partial_match,
    },
    ConfidenceRule {
        confidence: 0.2,
        should_search_web: true,
        reason: ConfidenceReason::LowKbConfidence,
        applies: fallthrough,
    },
];

/// Evaluates retrieval quality against the rule cascade.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceEvaluator {
    config: ConfidenceConfig,
}

impl ConfidenceEvaluator {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, chunks: &[RetrievedChunk]) -> ConfidenceAssessment {
        let signals = RetrievalSignals::compute(chunks, &self.config);

        let rule = RULES
            .iter()
            .find(|rule| (rule.applies)(&signals, &self.config))
            .unwrap_or(&RULES[RULES.len() - 1]);

        ConfidenceAssessment {
            confidence: rule.confidence,
            should_search_web: rule.should_search_web,
            reason: rule.reason,
            avg_similarity: signals.avg_similarity,
            high_confidence_chunks: signals.high_confidence_chunks,
            total_context_length: signals.total_context_length,
        }
    }
}
