//! Query analysis - complexity classification for retrieval depth
//!
//! Provides:
//! - Keyword-based scoring of technical and specific vocabulary
//! - Three-tier complexity classification (simple / moderate / complex)
//! - An optimal chunk count for each tier, consumed by retrieval

use serde::{Deserialize, Serialize};

/// Vocabulary that signals a technical or procedural question.
const TECHNICAL_KEYWORDS: [&str; 12] = [
    "how",
    "why",
    "what",
    "when",
    "where",
    "troubleshoot",
    "error",
    "problem",
    "issue",
    "configure",
    "install",
    "setup",
];

/// Vocabulary that signals the question targets a specific subsystem.
const SPECIFICITY_TERMS: [&str; 7] = [
    "api",
    "database",
    "server",
    "configuration",
    "authentication",
    "deployment",
    "integration",
];

/// Complexity tier assigned to an incoming query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryComplexity {
    /// Short query with no technical vocabulary
    Simple,
    /// Mid-length query with limited technical vocabulary
    Moderate,
    /// Everything else
    Complex,
}

impl QueryComplexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryComplexity::Simple => "simple",
            QueryComplexity::Moderate => "moderate",
            QueryComplexity::Complex => "complex",
        }
    }
}

/// Outcome of analyzing a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryComplexityProfile {
    /// Assigned tier
    pub complexity: QueryComplexity,
    /// Number of chunks retrieval should request for this tier
    pub optimal_chunk_count: usize,
    /// Count of technical keywords present in the query
    pub technical_score: usize,
    /// Count of specificity terms present in the query
    pub specificity_score: usize,
    /// Whitespace-delimited word count of the raw query
    pub word_count: usize,
}

/// Configuration for query complexity analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalyzerConfig {
    /// Maximum word count for the simple tier
    pub simple_max_words: usize,
    /// Chunks retrieved for simple queries
    pub simple_chunk_count: usize,
    /// Maximum word count for the moderate tier
    pub moderate_max_words: usize,
    /// Maximum technical score for the moderate tier
    pub moderate_max_technical: usize,
    /// Chunks retrieved for moderate queries
    pub moderate_chunk_count: usize,
    /// Chunks retrieved for complex queries
    pub complex_chunk_count: usize,
}

impl Default for QueryAnalyzerConfig {
    fn default() -> Self {
        Self {
            simple_max_words: 3,
            simple_chunk_count: 3,
            moderate_max_words: 8,
            moderate_max_technical: 2,
            moderate_chunk_count: 5,
            complex_chunk_count: 8,
        }
    }
}

/// Classifies queries into complexity tiers to size retrieval.
#[derive(Debug, Clone)]
pub struct QueryAnalyzer {
    config: QueryAnalyzerConfig,
}

impl QueryAnalyzer {
    pub fn new(config: QueryAnalyzerConfig) -> Self {
        Self { config }
    }

    /// Analyze a query and produce its complexity profile.
    ///
    /// Keyword scores count distinct vocabulary entries present as
    /// substrings of the lowercased query. Word count is taken on the
    /// raw query, so classification is stable under case changes.
    pub fn analyze(&self, query: &str) -> QueryComplexityProfile {
        let normalized = query.to_lowercase();
        let normalized = normalized.trim();

        let technical_score = count_present(normalized, &TECHNICAL_KEYWORDS);
        let specificity_score = count_present(normalized, &SPECIFICITY_TERMS);
        let word_count = query.split_whitespace().count();

        let (complexity, optimal_chunk_count) = if word_count <= self.config.simple_max_words
            && technical_score == 0
        {
            (QueryComplexity::Simple, self.config.simple_chunk_count)
        } else if word_count <= self.config.moderate_max_words
            && technical_score <= self.config.moderate_max_technical
        {
            (QueryComplexity::Moderate, self.config.moderate_chunk_count)
        } else {
            (QueryComplexity::Complex, self.config.complex_chunk_count)
        };

        QueryComplexityProfile {
            complexity,
            optimal_chunk_count,
            technical_score,
            specificity_score,
            word_count,
        }
    }
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        Self::new(QueryAnalyzerConfig::default())
    }
}

/// Counts how many vocabulary entries appear in the normalized query.
///
/// Each entry contributes at most one point regardless of how many
/// times it occurs.
fn count_present(normalized: &str, vocabulary: &[&str]) -> usize {
    vocabulary
        .iter()
        .filter(|term| normalized.contains(*term))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_greeting_is_simple() {
        let analyzer = QueryAnalyzer::default();
        let profile = analyzer.analyze("hello there");

        assert_eq!(profile.complexity, QueryComplexity::Simple);
        assert_eq!(profile.optimal_chunk_count, 3);
        assert_eq!(profile.technical_score, 0);
        assert_eq!(profile.word_count, 2);
    }

    #[test]
    fn test_technical_keyword_blocks_simple_tier() {
        let analyzer = QueryAnalyzer::default();
        // Three words, but "error" pushes it out of the simple tier.
        let profile = analyzer.analyze("pump error E42");

        assert_eq!(profile.complexity, QueryComplexity::Moderate);
        assert_eq!(profile.optimal_chunk_count, 5);
        assert_eq!(profile.technical_score, 1);
    }

    #[test]
    fn test_mid_length_question_is_moderate() {
        let analyzer = QueryAnalyzer::default();
        let profile = analyzer.analyze("how do I reset the pump");

        assert_eq!(profile.complexity, QueryComplexity::Moderate);
        assert_eq!(profile.optimal_chunk_count, 5);
    }

    #[test]
    fn test_long_technical_question_is_complex() {
        let analyzer = QueryAnalyzer::default();
        let profile = analyzer
            .analyze("how do I troubleshoot an authentication error in the deployment configuration");

        assert_eq!(profile.complexity, QueryComplexity::Complex);
        assert_eq!(profile.optimal_chunk_count, 8);
        assert!(profile.technical_score >= 3);
        assert!(profile.specificity_score >= 2);
    }

    #[test]
    fn test_keyword_matching_is_case_insensitive() {
        let analyzer = QueryAnalyzer::default();
        let lower = analyzer.analyze("how to configure the server for deployment");
        let upper = analyzer.analyze("HOW TO CONFIGURE THE SERVER FOR DEPLOYMENT");

        assert_eq!(lower.complexity, upper.complexity);
        assert_eq!(lower.technical_score, upper.technical_score);
        assert_eq!(lower.specificity_score, upper.specificity_score);
    }

    #[test]
    fn test_empty_query_is_simple() {
        let analyzer = QueryAnalyzer::default();
        let profile = analyzer.analyze("");

        assert_eq!(profile.complexity, QueryComplexity::Simple);
        assert_eq!(profile.word_count, 0);
    }

    #[test]
    fn test_each_keyword_counts_once() {
        let analyzer = QueryAnalyzer::default();
        let profile = analyzer.analyze("error after error after error in the pump");

        assert_eq!(profile.technical_score, 1);
    }
}
