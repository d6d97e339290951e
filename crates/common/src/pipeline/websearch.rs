//! Web search support - query optimization, result parsing, relevance gating
//!
//! Provides:
//! - Search query optimization that strips conversational filler and
//!   appends a category tag for recognized technical phrasings
//! - Parsing of raw search responses into prompt text and ranked links
//! - A relevance gate deciding whether links belong in the answer

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::pipeline::WebResult;
use crate::providers::web::WebSearchResponse;

/// Links and snippets are clipped to this many characters.
const SNIPPET_MAX_CHARS: usize = 200;

/// Conversational filler removed from search queries.
const STOP_WORDS: [&str; 24] = [
    "how", "do", "i", "can", "you", "help", "me", "with", "what", "is", "the", "a", "an", "and",
    "or", "but", "in", "on", "at", "to", "for", "of", "as", "by",
];

/// Phrases that signal the user explicitly wants web results.
const WEB_INTENT_KEYWORDS: [&str; 24] = [
    "search online",
    "search web",
    "find online",
    "look up online",
    "google",
    "internet",
    "website",
    "url",
    "link",
    "online",
    "current",
    "latest",
    "recent",
    "new",
    "updated",
    "today",
    "official website",
    "manufacturer website",
    "download",
    "buy",
    "purchase",
    "price",
    "cost",
    "where to buy",
];

/// Technical phrasings and the category tag appended when one matches.
/// Checked in order; only the first match contributes a tag.
static TECHNICAL_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\b([A-Z]{2,}\d+[A-Z]*)\b", "model"),
        (r"\berror\s+code\s+(\w+)", "error code"),
        (r"\bpart\s+number\s+(\w+)", "part number"),
        (r"\bmanual\s+for\s+(\w+)", "manual"),
        (r"\btroubleshoot\s+(\w+)", "troubleshooting"),
        (r"\binstall\s+(\w+)", "installation guide"),
        (r"\breplace\s+(\w+)", "replacement guide"),
    ]
    .into_iter()
    .map(|(pattern, tag)| {
        let regex = Regex::new(&format!("(?i){pattern}")).expect("valid technical pattern");
        (regex, tag)
    })
    .collect()
});

/// Product and part phrasings that usually warrant official sources.
static PRODUCT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b[A-Z]{2,}\d+[A-Z]*\b",
        r"\bmodel\s+\w+",
        r"\bpart\s+number",
        r"\bserial\s+number",
    ]
    .into_iter()
    .map(|pattern| Regex::new(&format!("(?i){pattern}")).expect("valid product pattern"))
    .collect()
});

fn strip_punctuation(word: &str) -> &str {
    word.trim_matches(['.', ',', '?', '!'])
}

fn clip_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Rewrites a user message into a focused search query.
///
/// Stop words and very short words are dropped, and when the message
/// matches a known technical phrasing a category tag is appended to
/// steer the search engine. Falls back to the original message when
/// filtering removes everything.
pub fn optimize_search_query(message: &str) -> String {
    let lowered = message.to_lowercase();
    let filtered: Vec<&str> = lowered
        .split_whitespace()
        .filter(|word| word.chars().count() > 2)
        .map(strip_punctuation)
        .filter(|word| !word.is_empty() && !STOP_WORDS.contains(word))
        .collect();

    let mut optimized = filtered.join(" ");
    for (pattern, tag) in TECHNICAL_PATTERNS.iter() {
        if pattern.is_match(message) {
            optimized.push(' ');
            optimized.push_str(tag);
            break;
        }
    }

    let optimized = optimized.trim();
    if optimized.is_empty() {
        message.to_string()
    } else {
        optimized.to_string()
    }
}

/// Parsed web search output: prompt text plus surfaced links.
#[derive(Debug, Clone, Default)]
pub struct WebFindings {
    /// Text summary of the results, fed into the prompt context
    pub text: String,
    /// Links offered to the user, best candidates first
    pub links: Vec<WebResult>,
}

impl WebFindings {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.links.is_empty()
    }
}

/// Converts a raw search response into findings.
///
/// The top three organic hits contribute a link and a text block each.
/// Answer-box and knowledge-graph payloads, when present, are promoted
/// to the front so the most direct answer leads the context.
pub fn parse_web_results(raw: &WebSearchResponse) -> WebFindings {
    let mut links: Vec<WebResult> = Vec::new();
    let mut text_blocks: Vec<String> = Vec::new();

    for result in raw.organic.iter().take(3) {
        if result.link.is_empty() || result.title.is_empty() {
            continue;
        }

        let snippet = if result.snippet.chars().count() > SNIPPET_MAX_CHARS {
            format!("{}...", clip_chars(&result.snippet, SNIPPET_MAX_CHARS))
        } else {
            result.snippet.clone()
        };
        links.push(WebResult {
            title: result.title.clone(),
            url: result.link.clone(),
            snippet,
        });
        text_blocks.push(format!(
            "**{}**\n{}\nSource: {}\n",
            result.title, result.snippet, result.link
        ));
    }

    if let Some(answer_box) = &raw.answer_box {
        if let Some(answer) = &answer_box.answer {
            text_blocks.insert(0, format!("**Quick Answer:** {}\n", answer));
        }
        if let Some(link) = &answer_box.link {
            links.insert(
                0,
                WebResult {
                    title: "Answer Source".to_string(),
                    url: link.clone(),
                    snippet: clip_chars(
                        answer_box.answer.as_deref().unwrap_or_default(),
                        SNIPPET_MAX_CHARS,
                    ),
                },
            );
        }
    }

    if let Some(kg) = &raw.knowledge_graph {
        if let (Some(title), Some(description)) = (&kg.title, &kg.description) {
            text_blocks.insert(0, format!("**{}**\n{}\n", title, description));
            if let Some(website) = &kg.website {
                links.insert(
                    0,
                    WebResult {
                        title: title.clone(),
                        url: website.clone(),
                        snippet: clip_chars(description, SNIPPET_MAX_CHARS),
                    },
                );
            }
        }
    }

    WebFindings {
        text: text_blocks.join("\n\n"),
        links,
    }
}

/// Configuration for the link relevance gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceGateConfig {
    /// Below this many knowledge-base characters, links always show
    pub thin_context_chars: usize,
    /// For product queries, links show below this many characters
    pub product_context_chars: usize,
    /// Keyword overlap ratio above which links show
    pub overlap_threshold: f32,
    /// Words at or below this length are ignored in the overlap check
    pub min_keyword_chars: usize,
}

impl Default for RelevanceGateConfig {
    fn default() -> Self {
        Self {
            thin_context_chars: 100,
            product_context_chars: 300,
            overlap_threshold: 0.5,
            min_keyword_chars: 3,
        }
    }
}

/// Signals shared by every gate rule, computed once per decision.
struct GateSignals {
    message: String,
    message_lower: String,
    kb_chars: usize,
    has_links: bool,
    web_text_lower: String,
}

fn no_links(signals: &GateSignals, _: &RelevanceGateConfig) -> Option<bool> {
    if !signals.has_links {
        Some(false)
    } else {
        None
    }
}

fn explicit_web_intent(signals: &GateSignals, _: &RelevanceGateConfig) -> Option<bool> {
    WEB_INTENT_KEYWORDS
        .iter()
        .any(|keyword| signals.message_lower.contains(keyword))
        .then_some(true)
}

fn thin_kb_context(signals: &GateSignals, config: &RelevanceGateConfig) -> Option<bool> {
    (signals.kb_chars < config.thin_context_chars).then_some(true)
}

fn product_query_thin_docs(signals: &GateSignals, config: &RelevanceGateConfig) -> Option<bool> {
    let is_product_query = PRODUCT_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(&signals.message));

    (is_product_query && signals.kb_chars < config.product_context_chars).then_some(true)
}

fn keyword_overlap(signals: &GateSignals, config: &RelevanceGateConfig) -> Option<bool> {
    let keywords: Vec<&str> = signals
        .message_lower
        .split_whitespace()
        .filter(|word| word.chars().count() > config.min_keyword_chars)
        .map(strip_punctuation)
        .collect();

    let matches = keywords
        .iter()
        .filter(|keyword| signals.web_text_lower.contains(**keyword))
        .count();
    let relevance = matches as f32 / keywords.len().max(1) as f32;

    Some(relevance > config.overlap_threshold)
}

/// Gate rules in evaluation order; the first rule returning a verdict
/// wins, and the overlap rule always returns one.
const GATE_RULES: &[(&str, fn(&GateSignals, &RelevanceGateConfig) -> Option<bool>)] = &[
    ("no_links", no_links),
    ("explicit_web_intent", explicit_web_intent),
    ("thin_kb_context", thin_kb_context),
    ("product_query_thin_docs", product_query_thin_docs),
    ("keyword_overlap", keyword_overlap),
];

/// Decides whether web links should surface in the final answer.
#[derive(Debug, Clone, Default)]
pub struct RelevanceGate {
    config: RelevanceGateConfig,
}

impl RelevanceGate {
    pub fn new(config: RelevanceGateConfig) -> Self {
        Self { config }
    }

    pub fn should_include_links(
        &self,
        message: &str,
        kb_context: &str,
        findings: &WebFindings,
    ) -> bool {
        let signals = GateSignals {
            message: message.to_string(),
            message_lower: message.to_lowercase(),
            kb_chars: kb_context.trim().chars().count(),
            has_links: !findings.links.is_empty(),
            web_text_lower: findings.text.to_lowercase(),
        };

        for (name, rule) in GATE_RULES {
            if let Some(verdict) = rule(&signals, &self.config) {
                tracing::debug!(rule = name, verdict, "Relevance gate decision");
                return verdict;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::web::{AnswerBox, KnowledgeGraph, OrganicResult};

    fn organic(title: &str, link: &str, snippet: &str) -> OrganicResult {
        OrganicResult {
            title: title.to_string(),
            link: link.to_string(),
            snippet: snippet.to_string(),
        }
    }

    fn findings_with_links(text: &str) -> WebFindings {
        WebFindings {
            text: text.to_string(),
            links: vec![WebResult {
                title: "Result".to_string(),
                url: "https://example.com".to_string(),
                snippet: "snippet".to_string(),
            }],
        }
    }

    #[test]
    fn test_optimizer_strips_conversational_filler() {
        assert_eq!(optimize_search_query("How do I reset the pump?"), "reset pump");
    }

    #[test]
    fn test_optimizer_tags_product_codes() {
        assert_eq!(
            optimize_search_query("My UR10e is broken"),
            "ur10e broken model"
        );
    }

    #[test]
    fn test_optimizer_tags_error_codes() {
        // "E42" is not a product code (one leading letter), so the
        // error-code pattern is the first to match.
        assert_eq!(
            optimize_search_query("see error code E42"),
            "see error code e42 error code"
        );
    }

    #[test]
    fn test_optimizer_appends_one_tag_at_most() {
        let optimized = optimize_search_query("troubleshoot error code E42 on the UR10e");

        assert!(optimized.ends_with("model"));
        assert!(!optimized.contains("error code e42 error code"));
    }

    #[test]
    fn test_optimizer_falls_back_to_original_message() {
        assert_eq!(optimize_search_query("How do I?"), "How do I?");
    }

    #[test]
    fn test_parse_keeps_top_three_organic_results() {
        let raw = WebSearchResponse {
            organic: vec![
                organic("One", "https://a.example", "first"),
                organic("Two", "https://b.example", "second"),
                organic("Three", "https://c.example", "third"),
                organic("Four", "https://d.example", "fourth"),
            ],
            ..Default::default()
        };

        let findings = parse_web_results(&raw);

        assert_eq!(findings.links.len(), 3);
        assert!(findings.text.contains("**One**"));
        assert!(!findings.text.contains("fourth"));
    }

    #[test]
    fn test_parse_skips_results_missing_title_or_link() {
        let raw = WebSearchResponse {
            organic: vec![
                organic("Titled", "https://a.example", "kept"),
                organic("", "https://b.example", "no title"),
                organic("No link", "", "dropped"),
            ],
            ..Default::default()
        };

        let findings = parse_web_results(&raw);

        assert_eq!(findings.links.len(), 1);
        assert_eq!(findings.links[0].title, "Titled");
    }

    #[test]
    fn test_parse_clips_link_snippets_but_not_prompt_text() {
        let long_snippet = "s".repeat(250);
        let raw = WebSearchResponse {
            organic: vec![organic("Long", "https://a.example", &long_snippet)],
            ..Default::default()
        };

        let findings = parse_web_results(&raw);

        assert_eq!(findings.links[0].snippet.chars().count(), 203);
        assert!(findings.links[0].snippet.ends_with("..."));
        assert!(findings.text.contains(&long_snippet));
    }

    #[test]
    fn test_parse_promotes_answer_box_and_knowledge_graph() {
        let raw = WebSearchResponse {
            organic: vec![organic("Organic", "https://a.example", "snippet")],
            answer_box: Some(AnswerBox {
                answer: Some("42 PSI".to_string()),
                link: Some("https://answers.example".to_string()),
                ..Default::default()
            }),
            knowledge_graph: Some(KnowledgeGraph {
                title: Some("Pump Co".to_string()),
                description: Some("Maker of pumps".to_string()),
                website: Some("https://pumpco.example".to_string()),
            }),
        };

        let findings = parse_web_results(&raw);

        // Knowledge graph is promoted last, so it ends up first.
        assert_eq!(findings.links[0].title, "Pump Co");
        assert_eq!(findings.links[1].title, "Answer Source");
        assert_eq!(findings.links[2].title, "Organic");
        assert!(findings.text.starts_with("**Pump Co**"));
        assert!(findings.text.contains("**Quick Answer:** 42 PSI"));
    }

    #[test]
    fn test_gate_rejects_when_no_links_exist() {
        let gate = RelevanceGate::default();
        let findings = WebFindings::default();

        assert!(!gate.should_include_links("where to buy a pump", "context", &findings));
    }

    #[test]
    fn test_gate_honors_explicit_web_intent() {
        let gate = RelevanceGate::default();
        let long_kb = "k".repeat(500);

        assert!(gate.should_include_links(
            "where to buy a replacement seal",
            &long_kb,
            &findings_with_links("unrelated")
        ));
    }

    #[test]
    fn test_gate_shows_links_when_kb_context_is_thin() {
        let gate = RelevanceGate::default();

        assert!(gate.should_include_links(
            "pump diagnostics report",
            "short",
            &findings_with_links("unrelated")
        ));
    }

    #[test]
    fn test_gate_shows_links_for_product_query_with_modest_docs() {
        let gate = RelevanceGate::default();
        let kb = "k".repeat(200);

        assert!(gate.should_include_links(
            "tell me about UR10e servicing",
            &kb,
            &findings_with_links("unrelated")
        ));
    }

    #[test]
    fn test_gate_rejects_product_query_with_rich_docs_and_no_overlap() {
        let gate = RelevanceGate::default();
        let kb = "k".repeat(400);

        assert!(!gate.should_include_links(
            "tell me about UR10e servicing",
            &kb,
            &findings_with_links("gardening tips")
        ));
    }

    #[test]
    fn test_gate_accepts_on_strong_keyword_overlap() {
        let gate = RelevanceGate::default();
        let kb = "k".repeat(400);
        let web_text = "hydraulic manifold pressure calibration walkthrough";

        assert!(gate.should_include_links(
            "hydraulic manifold pressure calibration procedure",
            &kb,
            &findings_with_links(web_text)
        ));
    }
}
