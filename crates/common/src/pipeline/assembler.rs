//! Context assembly - merges chunk text and web findings for the prompt
//!
//! Provides:
//! - A labeled documentation section built from the top chunks
//! - An optional web results section appended after it
//! - An empty string only when both inputs are empty

use serde::{Deserialize, Serialize};

use crate::pipeline::websearch::WebFindings;
use crate::pipeline::RetrievedChunk;

/// Configuration for context assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextAssemblerConfig {
    /// Number of top chunks included in the documentation section
    pub max_chunks: usize,
}

impl Default for ContextAssemblerConfig {
    fn default() -> Self {
        Self { max_chunks: 3 }
    }
}

/// Builds the context block handed to the language model.
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    config: ContextAssemblerConfig,
}

impl ContextAssembler {
    pub fn new(config: ContextAssemblerConfig) -> Self {
        Self { config }
    }

    /// Assembles the context string from chunks and optional web
    /// findings. Sections are separated by a blank line; the result is
    /// empty only when there is nothing to show from either source.
    pub fn build(&self, chunks: &[RetrievedChunk], web: Option<&WebFindings>) -> String {
        let mut parts: Vec<String> = Vec::new();

        if !chunks.is_empty() {
            let mut doc_section = String::from("Technical Documentation:\n");
            for (i, chunk) in chunks.iter().take(self.config.max_chunks).enumerate() {
                let filename = if chunk.metadata.filename.is_empty() {
                    "Unknown"
                } else {
                    chunk.metadata.filename.as_str()
                };
                doc_section.push_str(&format!(
                    "\n[Source {}: {}]\n{}\n",
                    i + 1,
                    filename,
                    chunk.text.trim()
                ));
            }
            parts.push(doc_section);
        }

        if let Some(findings) = web {
            if !findings.text.is_empty() {
                parts.push(format!("Web Search Results:\n{}", findings.text));
            }
        }

        parts.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ChunkMetadata;

    fn chunk(filename: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            similarity_score: 0.9,
            metadata: ChunkMetadata {
                filename: filename.to_string(),
                ..Default::default()
            },
            rank: 1,
        }
    }

    #[test]
    fn test_empty_inputs_produce_empty_context() {
        let assembler = ContextAssembler::default();

        assert_eq!(assembler.build(&[], None), "");
        assert_eq!(assembler.build(&[], Some(&WebFindings::default())), "");
    }

    #[test]
    fn test_chunks_are_labeled_and_numbered() {
        let assembler = ContextAssembler::default();
        let chunks = vec![
            chunk("pump.pdf", "  Press the red button.  "),
            chunk("valve.pdf", "Turn the valve left."),
        ];

        let context = assembler.build(&chunks, None);

        assert!(context.starts_with("Technical Documentation:\n"));
        assert!(context.contains("[Source 1: pump.pdf]\nPress the red button."));
        assert!(context.contains("[Source 2: valve.pdf]\nTurn the valve left."));
    }

    #[test]
    fn test_chunk_count_is_capped() {
        let assembler = ContextAssembler::default();
        let chunks: Vec<_> = (1..=5)
            .map(|i| chunk(&format!("doc{i}.pdf"), &format!("text {i}")))
            .collect();

        let context = assembler.build(&chunks, None);

        assert!(context.contains("[Source 3: doc3.pdf]"));
        assert!(!context.contains("doc4.pdf"));
    }

    #[test]
    fn test_missing_filename_shows_unknown() {
        let assembler = ContextAssembler::default();
        let context = assembler.build(&[chunk("", "orphan text")], None);

        assert!(context.contains("[Source 1: Unknown]"));
    }

    #[test]
    fn test_web_results_follow_documentation() {
        let assembler = ContextAssembler::default();
        let findings = WebFindings {
            text: "**Hit**\nsnippet\nSource: https://a.example\n".to_string(),
            links: Vec::new(),
        };

        let context = assembler.build(&[chunk("pump.pdf", "docs")], Some(&findings));
        let doc_pos = context.find("Technical Documentation:").unwrap();
        let web_pos = context.find("Web Search Results:").unwrap();

        assert!(doc_pos < web_pos);
    }

    #[test]
    fn test_web_results_alone_still_build_context() {
        let assembler = ContextAssembler::default();
        let findings = WebFindings {
            text: "**Hit**\nsnippet".to_string(),
            links: Vec::new(),
        };

        let context = assembler.build(&[], Some(&findings));

        assert_eq!(context, "Web Search Results:\n**Hit**\nsnippet");
    }
}
