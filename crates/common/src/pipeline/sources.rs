//! Source attribution - builds the citation list returned with answers
//!
//! Provides:
//! - Deduplicated document citations from the top retrieved chunks
//! - Web link citations appended after document citations

use std::collections::HashSet;

use crate::pipeline::{RetrievedChunk, Source, SourceType, WebResult};

const MAX_DOCUMENT_SOURCES: usize = 3;
const MAX_WEB_SOURCES: usize = 3;

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

/// Extracts the citation list for an answer.
///
/// Each document contributes one citation carrying its best-ranked
/// chunk's similarity. Chunks without a usable filename are skipped
/// entirely. Gated web links follow the document citations with a zero
/// similarity score.
pub fn extract_sources(chunks: &[RetrievedChunk], web_links: &[WebResult]) -> Vec<Source> {
    let mut sources = Vec::new();
    let mut seen_files: HashSet<&str> = HashSet::new();

    for chunk in chunks.iter().take(MAX_DOCUMENT_SOURCES) {
        let filename = chunk.metadata.filename.as_str();
        if filename.is_empty() || filename == "Unknown" || seen_files.contains(filename) {
            continue;
        }
        seen_files.insert(filename);

        sources.push(Source {
            filename: filename.to_string(),
            similarity_score: round3(chunk.similarity_score),
            source_type: SourceType::Document,
            url: None,
            snippet: None,
            upload_time: Some(
                chunk
                    .metadata
                    .upload_time
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            ),
        });
    }

    for link in web_links.iter().take(MAX_WEB_SOURCES) {
        let title = if link.title.is_empty() {
            "Web Result"
        } else {
            link.title.as_str()
        };

        sources.push(Source {
            filename: title.to_string(),
            similarity_score: 0.0,
            source_type: SourceType::WebLink,
            url: Some(link.url.clone()),
            snippet: Some(link.snippet.clone()),
            upload_time: None,
        });
    }

    sources
}
