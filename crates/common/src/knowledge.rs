//! Knowledge base service
//!
//! Provides:
//! - Character-based text chunking for document ingestion
//! - Batch embedding and namespace-scoped vector upserts
//! - Semantic retrieval backing the answer pipeline
//! - Per-file deletion and index statistics

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::metrics::record_ingestion;
use crate::pipeline::{ChunkMetadata, ChunkSource, RetrievedChunk};
use crate::providers::{Embedder, IndexStats, VectorIndex, VectorRecord};

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 1000 }
    }
}

/// Split text into chunks for embedding.
///
/// Every non-empty chunk is kept; a short note or the tail of a long
/// document is still retrievable content.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let splitter = TextSplitter::new(ChunkConfig::new(config.chunk_size));

    let chunks: Vec<String> = splitter
        .chunks(text)
        .map(|chunk| chunk.trim().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect();

    debug!(
        input_len = text.len(),
        chunk_count = chunks.len(),
        chunk_size = config.chunk_size,
        "Text chunked"
    );

    chunks
}

/// Embedding-backed document store over a vector index.
///
/// All operations take an optional namespace; `None` addresses the
/// index's default namespace, used by the unscoped chat route.
pub struct KnowledgeService {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chunking: ChunkingConfig,
}

impl KnowledgeService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            chunking,
        }
    }

    /// Chunk, embed, and upsert one document. Returns the chunk count.
    pub async fn ingest_document(
        &self,
        namespace: Option<&str>,
        filename: &str,
        text: &str,
        content_type: &str,
    ) -> Result<usize> {
        let started = Instant::now();

        let chunks = chunk_text(text, &self.chunking);
        if chunks.is_empty() {
            return Err(AppError::Validation {
                message: "Document produced no usable text chunks".to_string(),
                field: Some("text".to_string()),
            });
        }

        let embeddings = self.embedder.embed_batch(&chunks).await?;
        let upload_time = Utc::now().to_rfc3339();

        let mut records = Vec::with_capacity(chunks.len());
        for (index, (chunk, values)) in chunks.into_iter().zip(embeddings).enumerate() {
            let metadata = ChunkMetadata {
                filename: filename.to_string(),
                source: Some("document".to_string()),
                upload_time: Some(upload_time.clone()),
                content_type: Some(content_type.to_string()),
                chunk_index: Some(index),
                text: chunk,
            };
            records.push(VectorRecord {
                id: Uuid::new_v4().to_string(),
                values,
                metadata: serde_json::to_value(&metadata)?,
            });
        }

        let upserted = self.index.upsert(records, namespace).await?;
        record_ingestion(started.elapsed().as_secs_f64(), upserted);

        debug!(
            filename = %filename,
            namespace = ?namespace,
            chunks = upserted,
            "Document ingested"
        );

        Ok(upserted)
    }

    /// Remove every chunk of one file. Returns how many vectors were dropped.
    pub async fn delete_document(&self, namespace: Option<&str>, filename: &str) -> Result<usize> {
        self.index
            .delete_by_filter(json!({ "filename": { "$eq": filename } }), namespace)
            .await
    }

    /// Drop an entire namespace, chunks included.
    pub async fn delete_namespace(&self, namespace: Option<&str>) -> Result<()> {
        self.index.delete_all(namespace).await
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        self.index.stats().await
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedder.dimension()
    }
}

#[async_trait]
impl ChunkSource for KnowledgeService {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        namespace: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>> {
        let embedding = self.embedder.embed(query).await?;
        let matches = self.index.query(&embedding, top_k, namespace, None).await?;

        let chunks = matches
            .into_iter()
            .enumerate()
            .map(|(i, m)| {
                let mut metadata: ChunkMetadata = match m.metadata {
                    Some(value) => serde_json::from_value(value).unwrap_or_default(),
                    None => ChunkMetadata::default(),
                };
                // Chunk text lives in metadata; pull it out so it is not
                // duplicated on the way back to callers.
                let text = std::mem::take(&mut metadata.text);
                RetrievedChunk {
                    text,
                    similarity_score: m.score,
                    metadata,
                    rank: i + 1,
                }
            })
            .collect();

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MemoryVectorIndex, MockEmbedder};

    fn service() -> KnowledgeService {
        KnowledgeService::new(
            Arc::new(MockEmbedder::new(64)),
            Arc::new(MemoryVectorIndex::new()),
            ChunkingConfig::default(),
        )
    }

    fn paragraph(sentences: usize) -> String {
        let mut text = String::new();
        for i in 0..sentences {
            text.push_str(&format!(
                "Sentence {} explains one more detail about the compressor maintenance cycle. ",
                i
            ));
        }
        text
    }

    #[test]
    fn test_chunk_text_splits_long_documents() {
        let config = ChunkingConfig::default();
        let chunks = chunk_text(&paragraph(60), &config);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= config.chunk_size);
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn test_chunk_text_keeps_short_documents() {
        let config = ChunkingConfig::default();

        let chunks = chunk_text("Fan relay part number is PON-200.", &config);
        assert_eq!(chunks, vec!["Fan relay part number is PON-200."]);

        assert!(chunk_text("   \n\n  ", &config).is_empty());
    }

    #[test]
    fn test_chunk_text_keeps_short_tail_chunks() {
        let config = ChunkingConfig::default();
        // Fourteen sentences overflow one chunk by a single sentence,
        // leaving a tail far below the chunk size.
        let text = paragraph(14);
        let chunks = chunk_text(&text, &config);

        assert!(chunks.len() > 1);
        let tail = chunks.last().unwrap();
        assert!(tail.len() < config.chunk_size / 2);
        assert!(tail.contains("Sentence 13"));
    }

    #[test]
    fn test_chunk_text_keeps_single_medium_chunk() {
        let config = ChunkingConfig::default();
        let chunks = chunk_text(&paragraph(4), &config);

        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_and_retrieve_round_trip() {
        let service = service();
        let added = service
            .ingest_document(Some("agent_hvac"), "manual.txt", &paragraph(30), "text/plain")
            .await
            .unwrap();
        assert!(added > 0);

        let chunks = service
            .retrieve("compressor maintenance", 3, Some("agent_hvac"))
            .await
            .unwrap();

        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].rank, 1);
        assert_eq!(chunks[0].metadata.filename, "manual.txt");
        assert!(!chunks[0].text.is_empty());
        // Text is extracted from metadata, not duplicated inside it
        assert!(chunks[0].metadata.text.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_accepts_short_documents() {
        let service = service();
        let added = service
            .ingest_document(
                Some("agent_hvac"),
                "note.txt",
                "Fan relay part number is PON-200.",
                "text/plain",
            )
            .await
            .unwrap();
        assert_eq!(added, 1);

        let chunks = service
            .retrieve("fan relay part number", 3, Some("agent_hvac"))
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("PON-200"));
    }

    #[tokio::test]
    async fn test_ingest_rejects_empty_text() {
        let service = service();
        let result = service
            .ingest_document(Some("agent_hvac"), "empty.txt", "  ", "text/plain")
            .await;

        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let service = service();
        service
            .ingest_document(Some("agent_hvac"), "manual.txt", &paragraph(30), "text/plain")
            .await
            .unwrap();

        let other = service
            .retrieve("compressor", 5, Some("agent_boiler"))
            .await
            .unwrap();

        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_delete_document_removes_only_that_file() {
        let service = service();
        service
            .ingest_document(Some("agent_hvac"), "manual.txt", &paragraph(30), "text/plain")
            .await
            .unwrap();
        service
            .ingest_document(Some("agent_hvac"), "wiring.txt", &paragraph(30), "text/plain")
            .await
            .unwrap();

        let removed = service
            .delete_document(Some("agent_hvac"), "manual.txt")
            .await
            .unwrap();
        assert!(removed > 0);

        let remaining = service
            .retrieve("compressor", 10, Some("agent_hvac"))
            .await
            .unwrap();
        assert!(remaining.iter().all(|c| c.metadata.filename == "wiring.txt"));
    }

    #[tokio::test]
    async fn test_stats_counts_namespaces() {
        let service = service();
        service
            .ingest_document(Some("agent_hvac"), "manual.txt", &paragraph(30), "text/plain")
            .await
            .unwrap();

        let stats = service.stats().await.unwrap();

        assert!(stats.total_vector_count > 0);
        assert_eq!(
            stats.namespace_count(Some("agent_hvac")),
            stats.total_vector_count
        );
    }
}
