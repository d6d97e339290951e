//! External service adapters
//!
//! Provides a trait plus HTTP implementation and a test double for
//! each upstream the pipeline depends on:
//! - Embedding generation (OpenAI-compatible)
//! - Vector index search and upserts (Pinecone-compatible)
//! - Web search (Serper)
//! - Chat completion (OpenRouter / OpenAI-compatible)
//! - Agent, conversation, and message records (PostgREST-compatible)

pub mod embedding;
pub mod llm;
pub mod records;
pub mod vector;
pub mod web;

pub use embedding::{create_embedder, Embedder, MockEmbedder, OpenAIEmbedder};
pub use llm::{create_model, CompletionModel, CompletionOutcome, MockModel, OpenRouterModel};
pub use records::{
    create_record_store, AgentRecord, ConversationRecord, MemoryRecordStore, MessageRecord,
    RecordStore, RestRecordStore,
};
pub use vector::{
    create_vector_index, IndexStats, MemoryVectorIndex, PineconeIndex, VectorIndex, VectorMatch,
    VectorRecord,
};
pub use web::{create_web_searcher, SerperSearcher, StaticWebSearcher, WebSearcher};
