//! AnswerForge Common Library
//!
//! Shared code for the AnswerForge services including:
//! - The retrieval-augmented answer pipeline
//! - Provider abstractions (embeddings, vector index, model, web, records)
//! - Agent, conversation, and knowledge-base services
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod agents;
pub mod auth;
pub mod config;
pub mod conversations;
pub mod errors;
pub mod knowledge;
pub mod metrics;
pub mod pipeline;
pub mod providers;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use pipeline::{AnswerOrchestrator, AnswerResult};
pub use providers::Embedder;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
