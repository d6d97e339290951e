//! Service status and cache administration handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;
use answerforge_common::{errors::Result, providers::IndexStats, VERSION};

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: &'static str,
    pub knowledge_base: KnowledgeBaseStatus,
    pub services: ServiceAvailability,
    pub cache: CacheStatus,
}

#[derive(Serialize)]
pub struct KnowledgeBaseStatus {
    pub total_chunks: usize,
    pub namespaces: usize,
}

#[derive(Serialize)]
pub struct ServiceAvailability {
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub web_search: bool,
    pub model: bool,
}

#[derive(Serialize)]
pub struct CacheStatus {
    pub entries: usize,
    pub capacity: usize,
}

#[derive(Serialize)]
pub struct ClearCacheResponse {
    pub message: String,
    pub entries_dropped: usize,
}

/// Report capability availability and knowledge-base totals
pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    // An unreachable index degrades the report instead of failing it
    let (status, index_stats) = match state.knowledge.stats().await {
        Ok(stats) => ("running".to_string(), stats),
        Err(e) => {
            tracing::warn!(error = %e, "Status check could not reach the vector index");
            ("degraded".to_string(), IndexStats::default())
        }
    };

    Ok(Json(StatusResponse {
        status,
        version: VERSION,
        knowledge_base: KnowledgeBaseStatus {
            total_chunks: index_stats.total_vector_count,
            namespaces: index_stats.namespaces.len(),
        },
        services: ServiceAvailability {
            embedding_model: state.knowledge.embedding_model().to_string(),
            embedding_dimension: state.knowledge.embedding_dimension(),
            web_search: state.web_search_enabled,
            model: state.model_enabled,
        },
        cache: CacheStatus {
            entries: state.cache.len(),
            capacity: state.cache.capacity(),
        },
    }))
}

/// Empty the retrieval cache
pub async fn clear_cache(State(state): State<AppState>) -> Result<Json<ClearCacheResponse>> {
    let dropped = state.cache.clear();

    tracing::info!(entries_dropped = dropped, "Retrieval cache cleared");

    Ok(Json(ClearCacheResponse {
        message: "Retrieval cache cleared".to_string(),
        entries_dropped: dropped,
    }))
}
