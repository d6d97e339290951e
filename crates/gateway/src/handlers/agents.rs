//! Agent management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use answerforge_common::{
    agents::{AgentStats, IngestionReport},
    auth::AuthContext,
    errors::{AppError, Result},
    providers::AgentRecord,
};

/// Request to register a new agent
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAgentRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Extra prompt instructions applied to this agent's chats
    #[serde(default)]
    pub extra_instructions: Option<String>,
}

/// Request to ingest one text document
#[derive(Debug, Deserialize, Validate)]
pub struct IngestDocumentRequest {
    #[validate(length(min = 1, max = 255))]
    pub filename: String,

    #[validate(length(min = 1))]
    pub text: String,

    /// MIME type recorded in chunk metadata
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Serialize)]
pub struct IngestDocumentResponse {
    pub success: bool,
    pub message: String,
    pub chunks_added: usize,
    pub total_chunks: usize,
}

#[derive(Serialize)]
pub struct DeleteDocumentResponse {
    pub message: String,
    pub chunks_removed: usize,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct ResetAgentResponse {
    pub message: String,
    pub namespace: String,
}

/// Register a new agent
pub async fn create_agent(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateAgentRequest>,
) -> Result<(StatusCode, Json<AgentRecord>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let agent = state
        .agents
        .create_agent(
            &request.name,
            request.description,
            request.extra_instructions,
            auth.user_id.clone(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(agent)))
}

/// List all agents
pub async fn list_agents(State(state): State<AppState>) -> Result<Json<Vec<AgentRecord>>> {
    Ok(Json(state.agents.list_agents().await?))
}

/// Get one agent by name
pub async fn get_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<AgentRecord>> {
    Ok(Json(state.agents.get_agent(&name).await?))
}

/// Delete an agent and its knowledge base
pub async fn delete_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.agents.delete_agent(&name).await?;

    Ok(Json(MessageResponse {
        message: format!("Agent '{}' deleted successfully", name),
    }))
}

/// Wipe an agent's knowledge base, keeping the agent itself
pub async fn reset_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ResetAgentResponse>> {
    let agent = state.agents.reset_agent(&name).await?;

    Ok(Json(ResetAgentResponse {
        message: format!("Knowledge base for agent '{}' reset successfully", name),
        namespace: agent.namespace,
    }))
}

/// Knowledge-base stats for one agent
pub async fn agent_stats(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<AgentStats>> {
    Ok(Json(state.agents.agent_stats(&name).await?))
}

/// Ingest a text document into an agent's knowledge base
pub async fn ingest_document(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<IngestDocumentRequest>,
) -> Result<Json<IngestDocumentResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let content_type = request.content_type.as_deref().unwrap_or("text/plain");

    let report: IngestionReport = state
        .agents
        .ingest_document(&name, &request.filename, &request.text, content_type)
        .await?;

    tracing::info!(
        agent = %name,
        filename = %request.filename,
        chunks_added = report.chunks_added,
        "Document ingested"
    );

    Ok(Json(IngestDocumentResponse {
        success: true,
        message: format!(
            "Successfully processed text content. Added {} chunks to {}'s knowledge base.",
            report.chunks_added, name
        ),
        chunks_added: report.chunks_added,
        total_chunks: report.total_chunks,
    }))
}

/// Remove one document from an agent's knowledge base
pub async fn delete_document(
    State(state): State<AppState>,
    Path((name, filename)): Path<(String, String)>,
) -> Result<Json<DeleteDocumentResponse>> {
    let removed = state.agents.delete_document(&name, &filename).await?;

    tracing::info!(
        agent = %name,
        filename = %filename,
        chunks_removed = removed,
        "Document deleted"
    );

    Ok(Json(DeleteDocumentResponse {
        message: format!("Deleted '{}' from {}'s knowledge base", filename, name),
        chunks_removed: removed,
    }))
}
