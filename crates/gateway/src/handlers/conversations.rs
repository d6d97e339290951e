//! Conversation management handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;
use answerforge_common::{
    conversations::ConversationDetail,
    errors::Result,
    providers::ConversationRecord,
};

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// List an agent's conversations, most recently active first
pub async fn list_conversations(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<ConversationRecord>>> {
    // 404 for unknown agents, not an empty list
    let agent = state.agents.get_agent(&name).await?;

    Ok(Json(state.conversations.list_for_agent(&agent.name).await?))
}

/// Get one conversation with its messages
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationDetail>> {
    Ok(Json(state.conversations.conversation_detail(id).await?))
}

/// Delete a conversation and its messages
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    state.conversations.delete_conversation(id).await?;

    Ok(Json(MessageResponse {
        message: format!("Conversation '{}' deleted successfully", id),
    }))
}
