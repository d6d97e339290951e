//! Chat handlers
//!
//! Both routes persist the exchange: the user message is stored before
//! the pipeline runs, the bot message after, so a crashed request still
//! leaves the question in the conversation.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use answerforge_common::{
    agents::AgentService,
    auth::AuthContext,
    errors::{AppError, Result},
    pipeline::{AgentScope, Sender, Source},
};

/// Chat request
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 4000))]
    pub message: String,

    /// Continue an existing conversation
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
}

/// Chat response
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<Source>,
    pub chunks_found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
}

/// Chat against the shared knowledge base via the default agent
pub async fn chat(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    validate_chat_request(&request)?;

    let agent = state.agents.ensure_default_agent().await?;

    // The default agent searches the index's default namespace, not an
    // agent-scoped one, so no scope is passed.
    let response = run_chat(&state, &auth, &agent.name, None, &request).await?;
    Ok(Json(response))
}

/// Chat against one agent's knowledge base
pub async fn agent_chat(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(name): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    validate_chat_request(&request)?;

    let agent = state.agents.get_agent(&name).await?;
    let scope = AgentService::scope_for(&agent);

    let response = run_chat(&state, &auth, &agent.name, Some(&scope), &request).await?;
    Ok(Json(response))
}

fn validate_chat_request(request: &ChatRequest) -> Result<()> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    if request.message.trim().is_empty() {
        return Err(AppError::Validation {
            message: "Message cannot be empty".to_string(),
            field: Some("message".to_string()),
        });
    }

    Ok(())
}

async fn run_chat(
    state: &AppState,
    auth: &AuthContext,
    agent_name: &str,
    scope: Option<&AgentScope>,
    request: &ChatRequest,
) -> Result<ChatResponse> {
    // Continue the given conversation or open a new one titled after
    // the opening message.
    let conversation = match request.conversation_id {
        Some(id) => state.conversations.get_conversation(id).await?,
        None => {
            state
                .conversations
                .create_conversation(agent_name, auth.user_id.clone(), &request.message)
                .await?
        }
    };

    state
        .conversations
        .add_message(conversation.id, Sender::User, &request.message, None, None)
        .await?;

    let result = state
        .orchestrator
        .respond(&request.message, Some(conversation.id), scope, None)
        .await;

    state
        .conversations
        .add_message(
            conversation.id,
            Sender::Bot,
            &result.response,
            Some(result.sources.clone()),
            Some(result.chunks_found),
        )
        .await?;

    tracing::info!(
        agent = %agent_name,
        conversation_id = %conversation.id,
        chunks_found = result.chunks_found,
        sources = result.sources.len(),
        request_id = %auth.request_id,
        "Chat completed"
    );

    Ok(ChatResponse {
        response: result.response,
        sources: result.sources,
        chunks_found: result.chunks_found,
        conversation_id: Some(conversation.id),
    })
}
