//! Conversation service
//!
//! Provides:
//! - Conversation creation with titles derived from the opening message
//! - Message persistence with sources and chunk counts
//! - History reads feeding the answer pipeline's prompt context

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::pipeline::{ConversationReader, ConversationTurn, Sender, Source};
use crate::providers::{ConversationRecord, MessageRecord, RecordStore};

/// Titles are clipped to this many characters of the first message.
const TITLE_MAX_CHARS: usize = 50;

/// Derive a conversation title from its opening message.
fn derive_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        let clipped: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", clipped)
    } else {
        trimmed.to_string()
    }
}

/// A conversation together with its ordered messages.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: ConversationRecord,
    pub messages: Vec<MessageRecord>,
}

/// Manages chat conversations and their messages.
pub struct ConversationService {
    store: Arc<dyn RecordStore>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Start a conversation titled after its first message.
    pub async fn create_conversation(
        &self,
        agent_name: &str,
        user_id: Option<String>,
        first_message: &str,
    ) -> Result<ConversationRecord> {
        let now = Utc::now();
        let conversation = ConversationRecord {
            id: Uuid::new_v4(),
            agent_name: agent_name.to_string(),
            user_id,
            title: derive_title(first_message),
            created_at: now,
            updated_at: now,
        };

        self.store.insert_conversation(&conversation).await?;
        Ok(conversation)
    }

    pub async fn get_conversation(&self, id: Uuid) -> Result<ConversationRecord> {
        match self.store.find_conversation(id).await? {
            Some(conversation) => Ok(conversation),
            None => Err(AppError::ConversationNotFound { id }),
        }
    }

    /// Append a message and bump the conversation's activity timestamp.
    pub async fn add_message(
        &self,
        conversation_id: Uuid,
        sender: Sender,
        text: &str,
        sources: Option<Vec<Source>>,
        chunks_found: Option<usize>,
    ) -> Result<MessageRecord> {
        self.get_conversation(conversation_id).await?;

        let now = Utc::now();
        let message = MessageRecord {
            id: Uuid::new_v4(),
            conversation_id,
            sender,
            text: text.to_string(),
            sources,
            chunks_found,
            created_at: now,
        };

        self.store.insert_message(&message).await?;
        self.store.touch_conversation(conversation_id, now).await?;
        Ok(message)
    }

    /// A conversation with its messages, oldest first.
    pub async fn conversation_detail(&self, id: Uuid) -> Result<ConversationDetail> {
        let conversation = self.get_conversation(id).await?;
        let messages = self.store.list_messages(id).await?;
        Ok(ConversationDetail {
            conversation,
            messages,
        })
    }

    /// Conversations for one agent, most recently active first.
    pub async fn list_for_agent(&self, agent_name: &str) -> Result<Vec<ConversationRecord>> {
        self.store.list_conversations_for_agent(agent_name).await
    }

    /// Delete a conversation and its messages.
    pub async fn delete_conversation(&self, id: Uuid) -> Result<()> {
        if self.store.delete_conversation(id).await? {
            Ok(())
        } else {
            Err(AppError::ConversationNotFound { id })
        }
    }
}

#[async_trait]
impl ConversationReader for ConversationService {
    async fn history(&self, conversation_id: Uuid) -> Result<Vec<ConversationTurn>> {
        let messages = self.store.list_messages(conversation_id).await?;
        Ok(messages
            .into_iter()
            .map(|message| ConversationTurn {
                sender: message.sender,
                text: message.text,
            })
            .collect())
    }
}
