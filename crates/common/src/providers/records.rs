//! Record store abstraction
//!
//! Provides a unified interface for agent, conversation, and message
//! records:
//! - Rest (PostgREST-style API, matching a Supabase backend)
//! - Memory (process-local maps, used in tests and keyless deployments)

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RecordsConfig;
use crate::errors::{AppError, Result};
use crate::pipeline::{Sender, Source};

/// A registered agent and its ingestion bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: Uuid,
    /// Unique display name
    pub name: String,
    pub description: Option<String>,
    /// Extra prompt instructions applied to this agent's chats
    pub extra_instructions: Option<String>,
    /// Owning user, when agents are user-scoped
    pub user_id: Option<String>,
    /// Vector namespace holding this agent's chunks; the stored column
    /// name predates the namespace terminology
    #[serde(rename = "collection_name")]
    pub namespace: String,
    /// Filenames ingested into this agent
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub total_files: usize,
    #[serde(default)]
    pub total_chunks: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: Uuid,
    pub agent_name: String,
    pub user_id: Option<String>,
    /// Derived from the opening message
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One stored chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Sender,
    pub text: String,
    /// Citations attached to bot messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    /// Chunk count behind a bot message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks_found: Option<usize>,
    pub created_at: DateTime<Utc>,
}

/// Trait for record persistence
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_agent(&self, agent: &AgentRecord) -> Result<()>;
    async fn find_agent(&self, name: &str) -> Result<Option<AgentRecord>>;
    async fn list_agents(&self) -> Result<Vec<AgentRecord>>;
    async fn update_agent(&self, agent: &AgentRecord) -> Result<()>;
    async fn delete_agent(&self, name: &str) -> Result<bool>;

    async fn insert_conversation(&self, conversation: &ConversationRecord) -> Result<()>;
    async fn find_conversation(&self, id: Uuid) -> Result<Option<ConversationRecord>>;
    /// Conversations for one agent, most recently active first
    async fn list_conversations_for_agent(&self, agent_name: &str)
        -> Result<Vec<ConversationRecord>>;
    /// Bump a conversation's activity timestamp
    async fn touch_conversation(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
    /// Delete a conversation and its messages; false when absent
    async fn delete_conversation(&self, id: Uuid) -> Result<bool>;

    async fn insert_message(&self, message: &MessageRecord) -> Result<()>;
    /// Messages for one conversation, oldest first
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<MessageRecord>>;
}

/// PostgREST-style store client
pub struct RestRecordStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct TouchBody {
    updated_at: DateTime<Utc>,
}

impl RestRecordStore {
    /// Create a new REST store client
    pub fn new(base_url: String, api_key: String, config: &RecordsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, table);
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    async fn check(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::RecordStore {
            message: format!("{} failed with {}: {}", context, status, body),
        })
    }

    // Filters travel as query pairs so values are percent-encoded; an
    // agent name containing `&` or `=` stays a single filter value.
    async fn get_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let response = self
            .request(reqwest::Method::GET, table)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::RecordStore {
                message: format!("GET {} failed: {}", table, e),
            })?;

        let response = Self::check(response, table).await?;
        response.json().await.map_err(|e| AppError::RecordStore {
            message: format!("Failed to parse {} response: {}", table, e),
        })
    }

    async fn insert_row<T: Serialize>(&self, table: &str, row: &T) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await
            .map_err(|e| AppError::RecordStore {
                message: format!("POST {} failed: {}", table, e),
            })?;

        Self::check(response, table).await?;
        Ok(())
    }

    async fn patch_rows<T: Serialize>(
        &self,
        table: &str,
        query: &[(&str, String)],
        body: &T,
    ) -> Result<()> {
        let response = self
            .request(reqwest::Method::PATCH, table)
            .query(query)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::RecordStore {
                message: format!("PATCH {} failed: {}", table, e),
            })?;

        Self::check(response, table).await?;
        Ok(())
    }

    /// Deletes matching rows and reports how many were removed.
    async fn delete_rows(&self, table: &str, query: &[(&str, String)]) -> Result<usize> {
        let response = self
            .request(reqwest::Method::DELETE, table)
            .query(query)
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(|e| AppError::RecordStore {
                message: format!("DELETE {} failed: {}", table, e),
            })?;

        let response = Self::check(response, table).await?;
        let rows: Vec<serde_json::Value> =
            response.json().await.map_err(|e| AppError::RecordStore {
                message: format!("Failed to parse {} response: {}", table, e),
            })?;
        Ok(rows.len())
    }
}

#[async_trait]
impl RecordStore for RestRecordStore {
    async fn insert_agent(&self, agent: &AgentRecord) -> Result<()> {
        self.insert_row("agents", agent).await
    }

    async fn find_agent(&self, name: &str) -> Result<Option<AgentRecord>> {
        let rows: Vec<AgentRecord> = self
            .get_rows("agents", &[("name", format!("eq.{}", name))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        self.get_rows("agents", &[("order", "created_at.asc".to_string())])
            .await
    }

    async fn update_agent(&self, agent: &AgentRecord) -> Result<()> {
        self.patch_rows("agents", &[("id", format!("eq.{}", agent.id))], agent)
            .await
    }

    async fn delete_agent(&self, name: &str) -> Result<bool> {
        let removed = self
            .delete_rows("agents", &[("name", format!("eq.{}", name))])
            .await?;
        Ok(removed > 0)
    }

    async fn insert_conversation(&self, conversation: &ConversationRecord) -> Result<()> {
        self.insert_row("conversations", conversation).await
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<ConversationRecord>> {
        let rows: Vec<ConversationRecord> = self
            .get_rows("conversations", &[("id", format!("eq.{}", id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_conversations_for_agent(
        &self,
        agent_name: &str,
    ) -> Result<Vec<ConversationRecord>> {
        self.get_rows(
            "conversations",
            &[
                ("agent_name", format!("eq.{}", agent_name)),
                ("order", "updated_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn touch_conversation(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.patch_rows(
            "conversations",
            &[("id", format!("eq.{}", id))],
            &TouchBody { updated_at: at },
        )
        .await
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool> {
        self.delete_rows("messages", &[("conversation_id", format!("eq.{}", id))])
            .await?;
        let removed = self
            .delete_rows("conversations", &[("id", format!("eq.{}", id))])
            .await?;
        Ok(removed > 0)
    }

    async fn insert_message(&self, message: &MessageRecord) -> Result<()> {
        self.insert_row("messages", message).await
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<MessageRecord>> {
        self.get_rows(
            "messages",
            &[
                ("conversation_id", format!("eq.{}", conversation_id)),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }
}

#[derive(Default)]
struct MemoryInner {
    agents: HashMap<String, AgentRecord>,
    conversations: HashMap<Uuid, ConversationRecord>,
    messages: HashMap<Uuid, Vec<MessageRecord>>,
}

/// In-memory store for testing and keyless deployments
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryInner> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryInner> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_agent(&self, agent: &AgentRecord) -> Result<()> {
        let mut inner = self.write();
        if inner.agents.contains_key(&agent.name) {
            return Err(AppError::Duplicate {
                message: format!("Agent '{}' already exists", agent.name),
            });
        }
        inner.agents.insert(agent.name.clone(), agent.clone());
        Ok(())
    }

    async fn find_agent(&self, name: &str) -> Result<Option<AgentRecord>> {
        Ok(self.read().agents.get(name).cloned())
    }

    async fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        let mut agents: Vec<AgentRecord> = self.read().agents.values().cloned().collect();
        agents.sort_by_key(|agent| agent.created_at);
        Ok(agents)
    }

    async fn update_agent(&self, agent: &AgentRecord) -> Result<()> {
        self.write()
            .agents
            .insert(agent.name.clone(), agent.clone());
        Ok(())
    }

    async fn delete_agent(&self, name: &str) -> Result<bool> {
        Ok(self.write().agents.remove(name).is_some())
    }

    async fn insert_conversation(&self, conversation: &ConversationRecord) -> Result<()> {
        self.write()
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<ConversationRecord>> {
        Ok(self.read().conversations.get(&id).cloned())
    }

    async fn list_conversations_for_agent(
        &self,
        agent_name: &str,
    ) -> Result<Vec<ConversationRecord>> {
        let mut conversations: Vec<ConversationRecord> = self
            .read()
            .conversations
            .values()
            .filter(|conversation| conversation.agent_name == agent_name)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn touch_conversation(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(conversation) = self.write().conversations.get_mut(&id) {
            conversation.updated_at = at;
        }
        Ok(())
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.write();
        inner.messages.remove(&id);
        Ok(inner.conversations.remove(&id).is_some())
    }

    async fn insert_message(&self, message: &MessageRecord) -> Result<()> {
        self.write()
            .messages
            .entry(message.conversation_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<MessageRecord>> {
        let mut messages = self
            .read()
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by_key(|message| message.created_at);
        Ok(messages)
    }
}

/// Create a record store based on configuration.
///
/// Without a base URL records live in process memory only; agents and
/// conversations then reset on restart.
pub fn create_record_store(config: &RecordsConfig) -> Arc<dyn RecordStore> {
    match (config.base_url.clone(), config.api_key.clone()) {
        (Some(base_url), Some(api_key)) => {
            Arc::new(RestRecordStore::new(base_url, api_key, config))
        }
        _ => {
            tracing::warn!("No record store configured, using in-memory records");
            Arc::new(MemoryRecordStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str) -> AgentRecord {
        AgentRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            extra_instructions: None,
            user_id: None,
            namespace: format!("agent_{}", name.to_lowercase()),
            files: Vec::new(),
            total_files: 0,
            total_chunks: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn conversation(agent_name: &str, title: &str) -> ConversationRecord {
        ConversationRecord {
            id: Uuid::new_v4(),
            agent_name: agent_name.to_string(),
            user_id: None,
            title: title.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn message(conversation_id: Uuid, sender: Sender, text: &str) -> MessageRecord {
        MessageRecord {
            id: Uuid::new_v4(),
            conversation_id,
            sender,
            text: text.to_string(),
            sources: None,
            chunks_found: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_agent_round_trip() {
        let store = MemoryRecordStore::new();
        store.insert_agent(&agent("HVAC")).await.unwrap();

        let found = store.find_agent("HVAC").await.unwrap().unwrap();
        assert_eq!(found.namespace, "agent_hvac");
        assert!(store.find_agent("Missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_agent_is_rejected() {
        let store = MemoryRecordStore::new();
        store.insert_agent(&agent("HVAC")).await.unwrap();

        assert!(store.insert_agent(&agent("HVAC")).await.is_err());
    }

    #[tokio::test]
    async fn test_agent_update_persists() {
        let store = MemoryRecordStore::new();
        let mut record = agent("HVAC");
        store.insert_agent(&record).await.unwrap();

        record.total_chunks = 12;
        record.files.push("manual.pdf".to_string());
        record.total_files = 1;
        store.update_agent(&record).await.unwrap();

        let found = store.find_agent("HVAC").await.unwrap().unwrap();
        assert_eq!(found.total_chunks, 12);
        assert_eq!(found.files, vec!["manual.pdf".to_string()]);
    }

    #[tokio::test]
    async fn test_conversations_list_most_recent_first() {
        let store = MemoryRecordStore::new();
        let mut first = conversation("HVAC", "first");
        let mut second = conversation("HVAC", "second");
        first.updated_at = Utc::now() - chrono::Duration::minutes(5);
        second.updated_at = Utc::now();
        store.insert_conversation(&first).await.unwrap();
        store.insert_conversation(&second).await.unwrap();
        store.insert_conversation(&conversation("Other", "elsewhere")).await.unwrap();

        let listed = store.list_conversations_for_agent("HVAC").await.unwrap();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "second");
        assert_eq!(listed[1].title, "first");
    }

    #[tokio::test]
    async fn test_touch_bumps_updated_at() {
        let store = MemoryRecordStore::new();
        let record = conversation("HVAC", "chat");
        store.insert_conversation(&record).await.unwrap();

        let later = record.updated_at + chrono::Duration::minutes(10);
        store.touch_conversation(record.id, later).await.unwrap();

        let found = store.find_conversation(record.id).await.unwrap().unwrap();
        assert_eq!(found.updated_at, later);
    }

    #[tokio::test]
    async fn test_messages_list_oldest_first() {
        let store = MemoryRecordStore::new();
        let record = conversation("HVAC", "chat");
        store.insert_conversation(&record).await.unwrap();

        let mut question = message(record.id, Sender::User, "Why is it loud?");
        let mut answer = message(record.id, Sender::Bot, "Check the fan bearing.");
        question.created_at = Utc::now() - chrono::Duration::seconds(30);
        answer.created_at = Utc::now();
        store.insert_message(&answer).await.unwrap();
        store.insert_message(&question).await.unwrap();

        let messages = store.list_messages(record.id).await.unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].sender, Sender::Bot);
    }

    #[tokio::test]
    async fn test_delete_conversation_drops_messages() {
        let store = MemoryRecordStore::new();
        let record = conversation("HVAC", "chat");
        store.insert_conversation(&record).await.unwrap();
        store
            .insert_message(&message(record.id, Sender::User, "hello"))
            .await
            .unwrap();

        assert!(store.delete_conversation(record.id).await.unwrap());
        assert!(!store.delete_conversation(record.id).await.unwrap());
        assert!(store.list_messages(record.id).await.unwrap().is_empty());
    }

    #[test]
    fn test_agent_record_serializes_storage_column_names() {
        let record = agent("HVAC");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["collection_name"], "agent_hvac");
        assert!(json.get("namespace").is_none());
    }

    #[test]
    fn test_rest_filters_keep_special_characters_in_one_value() {
        let config = RecordsConfig {
            base_url: None,
            api_key: None,
            timeout_secs: 5,
        };
        let store = RestRecordStore::new(
            "https://records.example.com".to_string(),
            "service-key".to_string(),
            &config,
        );

        let request = store
            .request(reqwest::Method::GET, "agents")
            .query(&[("name", format!("eq.{}", "A&B Maintenance"))])
            .build()
            .unwrap();

        let url = request.url();
        assert_eq!(url.path(), "/agents");
        assert!(url.query().unwrap().contains("%26"));

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![("name".to_string(), "eq.A&B Maintenance".to_string())]
        );
    }
}
