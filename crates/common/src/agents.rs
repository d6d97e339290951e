//! Agent registry service
//!
//! Provides:
//! - Agent creation with derived vector namespaces
//! - Lookup, listing, and deletion with namespace cleanup
//! - Document ingestion bookkeeping (files, chunk counts)
//! - Live stats reconciled against the vector index

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::knowledge::KnowledgeService;
use crate::pipeline::{AgentScope, RetrievalCache};
use crate::providers::{AgentRecord, RecordStore};

/// Agent used by the unscoped chat route.
pub const DEFAULT_AGENT_NAME: &str = "General";

/// Derive the vector namespace for an agent.
///
/// The slug is the lowercased name with spaces replaced by
/// underscores; user-owned agents are additionally prefixed with the
/// owner id so two users can hold the same agent name.
pub fn derive_namespace(name: &str, user_id: Option<&str>) -> String {
    let slug = name.to_lowercase().replace(' ', "_");
    match user_id {
        Some(user_id) => format!("user_{}_agent_{}", user_id, slug),
        None => format!("agent_{}", slug),
    }
}

/// Snapshot of one agent's knowledge base.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStats {
    pub agent_name: String,
    pub total_chunks: usize,
    pub total_files: usize,
    pub files: Vec<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_instructions: Option<String>,
}

/// Outcome of one document ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    /// Chunks created from this document
    pub chunks_added: usize,
    /// Agent's chunk count after the ingestion
    pub total_chunks: usize,
}

/// Manages agents and their isolated knowledge-base scopes.
pub struct AgentService {
    store: Arc<dyn RecordStore>,
    knowledge: Arc<KnowledgeService>,
    cache: Arc<RetrievalCache>,
}

impl AgentService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        knowledge: Arc<KnowledgeService>,
        cache: Arc<RetrievalCache>,
    ) -> Self {
        Self {
            store,
            knowledge,
            cache,
        }
    }

    /// Register a new agent. Names must be unique.
    pub async fn create_agent(
        &self,
        name: &str,
        description: Option<String>,
        extra_instructions: Option<String>,
        user_id: Option<String>,
    ) -> Result<AgentRecord> {
        if self.store.find_agent(name).await?.is_some() {
            return Err(AppError::DuplicateAgent {
                name: name.to_string(),
            });
        }

        let now = Utc::now();
        let agent = AgentRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description,
            extra_instructions,
            namespace: derive_namespace(name, user_id.as_deref()),
            user_id,
            files: Vec::new(),
            total_files: 0,
            total_chunks: 0,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_agent(&agent).await?;
        info!(agent = %agent.name, namespace = %agent.namespace, "Agent created");
        Ok(agent)
    }

    pub async fn get_agent(&self, name: &str) -> Result<AgentRecord> {
        match self.store.find_agent(name).await? {
            Some(agent) => Ok(agent),
            None => Err(AppError::AgentNotFound {
                name: name.to_string(),
            }),
        }
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        self.store.list_agents().await
    }

    /// Delete an agent, its vectors, its cached lookups, and its
    /// conversations.
    pub async fn delete_agent(&self, name: &str) -> Result<()> {
        let agent = self.get_agent(name).await?;

        // A failed namespace wipe still lets the record go; orphaned
        // vectors are unreachable once the agent is gone.
        if let Err(e) = self.knowledge.delete_namespace(Some(&agent.namespace)).await {
            warn!(agent = %name, error = %e, "Failed to wipe agent namespace");
        }
        self.cache.invalidate_scope(&agent.namespace);

        for conversation in self.store.list_conversations_for_agent(name).await? {
            self.store.delete_conversation(conversation.id).await?;
        }

        self.store.delete_agent(name).await?;
        info!(agent = %name, "Agent deleted");
        Ok(())
    }

    /// Wipe an agent's knowledge base and zero its bookkeeping.
    ///
    /// The agent and its conversations survive; only the vectors and
    /// file counters are cleared.
    pub async fn reset_agent(&self, name: &str) -> Result<AgentRecord> {
        let mut agent = self.get_agent(name).await?;

        // Counters are zeroed even when the wipe fails; stats
        // reconcile against the live index on the next read.
        if let Err(e) = self.knowledge.delete_namespace(Some(&agent.namespace)).await {
            warn!(agent = %name, error = %e, "Failed to wipe agent namespace");
        }
        self.cache.invalidate_scope(&agent.namespace);

        agent.files.clear();
        agent.total_files = 0;
        agent.total_chunks = 0;
        agent.updated_at = Utc::now();
        self.store.update_agent(&agent).await?;

        info!(agent = %name, namespace = %agent.namespace, "Agent knowledge base reset");
        Ok(agent)
    }

    /// Ingest one document into the agent's namespace and update its
    /// bookkeeping.
    pub async fn ingest_document(
        &self,
        name: &str,
        filename: &str,
        text: &str,
        content_type: &str,
    ) -> Result<IngestionReport> {
        let mut agent = self.get_agent(name).await?;

        let added = self
            .knowledge
            .ingest_document(Some(&agent.namespace), filename, text, content_type)
            .await?;

        agent.total_chunks += added;
        if !agent.files.iter().any(|f| f == filename) {
            agent.files.push(filename.to_string());
        }
        agent.total_files = agent.files.len();
        agent.updated_at = Utc::now();
        self.store.update_agent(&agent).await?;

        self.cache.invalidate_scope(&agent.namespace);

        Ok(IngestionReport {
            chunks_added: added,
            total_chunks: agent.total_chunks,
        })
    }

    /// Remove one file's chunks from the agent's namespace.
    pub async fn delete_document(&self, name: &str, filename: &str) -> Result<usize> {
        let mut agent = self.get_agent(name).await?;

        let removed = self
            .knowledge
            .delete_document(Some(&agent.namespace), filename)
            .await?;
        if removed == 0 {
            return Err(AppError::DocumentNotFound {
                filename: filename.to_string(),
            });
        }

        agent.files.retain(|f| f != filename);
        agent.total_files = agent.files.len();
        agent.total_chunks = agent.total_chunks.saturating_sub(removed);
        agent.updated_at = Utc::now();
        self.store.update_agent(&agent).await?;

        self.cache.invalidate_scope(&agent.namespace);

        Ok(removed)
    }

    /// Stats for one agent, with the chunk count reconciled against
    /// the live vector index.
    pub async fn agent_stats(&self, name: &str) -> Result<AgentStats> {
        let mut agent = self.get_agent(name).await?;

        let index_stats = self.knowledge.stats().await?;
        let live_chunks = index_stats.namespace_count(Some(&agent.namespace));
        if live_chunks != agent.total_chunks {
            agent.total_chunks = live_chunks;
            agent.updated_at = Utc::now();
            self.store.update_agent(&agent).await?;
        }

        Ok(AgentStats {
            agent_name: agent.name,
            total_chunks: agent.total_chunks,
            total_files: agent.total_files,
            files: agent.files,
            created_at: agent.created_at,
            updated_at: agent.updated_at,
            description: agent.description,
            extra_instructions: agent.extra_instructions,
        })
    }

    /// Fetch the default agent, creating it on first use.
    pub async fn ensure_default_agent(&self) -> Result<AgentRecord> {
        match self.store.find_agent(DEFAULT_AGENT_NAME).await? {
            Some(agent) => Ok(agent),
            None => {
                let created = self
                    .create_agent(
                        DEFAULT_AGENT_NAME,
                        Some("Default agent for unscoped chat".to_string()),
                        None,
                        None,
                    )
                    .await;
                match created {
                    Ok(agent) => Ok(agent),
                    // Lost a creation race; the winner's record serves.
                    Err(AppError::DuplicateAgent { .. }) => {
                        self.get_agent(DEFAULT_AGENT_NAME).await
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Build the chat scope for an agent.
    pub fn scope_for(agent: &AgentRecord) -> AgentScope {
        AgentScope {
            name: agent.name.clone(),
            namespace: agent.namespace.clone(),
            instructions: agent.extra_instructions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::ChunkingConfig;
    use crate::pipeline::RetrievalCacheConfig;
    use crate::providers::{MemoryRecordStore, MemoryVectorIndex, MockEmbedder};

    fn service() -> AgentService {
        let knowledge = Arc::new(KnowledgeService::new(
            Arc::new(MockEmbedder::new(32)),
            Arc::new(MemoryVectorIndex::new()),
            ChunkingConfig::default(),
        ));
        AgentService::new(
            Arc::new(MemoryRecordStore::new()),
            knowledge,
            Arc::new(RetrievalCache::new(RetrievalCacheConfig::default())),
        )
    }

    fn manual_text() -> String {
        let mut text = String::new();
        for i in 0..30 {
            text.push_str(&format!(
                "Step {} of the startup procedure covers valve checks and purge timing. ",
                i
            ));
        }
        text
    }

    #[test]
    fn test_namespace_derivation() {
        assert_eq!(derive_namespace("HVAC Systems", None), "agent_hvac_systems");
        assert_eq!(
            derive_namespace("HVAC", Some("u42")),
            "user_u42_agent_hvac"
        );
    }

    #[tokio::test]
    async fn test_create_and_get_agent() {
        let service = service();
        let created = service
            .create_agent("Boiler Expert", None, None, None)
            .await
            .unwrap();
        assert_eq!(created.namespace, "agent_boiler_expert");

        let fetched = service.get_agent("Boiler Expert").await.unwrap();
        assert_eq!(fetched.id, created.id);
    }

    #[tokio::test]
    async fn test_duplicate_names_are_rejected() {
        let service = service();
        service.create_agent("HVAC", None, None, None).await.unwrap();

        let result = service.create_agent("HVAC", None, None, None).await;

        assert!(matches!(result, Err(AppError::DuplicateAgent { .. })));
    }

    #[tokio::test]
    async fn test_missing_agent_is_not_found() {
        let service = service();
        let result = service.get_agent("Nobody").await;

        assert!(matches!(result, Err(AppError::AgentNotFound { .. })));
    }

    #[tokio::test]
    async fn test_ingestion_updates_bookkeeping() {
        let service = service();
        service.create_agent("HVAC", None, None, None).await.unwrap();

        let report = service
            .ingest_document("HVAC", "manual.txt", &manual_text(), "text/plain")
            .await
            .unwrap();
        assert!(report.chunks_added > 0);
        assert_eq!(report.total_chunks, report.chunks_added);

        let agent = service.get_agent("HVAC").await.unwrap();
        assert_eq!(agent.files, vec!["manual.txt".to_string()]);
        assert_eq!(agent.total_files, 1);
        assert_eq!(agent.total_chunks, report.chunks_added);
    }

    #[tokio::test]
    async fn test_reingesting_same_file_keeps_one_entry() {
        let service = service();
        service.create_agent("HVAC", None, None, None).await.unwrap();
        service
            .ingest_document("HVAC", "manual.txt", &manual_text(), "text/plain")
            .await
            .unwrap();
        service
            .ingest_document("HVAC", "manual.txt", &manual_text(), "text/plain")
            .await
            .unwrap();

        let agent = service.get_agent("HVAC").await.unwrap();
        assert_eq!(agent.total_files, 1);
    }

    #[tokio::test]
    async fn test_document_deletion_updates_bookkeeping() {
        let service = service();
        service.create_agent("HVAC", None, None, None).await.unwrap();
        let report = service
            .ingest_document("HVAC", "manual.txt", &manual_text(), "text/plain")
            .await
            .unwrap();

        let removed = service.delete_document("HVAC", "manual.txt").await.unwrap();
        assert_eq!(removed, report.chunks_added);

        let agent = service.get_agent("HVAC").await.unwrap();
        assert!(agent.files.is_empty());
        assert_eq!(agent.total_chunks, 0);
    }

    #[tokio::test]
    async fn test_deleting_unknown_document_is_not_found() {
        let service = service();
        service.create_agent("HVAC", None, None, None).await.unwrap();

        let result = service.delete_document("HVAC", "ghost.txt").await;

        assert!(matches!(result, Err(AppError::DocumentNotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_agent_wipes_namespace() {
        let service = service();
        service.create_agent("HVAC", None, None, None).await.unwrap();
        service
            .ingest_document("HVAC", "manual.txt", &manual_text(), "text/plain")
            .await
            .unwrap();

        service.delete_agent("HVAC").await.unwrap();

        assert!(matches!(
            service.get_agent("HVAC").await,
            Err(AppError::AgentNotFound { .. })
        ));
        let stats = service.knowledge.stats().await.unwrap();
        assert_eq!(stats.total_vector_count, 0);
    }

    #[tokio::test]
    async fn test_reset_agent_clears_vectors_and_counters() {
        let service = service();
        service.create_agent("HVAC", None, None, None).await.unwrap();
        service
            .ingest_document("HVAC", "manual.txt", &manual_text(), "text/plain")
            .await
            .unwrap();

        let reset = service.reset_agent("HVAC").await.unwrap();

        assert!(reset.files.is_empty());
        assert_eq!(reset.total_files, 0);
        assert_eq!(reset.total_chunks, 0);
        assert_eq!(reset.namespace, "agent_hvac");

        let stats = service.knowledge.stats().await.unwrap();
        assert_eq!(stats.namespace_count(Some("agent_hvac")), 0);

        // The agent itself is still registered and can re-ingest.
        let report = service
            .ingest_document("HVAC", "manual.txt", &manual_text(), "text/plain")
            .await
            .unwrap();
        assert_eq!(report.total_chunks, report.chunks_added);
    }

    #[tokio::test]
    async fn test_reset_unknown_agent_is_not_found() {
        let service = service();
        let result = service.reset_agent("Nobody").await;

        assert!(matches!(result, Err(AppError::AgentNotFound { .. })));
    }

    #[tokio::test]
    async fn test_stats_reconcile_against_index() {
        let service = service();
        service.create_agent("HVAC", None, None, None).await.unwrap();
        service
            .ingest_document("HVAC", "manual.txt", &manual_text(), "text/plain")
            .await
            .unwrap();

        // Index mutated behind the registry's back
        service
            .knowledge
            .delete_document(Some("agent_hvac"), "manual.txt")
            .await
            .unwrap();

        let stats = service.agent_stats("HVAC").await.unwrap();

        assert_eq!(stats.total_chunks, 0);
        assert_eq!(stats.agent_name, "HVAC");
    }

    #[tokio::test]
    async fn test_default_agent_is_created_once() {
        let service = service();
        let first = service.ensure_default_agent().await.unwrap();
        let second = service.ensure_default_agent().await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.name, DEFAULT_AGENT_NAME);
    }
}
