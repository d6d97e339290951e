//! Vector index abstraction
//!
//! Provides a unified interface for vector stores:
//! - Pinecone (REST data plane)
//! - Memory (cosine scan over process-local vectors, used in tests and
//!   keyless deployments)

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::VectorConfig;
use crate::errors::{AppError, Result};

/// Filter-based deletes resolve matching ids through a query first;
/// this caps how many ids one delete can collect.
const FILTER_QUERY_TOP_K: usize = 10_000;

/// Ids are deleted in batches of this size.
const DELETE_BATCH_SIZE: usize = 1_000;

/// A vector plus metadata, ready for upsert.
#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Value,
}

/// One query hit.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Option<Value>,
}

/// Index-wide vector counts.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    /// Vectors across all namespaces
    pub total_vector_count: usize,
    /// Vector count per namespace; the default namespace keys as ""
    pub namespaces: HashMap<String, usize>,
}

impl IndexStats {
    /// Vector count for one namespace; `None` reads the default namespace.
    pub fn namespace_count(&self, namespace: Option<&str>) -> usize {
        self.namespaces
            .get(namespace.unwrap_or(""))
            .copied()
            .unwrap_or(0)
    }
}

/// Trait for vector index access
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Query for the `top_k` nearest vectors
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
        filter: Option<Value>,
    ) -> Result<Vec<VectorMatch>>;

    /// Insert or overwrite records, returning how many were written
    async fn upsert(&self, records: Vec<VectorRecord>, namespace: Option<&str>) -> Result<usize>;

    /// Delete specific records by id
    async fn delete_ids(&self, ids: &[String], namespace: Option<&str>) -> Result<()>;

    /// Delete every record in the namespace
    async fn delete_all(&self, namespace: Option<&str>) -> Result<()>;

    /// Delete records whose metadata matches the filter, returning how
    /// many were removed
    async fn delete_by_filter(&self, filter: Value, namespace: Option<&str>) -> Result<usize>;

    /// Report vector counts
    async fn stats(&self) -> Result<IndexStats>;
}

/// Pinecone REST client
pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    host: String,
    dimension: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f32,
    metadata: Option<Value>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    ids: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delete_all: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    total_vector_count: usize,
    #[serde(default)]
    namespaces: HashMap<String, WireNamespaceStats>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireNamespaceStats {
    #[serde(default)]
    vector_count: usize,
}

impl PineconeIndex {
    /// Create a new Pinecone client against an index data-plane host.
    ///
    /// `dimension` must match the index; it sizes the probe vector used
    /// to resolve filter-based deletes.
    pub fn new(api_key: String, host: String, dimension: usize, config: &VectorConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{}", host)
        };

        Self {
            client,
            api_key,
            host,
            dimension,
        }
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp> {
        let url = format!("{}{}", self.host, path);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::VectorIndex {
                message: format!("Request to {} failed: {}", path, e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::VectorIndex {
                message: format!("API error {} on {}: {}", status, path, body),
            });
        }

        response.json().await.map_err(|e| AppError::VectorIndex {
            message: format!("Failed to parse {} response: {}", path, e),
        })
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
        filter: Option<Value>,
    ) -> Result<Vec<VectorMatch>> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            namespace,
            filter,
        };
        let response: QueryResponse = self.post("/query", &request).await?;

        Ok(response
            .matches
            .into_iter()
            .map(|m| VectorMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }

    async fn upsert(&self, records: Vec<VectorRecord>, namespace: Option<&str>) -> Result<usize> {
        let request = UpsertRequest {
            vectors: &records,
            namespace,
        };
        let response: UpsertResponse = self.post("/vectors/upsert", &request).await?;
        Ok(response.upserted_count)
    }

    async fn delete_ids(&self, ids: &[String], namespace: Option<&str>) -> Result<()> {
        for batch in ids.chunks(DELETE_BATCH_SIZE) {
            let request = DeleteRequest {
                ids: Some(batch),
                delete_all: None,
                namespace,
            };
            let _: Value = self.post("/vectors/delete", &request).await?;
        }
        Ok(())
    }

    async fn delete_all(&self, namespace: Option<&str>) -> Result<()> {
        let request = DeleteRequest {
            ids: None,
            delete_all: Some(true),
            namespace,
        };
        let _: Value = self.post("/vectors/delete", &request).await?;
        Ok(())
    }

    async fn delete_by_filter(&self, filter: Value, namespace: Option<&str>) -> Result<usize> {
        // The serverless data plane rejects metadata filters on delete,
        // so matching ids are resolved through a probe query first.
        let probe = vec![0.0_f32; self.dimension];
        let matches = self
            .query(&probe, FILTER_QUERY_TOP_K, namespace, Some(filter))
            .await?;
        if matches.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = matches.into_iter().map(|m| m.id).collect();
        self.delete_ids(&ids, namespace).await?;
        Ok(ids.len())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let response: StatsResponse = self
            .post("/describe_index_stats", &serde_json::json!({}))
            .await?;

        Ok(IndexStats {
            total_vector_count: response.total_vector_count,
            namespaces: response
                .namespaces
                .into_iter()
                .map(|(name, stats)| (name, stats.vector_count))
                .collect(),
        })
    }
}

/// In-memory index for testing and keyless deployments
#[derive(Default)]
pub struct MemoryVectorIndex {
    namespaces: RwLock<HashMap<String, Vec<VectorRecord>>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Vec<VectorRecord>>> {
        self.namespaces
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<VectorRecord>>> {
        self.namespaces
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn namespace_key(namespace: Option<&str>) -> String {
    namespace.unwrap_or("").to_string()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Matches Pinecone's equality filters: `{"field": value}` and
/// `{"field": {"$eq": value}}`.
fn matches_filter(metadata: &Value, filter: &Value) -> bool {
    let conditions = match filter.as_object() {
        Some(conditions) => conditions,
        None => return true,
    };

    conditions.iter().all(|(field, expected)| {
        let actual = metadata.get(field);
        match expected.as_object().and_then(|obj| obj.get("$eq")) {
            Some(eq_value) => actual == Some(eq_value),
            None => actual == Some(expected),
        }
    })
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
        filter: Option<Value>,
    ) -> Result<Vec<VectorMatch>> {
        let store = self.read();
        let mut matches: Vec<VectorMatch> = store
            .get(&namespace_key(namespace))
            .map(|records| {
                records
                    .iter()
                    .filter(|record| match &filter {
                        Some(filter) => matches_filter(&record.metadata, filter),
                        None => true,
                    })
                    .map(|record| VectorMatch {
                        id: record.id.clone(),
                        score: cosine_similarity(vector, &record.values),
                        metadata: Some(record.metadata.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn upsert(&self, records: Vec<VectorRecord>, namespace: Option<&str>) -> Result<usize> {
        let count = records.len();
        let mut store = self.write();
        let entries = store.entry(namespace_key(namespace)).or_default();

        for record in records {
            match entries.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record,
                None => entries.push(record),
            }
        }
        Ok(count)
    }

    async fn delete_ids(&self, ids: &[String], namespace: Option<&str>) -> Result<()> {
        let mut store = self.write();
        if let Some(entries) = store.get_mut(&namespace_key(namespace)) {
            entries.retain(|record| !ids.contains(&record.id));
        }
        Ok(())
    }

    async fn delete_all(&self, namespace: Option<&str>) -> Result<()> {
        self.write().remove(&namespace_key(namespace));
        Ok(())
    }

    async fn delete_by_filter(&self, filter: Value, namespace: Option<&str>) -> Result<usize> {
        let mut store = self.write();
        match store.get_mut(&namespace_key(namespace)) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|record| !matches_filter(&record.metadata, &filter));
                Ok(before - entries.len())
            }
            None => Ok(0),
        }
    }

    async fn stats(&self) -> Result<IndexStats> {
        let store = self.read();
        Ok(IndexStats {
            total_vector_count: store.values().map(Vec::len).sum(),
            namespaces: store
                .iter()
                .map(|(name, records)| (name.clone(), records.len()))
                .collect(),
        })
    }
}

/// Create a vector index based on configuration.
///
/// `dimension` is the embedding dimension the index was created with.
/// Missing credentials fall back to the in-memory index so the service
/// can still boot; vectors then live only for the process lifetime.
pub fn create_vector_index(config: &VectorConfig, dimension: usize) -> Arc<dyn VectorIndex> {
    match (config.api_key.clone(), config.index_host.clone()) {
        (Some(key), Some(host)) => Arc::new(PineconeIndex::new(key, host, dimension, config)),
        _ => {
            tracing::warn!("No vector index credentials configured, using in-memory index");
            Arc::new(MemoryVectorIndex::new())
        }
    }
}
