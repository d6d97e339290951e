//! Web search abstraction
//!
//! Provides a unified interface for web search providers:
//! - Serper (Google results over REST)
//! - Static (canned responses, used in tests and keyless deployments)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::WebSearchConfig;
use crate::errors::{AppError, Result};

/// Raw search response as returned by the provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSearchResponse {
    /// Ranked organic hits
    #[serde(default)]
    pub organic: Vec<OrganicResult>,
    /// Direct answer extracted by the provider, when available
    pub answer_box: Option<AnswerBox>,
    /// Entity card for well-known subjects, when available
    pub knowledge_graph: Option<KnowledgeGraph>,
}

/// One organic search hit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganicResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// Provider-extracted direct answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnswerBox {
    pub title: Option<String>,
    pub answer: Option<String>,
    pub snippet: Option<String>,
    pub link: Option<String>,
}

/// Entity card for a recognized subject.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeGraph {
    pub title: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
}

/// Trait for web search
#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Run one search and return the provider's structured response
    async fn search(&self, query: &str) -> Result<WebSearchResponse>;
}

/// Serper.dev search client
pub struct SerperSearcher {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    max_results: usize,
}

#[derive(Serialize)]
struct SerperRequest {
    q: String,
    num: usize,
}

impl SerperSearcher {
    /// Create a new Serper client
    pub fn new(api_key: String, config: &WebSearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            endpoint: config.endpoint.clone(),
            max_results: config.max_results,
        }
    }
}

#[async_trait]
impl WebSearcher for SerperSearcher {
    async fn search(&self, query: &str) -> Result<WebSearchResponse> {
        let request = SerperRequest {
            q: query.to_string(),
            num: self.max_results,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::WebSearch {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::WebSearch {
                message: format!("API error {}: {}", status, body),
            });
        }

        response.json().await.map_err(|e| AppError::WebSearch {
            message: format!("Failed to parse response: {}", e),
        })
    }
}

/// Static searcher for testing and keyless deployments
#[derive(Default)]
pub struct StaticWebSearcher {
    response: WebSearchResponse,
}

impl StaticWebSearcher {
    pub fn new(response: WebSearchResponse) -> Self {
        Self { response }
    }
}

#[async_trait]
impl WebSearcher for StaticWebSearcher {
    async fn search(&self, _query: &str) -> Result<WebSearchResponse> {
        Ok(self.response.clone())
    }
}

/// Create a web searcher based on configuration.
///
/// Without an API key web escalation is disabled entirely rather than
/// mocked, so answers never cite fabricated links.
pub fn create_web_searcher(config: &WebSearchConfig) -> Option<Arc<dyn WebSearcher>> {
    match config.api_key.clone() {
        Some(key) => Some(Arc::new(SerperSearcher::new(key, config))),
        None => {
            tracing::info!("No web search API key configured, web escalation disabled");
            None
        }
    }
}
