//! Configuration management for AnswerForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Vector search configuration
    pub vector: VectorConfig,

    /// Web search configuration
    pub web_search: WebSearchConfig,

    /// Language model configuration
    pub model: ModelConfig,

    /// Record store configuration (agents, conversations)
    pub records: RecordsConfig,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for the embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorConfig {
    /// API key for the vector search service
    pub api_key: Option<String>,

    /// Data-plane host of the index, e.g. https://my-index-abc123.svc.pinecone.io
    pub index_host: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_vector_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebSearchConfig {
    /// API key for the web search provider; absent disables web escalation
    pub api_key: Option<String>,

    /// Search endpoint
    #[serde(default = "default_web_search_endpoint")]
    pub endpoint: String,

    /// Results requested per query (top 3 organic are kept downstream)
    #[serde(default = "default_web_search_results")]
    pub max_results: usize,

    /// Request timeout in seconds
    #[serde(default = "default_web_search_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// API key for the completion provider; absent falls back to the mock model
    pub api_key: Option<String>,

    /// OpenAI-compatible chat completions base URL
    #[serde(default = "default_model_api_base")]
    pub api_base: String,

    /// Model identifier
    #[serde(default = "default_model_name")]
    pub model: String,

    /// Maximum completion tokens
    #[serde(default = "default_model_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_model_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordsConfig {
    /// REST base URL of the record store; absent selects the in-memory store
    pub base_url: Option<String>,

    /// API key sent with record store requests
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_records_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// API key header name
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// User ID header name
    #[serde(default = "default_user_header")]
    pub user_header: String,

    /// Request ID header name
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Expose the Prometheus scrape endpoint
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_concurrent() -> usize { 100 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_batch_size() -> usize { 32 }
fn default_vector_timeout() -> u64 { 20 }
fn default_web_search_endpoint() -> String { "https://google.serper.dev/search".to_string() }
fn default_web_search_results() -> usize { 5 }
fn default_web_search_timeout() -> u64 { 10 }
fn default_model_api_base() -> String { "https://openrouter.ai/api/v1".to_string() }
fn default_model_name() -> String { "openai/gpt-oss-20b".to_string() }
fn default_model_max_tokens() -> u32 { 500 }
fn default_model_temperature() -> f32 { 0.2 }
fn default_model_timeout() -> u64 { 30 }
fn default_records_timeout() -> u64 { 10 }
fn default_api_key_header() -> String { "Authorization".to_string() }
fn default_user_header() -> String { "X-User-ID".to_string() }
fn default_request_id_header() -> String { "X-Request-ID".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_enabled() -> bool { true }
fn default_service_name() -> String { "answerforge".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Whether web-search escalation is available
    pub fn web_search_enabled(&self) -> bool {
        self.web_search.api_key.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
                max_concurrent_requests: default_max_concurrent(),
            },
            embedding: EmbeddingConfig {
                provider: default_embedding_provider(),
                api_key: None,
                api_base: None,
                model: default_embedding_model(),
                dimension: default_embedding_dimension(),
                timeout_secs: default_embedding_timeout(),
                batch_size: default_batch_size(),
            },
            vector: VectorConfig {
                api_key: None,
                index_host: None,
                timeout_secs: default_vector_timeout(),
            },
            web_search: WebSearchConfig {
                api_key: None,
                endpoint: default_web_search_endpoint(),
                max_results: default_web_search_results(),
                timeout_secs: default_web_search_timeout(),
            },
            model: ModelConfig {
                api_key: None,
                api_base: default_model_api_base(),
                model: default_model_name(),
                max_tokens: default_model_max_tokens(),
                temperature: default_model_temperature(),
                timeout_secs: default_model_timeout(),
            },
            records: RecordsConfig {
                base_url: None,
                api_key: None,
                timeout_secs: default_records_timeout(),
            },
            auth: AuthConfig {
                api_key_header: default_api_key_header(),
                user_header: default_user_header(),
                request_id_header: default_request_id_header(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_enabled: default_metrics_enabled(),
                service_name: default_service_name(),
            },
            rate_limit: RateLimitConfig {
                requests_per_second: default_rate_limit(),
                burst: default_burst(),
                enabled: default_enabled(),
            },
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_web_search_endpoint(),
            max_results: default_web_search_results(),
            timeout_secs: default_web_search_timeout(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_model_api_base(),
            model: default_model_name(),
            max_tokens: default_model_max_tokens(),
            temperature: default_model_temperature(),
            timeout_secs: default_model_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.embedding.model, crate::DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.embedding.dimension, crate::DEFAULT_EMBEDDING_DIMENSION);
        assert_eq!(config.embedding.model, "text-embedding-ada-002");
    }

    #[test]
    fn test_web_search_disabled_without_key() {
        let mut config = AppConfig::default();
        assert!(!config.web_search_enabled());
        config.web_search.api_key = Some("key".into());
        assert!(config.web_search_enabled());
    }
}
