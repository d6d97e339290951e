//! AnswerForge API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Chat over agent knowledge bases with web-search escalation
//! - Agent and conversation management
//! - Document ingestion and deletion
//! - Rate limiting and observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use axum::{
    routing::{delete, get, post},
    Router,
};
use answerforge_common::{
    agents::AgentService,
    config::AppConfig,
    conversations::ConversationService,
    knowledge::{ChunkingConfig, KnowledgeService},
    metrics,
    pipeline::{
        AnswerOrchestrator, AnswerOrchestratorConfig, ChunkSource, ConversationReader,
        RetrievalCache, RetrievalCacheConfig,
    },
    providers::{
        create_embedder, create_model, create_record_store, create_vector_index,
        create_web_searcher,
    },
    VERSION,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<AnswerOrchestrator>,
    pub agents: Arc<AgentService>,
    pub conversations: Arc<ConversationService>,
    pub knowledge: Arc<KnowledgeService>,
    pub cache: Arc<RetrievalCache>,
    pub web_search_enabled: bool,
    pub model_enabled: bool,
    pub metrics_handle: PrometheusHandle,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().expect("Failed to load configuration");
    let config = Arc::new(config);

    // Initialize tracing
    let filter = EnvFilter::new(&config.observability.log_level);
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(
        service = %config.observability.service_name,
        "Starting AnswerForge API Gateway v{}",
        VERSION
    );

    // Initialize metrics
    metrics::register_metrics();
    let mut metrics_builder = PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Suffix("duration_seconds".to_string()),
        metrics::LATENCY_BUCKETS,
    )?;
    // Provider calls are an order of magnitude slower than local work
    for provider in ["embedding", "web_search", "model"] {
        metrics_builder = metrics_builder.set_buckets_for_metric(
            Matcher::Full(format!(
                "{}_{}_duration_seconds",
                metrics::METRICS_PREFIX,
                provider
            )),
            metrics::PROVIDER_BUCKETS,
        )?;
    }
    let metrics_handle = metrics_builder.install_recorder()?;

    // Providers degrade to mocks or disabled capabilities when
    // credentials are missing; the gateway always starts.
    let embedder = create_embedder(&config.embedding);
    let index = create_vector_index(&config.vector, config.embedding.dimension);
    let web = create_web_searcher(&config.web_search);
    let model = create_model(&config.model);
    let store = create_record_store(&config.records);

    let web_search_enabled = web.is_some();
    let model_enabled = model.is_some();

    let knowledge = Arc::new(KnowledgeService::new(
        embedder,
        index,
        ChunkingConfig::default(),
    ));
    let cache = Arc::new(RetrievalCache::new(RetrievalCacheConfig::default()));
    let conversations = Arc::new(ConversationService::new(store.clone()));
    let agents = Arc::new(AgentService::new(
        store.clone(),
        knowledge.clone(),
        cache.clone(),
    ));

    let orchestrator = Arc::new(AnswerOrchestrator::new(
        AnswerOrchestratorConfig::default(),
        knowledge.clone() as Arc<dyn ChunkSource>,
        cache.clone(),
        web,
        model,
        Some(conversations.clone() as Arc<dyn ConversationReader>),
    ));

    // Create app state
    let state = AppState {
        config: config.clone(),
        orchestrator,
        agents,
        conversations,
        knowledge,
        cache,
        web_search_enabled,
        model_enabled,
        metrics_handle,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let mut api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Service status and cache administration
        .route("/status", get(handlers::admin::status))
        .route("/cache/clear", post(handlers::admin::clear_cache))
        // Chat endpoints
        .route("/chat", post(handlers::chat::chat))
        .route("/agents/{name}/chat", post(handlers::chat::agent_chat))
        // Agent endpoints
        .route("/agents", post(handlers::agents::create_agent))
        .route("/agents", get(handlers::agents::list_agents))
        .route("/agents/{name}", get(handlers::agents::get_agent))
        .route("/agents/{name}", delete(handlers::agents::delete_agent))
        .route("/agents/{name}/stats", get(handlers::agents::agent_stats))
        .route("/agents/{name}/reset", post(handlers::agents::reset_agent))
        // Document endpoints
        .route(
            "/agents/{name}/documents",
            post(handlers::agents::ingest_document),
        )
        .route(
            "/agents/{name}/documents/{filename}",
            delete(handlers::agents::delete_document),
        )
        // Conversation endpoints
        .route(
            "/agents/{name}/conversations",
            get(handlers::conversations::list_conversations),
        )
        .route(
            "/conversations/{id}",
            get(handlers::conversations::get_conversation),
        )
        .route(
            "/conversations/{id}",
            delete(handlers::conversations::delete_conversation),
        );

    if state.config.observability.metrics_enabled {
        let metrics_handle = state.metrics_handle.clone();
        api_routes = api_routes.route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        );
    }

    // Compose the app
    let mut app = Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state.clone());

    if state.config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        app = app.layer(axum::middleware::from_fn(
            move |request: axum::extract::Request, next: axum::middleware::Next| {
                let limiter = limiter.clone();
                async move {
                    middleware::rate_limit::rate_limit_middleware(request, next, limiter).await
                }
            },
        ));
    }

    app
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{admin, agents as agent_handlers, chat as chat_handlers,
        conversations as conversation_handlers, health};
    use crate::handlers::agents::{CreateAgentRequest, IngestDocumentRequest};
    use crate::handlers::chat::ChatRequest;
    use answerforge_common::auth::AuthContext;
    use answerforge_common::errors::AppError;
    use answerforge_common::providers::{
        CompletionModel, MemoryRecordStore, MemoryVectorIndex, MockEmbedder, MockModel,
        RecordStore, WebSearcher,
    };
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::Json;

    fn auth() -> AuthContext {
        AuthContext {
            user_id: None,
            api_key_fingerprint: None,
            request_id: "test-request".to_string(),
        }
    }

    /// Wires the full service stack over in-process providers, the
    /// same way `main` does over real ones.
    fn test_state(
        model: Option<Arc<dyn CompletionModel>>,
        web: Option<Arc<dyn WebSearcher>>,
    ) -> AppState {
        let config = Arc::new(AppConfig::default());
        let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let knowledge = Arc::new(KnowledgeService::new(
            Arc::new(MockEmbedder::new(32)),
            Arc::new(MemoryVectorIndex::new()),
            ChunkingConfig::default(),
        ));
        let cache = Arc::new(RetrievalCache::new(RetrievalCacheConfig::default()));
        let conversations = Arc::new(ConversationService::new(store.clone()));
        let agents = Arc::new(AgentService::new(
            store,
            knowledge.clone(),
            cache.clone(),
        ));

        let web_search_enabled = web.is_some();
        let model_enabled = model.is_some();

        let orchestrator = Arc::new(AnswerOrchestrator::new(
            AnswerOrchestratorConfig::default(),
            knowledge.clone() as Arc<dyn ChunkSource>,
            cache.clone(),
            web,
            model,
            Some(conversations.clone() as Arc<dyn ConversationReader>),
        ));

        AppState {
            config,
            orchestrator,
            agents,
            conversations,
            knowledge,
            cache,
            web_search_enabled,
            model_enabled,
            metrics_handle: PrometheusBuilder::new().build_recorder().handle(),
        }
    }

    fn answering_state() -> AppState {
        test_state(
            Some(Arc::new(MockModel::with_reply(
                "The filter sits behind the access panel.",
            ))),
            None,
        )
    }

    fn manual_text() -> String {
        let mut text = String::new();
        for i in 0..40 {
            text.push_str(&format!(
                "Section {} of the manual covers filter replacement and damper balancing. ",
                i
            ));
        }
        text
    }

    async fn create_agent(state: &AppState, name: &str) {
        let (status, Json(agent)) = agent_handlers::create_agent(
            State(state.clone()),
            auth(),
            Json(CreateAgentRequest {
                name: name.to_string(),
                description: None,
                extra_instructions: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(agent.name, name);
    }

    async fn ingest(state: &AppState, agent: &str, filename: &str) -> usize {
        let Json(response) = agent_handlers::ingest_document(
            State(state.clone()),
            Path(agent.to_string()),
            Json(IngestDocumentRequest {
                filename: filename.to_string(),
                text: manual_text(),
                content_type: None,
            }),
        )
        .await
        .unwrap();
        assert!(response.success);
        response.chunks_added
    }

    #[tokio::test]
    async fn test_chat_persists_both_sides_of_the_exchange() {
        let state = answering_state();
        state
            .knowledge
            .ingest_document(None, "guide.txt", &manual_text(), "text/plain")
            .await
            .unwrap();

        let Json(reply) = chat_handlers::chat(
            State(state.clone()),
            auth(),
            Json(ChatRequest {
                message: "How do I replace the filter?".to_string(),
                conversation_id: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(reply.response, "The filter sits behind the access panel.");
        assert!(reply.chunks_found > 0);
        assert!(!reply.sources.is_empty());

        let conversation_id = reply.conversation_id.unwrap();
        let detail = state
            .conversations
            .conversation_detail(conversation_id)
            .await
            .unwrap();
        assert_eq!(detail.messages.len(), 2);
        assert_eq!(detail.messages[0].text, "How do I replace the filter?");
        assert!(detail.messages[1].sources.is_some());
        assert_eq!(detail.messages[1].chunks_found, Some(reply.chunks_found));

        // First unscoped chat registers the default agent
        assert!(state.agents.get_agent("General").await.is_ok());
    }

    #[tokio::test]
    async fn test_agent_chat_only_sees_its_own_documents() {
        let state = answering_state();
        create_agent(&state, "HVAC").await;
        create_agent(&state, "Boiler").await;
        ingest(&state, "HVAC", "manual.txt").await;

        let Json(scoped) = chat_handlers::agent_chat(
            State(state.clone()),
            auth(),
            Path("HVAC".to_string()),
            Json(ChatRequest {
                message: "How do I balance the dampers?".to_string(),
                conversation_id: None,
            }),
        )
        .await
        .unwrap();
        assert!(scoped.chunks_found > 0);

        let Json(empty) = chat_handlers::agent_chat(
            State(state.clone()),
            auth(),
            Path("Boiler".to_string()),
            Json(ChatRequest {
                message: "How do I balance the dampers?".to_string(),
                conversation_id: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(empty.chunks_found, 0);
        assert!(empty
            .response
            .contains("couldn't find any relevant information"));
    }

    #[tokio::test]
    async fn test_agent_chat_with_unknown_agent_is_not_found() {
        let state = answering_state();

        let result = chat_handlers::agent_chat(
            State(state.clone()),
            auth(),
            Path("Nobody".to_string()),
            Json(ChatRequest {
                message: "hello".to_string(),
                conversation_id: None,
            }),
        )
        .await;

        assert!(matches!(result, Err(AppError::AgentNotFound { .. })));
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected() {
        let state = answering_state();

        let result = chat_handlers::chat(
            State(state.clone()),
            auth(),
            Json(ChatRequest {
                message: "   ".to_string(),
                conversation_id: None,
            }),
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_conversation_continues_across_requests() {
        let state = answering_state();
        create_agent(&state, "HVAC").await;
        ingest(&state, "HVAC", "manual.txt").await;

        let Json(first) = chat_handlers::agent_chat(
            State(state.clone()),
            auth(),
            Path("HVAC".to_string()),
            Json(ChatRequest {
                message: "What does the warranty cover?".to_string(),
                conversation_id: None,
            }),
        )
        .await
        .unwrap();
        let conversation_id = first.conversation_id.unwrap();

        let Json(second) = chat_handlers::agent_chat(
            State(state.clone()),
            auth(),
            Path("HVAC".to_string()),
            Json(ChatRequest {
                message: "And for how long?".to_string(),
                conversation_id: Some(conversation_id),
            }),
        )
        .await
        .unwrap();
        assert_eq!(second.conversation_id, Some(conversation_id));

        let detail = state
            .conversations
            .conversation_detail(conversation_id)
            .await
            .unwrap();
        assert_eq!(detail.messages.len(), 4);
        assert_eq!(detail.conversation.title, "What does the warranty cover?");

        let Json(listed) = conversation_handlers::list_conversations(
            State(state.clone()),
            Path("HVAC".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_document_deletion_invalidates_cached_answers() {
        let state = answering_state();
        create_agent(&state, "HVAC").await;
        ingest(&state, "HVAC", "manual.txt").await;

        let request = ChatRequest {
            message: "How do I replace the filter?".to_string(),
            conversation_id: None,
        };
        let Json(before) = chat_handlers::agent_chat(
            State(state.clone()),
            auth(),
            Path("HVAC".to_string()),
            Json(ChatRequest {
                message: request.message.clone(),
                conversation_id: None,
            }),
        )
        .await
        .unwrap();
        assert!(before.chunks_found > 0);

        agent_handlers::delete_document(
            State(state.clone()),
            Path(("HVAC".to_string(), "manual.txt".to_string())),
        )
        .await
        .unwrap();

        let Json(after) = chat_handlers::agent_chat(
            State(state.clone()),
            auth(),
            Path("HVAC".to_string()),
            Json(request),
        )
        .await
        .unwrap();
        assert_eq!(after.chunks_found, 0);
    }

    #[tokio::test]
    async fn test_status_reports_capabilities() {
        let state = answering_state();

        let Json(status) = admin::status(State(state.clone())).await.unwrap();

        assert_eq!(status.status, "running");
        assert!(status.services.model);
        assert!(!status.services.web_search);
        assert_eq!(status.services.embedding_model, "mock-embedding");
        assert_eq!(status.cache.capacity, 100);
    }

    #[tokio::test]
    async fn test_clear_cache_drops_entries() {
        let state = answering_state();
        state
            .knowledge
            .ingest_document(None, "guide.txt", &manual_text(), "text/plain")
            .await
            .unwrap();
        chat_handlers::chat(
            State(state.clone()),
            auth(),
            Json(ChatRequest {
                message: "How do I replace the filter?".to_string(),
                conversation_id: None,
            }),
        )
        .await
        .unwrap();
        assert!(!state.cache.is_empty());

        let Json(cleared) = admin::clear_cache(State(state.clone())).await.unwrap();

        assert!(cleared.entries_dropped > 0);
        assert!(state.cache.is_empty());
    }

    #[tokio::test]
    async fn test_agent_deletion_via_handler() {
        let state = answering_state();
        create_agent(&state, "HVAC").await;

        let Json(deleted) =
            agent_handlers::delete_agent(State(state.clone()), Path("HVAC".to_string()))
                .await
                .unwrap();
        assert_eq!(deleted.message, "Agent 'HVAC' deleted successfully");

        let result = agent_handlers::get_agent(State(state.clone()), Path("HVAC".to_string())).await;
        assert!(matches!(result, Err(AppError::AgentNotFound { .. })));
    }

    #[tokio::test]
    async fn test_agent_reset_clears_documents_and_cached_answers() {
        let state = answering_state();
        create_agent(&state, "HVAC").await;
        ingest(&state, "HVAC", "manual.txt").await;

        let Json(before) = chat_handlers::agent_chat(
            State(state.clone()),
            auth(),
            Path("HVAC".to_string()),
            Json(ChatRequest {
                message: "How do I replace the filter?".to_string(),
                conversation_id: None,
            }),
        )
        .await
        .unwrap();
        assert!(before.chunks_found > 0);

        let Json(reset) =
            agent_handlers::reset_agent(State(state.clone()), Path("HVAC".to_string()))
                .await
                .unwrap();
        assert_eq!(
            reset.message,
            "Knowledge base for agent 'HVAC' reset successfully"
        );
        assert_eq!(reset.namespace, "agent_hvac");

        let Json(after) = chat_handlers::agent_chat(
            State(state.clone()),
            auth(),
            Path("HVAC".to_string()),
            Json(ChatRequest {
                message: "How do I replace the filter?".to_string(),
                conversation_id: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(after.chunks_found, 0);

        let Json(stats) =
            agent_handlers::agent_stats(State(state.clone()), Path("HVAC".to_string()))
                .await
                .unwrap();
        assert_eq!(stats.total_chunks, 0);
        assert!(stats.files.is_empty());
    }

    #[tokio::test]
    async fn test_conversation_deletion_via_handler() {
        let state = answering_state();
        let Json(reply) = chat_handlers::chat(
            State(state.clone()),
            auth(),
            Json(ChatRequest {
                message: "Anything on file?".to_string(),
                conversation_id: None,
            }),
        )
        .await
        .unwrap();
        let id = reply.conversation_id.unwrap();

        conversation_handlers::delete_conversation(State(state.clone()), Path(id))
            .await
            .unwrap();

        let again =
            conversation_handlers::delete_conversation(State(state.clone()), Path(id)).await;
        assert!(matches!(again, Err(AppError::ConversationNotFound { .. })));
    }

    #[tokio::test]
    async fn test_health_and_readiness() {
        let state = answering_state();

        let Json(alive) = health::health().await;
        assert_eq!(alive.status, "healthy");

        let Json(ready) = health::ready(State(state.clone())).await;
        assert_eq!(ready.status, "ready");
        assert_eq!(ready.checks.vector_index.status, "up");
    }
}
