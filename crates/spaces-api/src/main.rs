//! spaces-api: HTTP API server for SpacesAI.
//!
//! Wires the MetaStore, cache, search index, inference backends, ingestion
//! pipeline, retrieval engine, and the Deep Research agent behind an axum
//! router. Authentication lives in the gateway; this service trusts the
//! forwarded `X-User-Id` identity (see `auth.rs`).

mod auth;
mod error;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use spaces_cache::RevisionedCache;
use spaces_core::{EmbeddingBackend, ImageEmbeddingBackend, Settings};
use spaces_db::Database;
use spaces_index::SearchIndexClient;
use spaces_inference::{Captioner, LlmProvider, OllamaBackend, OllamaImageEmbedder};
use spaces_ingest::{
    extract::ImageAdapter, ExtractionRegistry, FilesystemBlobStore, Ingestor, Reindexer,
};
use spaces_research::{build_web_search, DeepResearchAgent, SessionStore};
use spaces_search::{Retriever, Synthesizer};

/// Time-ordered UUIDv7 request correlation ids.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: Database,
    pub cache: RevisionedCache,
    pub retriever: Retriever,
    pub synthesizer: Synthesizer,
    pub ingestor: Arc<Ingestor>,
    pub reindexer: Option<Arc<Reindexer>>,
    pub agent: Arc<DeepResearchAgent>,
}

fn router(state: AppState) -> Router {
    let max_body = state.settings.max_upload_bytes() as usize + 1024 * 1024;

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/upload", post(handlers::upload::upload))
        .route("/search", post(handlers::search::search))
        .route("/image-search", post(handlers::images::image_search))
        .route("/deep-research/start", post(handlers::research::start))
        .route("/deep-research/ask", post(handlers::research::ask))
        .route(
            "/deep-research/conversations",
            get(handlers::research::list_conversations),
        )
        .route("/admin/documents", get(handlers::admin::list_documents))
        .route(
            "/admin/documents/{id}",
            delete(handlers::admin::delete_document),
        )
        .route("/admin/reindex", post(handlers::admin::reindex))
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers(Any),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn build_state(settings: Settings) -> Result<AppState, spaces_core::Error> {
    let settings = Arc::new(settings);

    let db = Database::connect_with_settings(&settings).await?;
    let cache = RevisionedCache::from_settings(&settings).await;

    let index = match SearchIndexClient::from_settings(&settings)? {
        Some(client) => {
            // A dimension mismatch is a hard configuration error; a merely
            // unreachable index degrades to the MetaStore backend.
            match client.ensure_indexes().await {
                Ok(()) => Some(client),
                Err(e @ spaces_core::Error::Config(_)) => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Search index unreachable at startup; continuing");
                    Some(client)
                }
            }
        }
        None => None,
    };

    let embedder: Arc<dyn EmbeddingBackend> = Arc::new(OllamaBackend::from_settings(&settings));
    let image_embedder: Arc<dyn ImageEmbeddingBackend> =
        Arc::new(OllamaImageEmbedder::from_settings(&settings));

    let provider = match LlmProvider::from_settings(&settings) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "LLM provider unusable; answering without generation");
            LlmProvider::None
        }
    };
    let web = build_web_search(&settings);

    let captioner = Captioner::from_settings(&settings);
    let image_adapter = ImageAdapter::new(
        settings.upload_dir.clone(),
        captioner.is_enabled().then(|| Arc::new(captioner)),
    );
    let registry = ExtractionRegistry::standard(image_adapter);
    let blob = Arc::new(FilesystemBlobStore::new(settings.upload_dir.clone()));

    let retriever = Retriever::new(
        db.clone(),
        index.clone(),
        cache.clone(),
        embedder.clone(),
        settings.clone(),
    );
    let synthesizer = Synthesizer::new(provider.clone(), cache.clone());

    let ingestor = Arc::new(Ingestor::new(
        db.clone(),
        cache.clone(),
        index.clone(),
        blob,
        embedder.clone(),
        Some(image_embedder),
        registry,
        (*settings).clone(),
    ));
    let reindexer = index
        .clone()
        .map(|client| Arc::new(Reindexer::new(db.clone(), client, embedder.clone())));

    let sessions = SessionStore::new(db.research_sessions.clone(), cache.clone());
    let agent = Arc::new(DeepResearchAgent::new(
        retriever.clone(),
        provider,
        web,
        embedder,
        sessions,
        db.clone(),
        settings.clone(),
    ));

    Ok(AppState {
        settings,
        db,
        cache,
        retriever,
        synthesizer,
        ingestor,
        reindexer,
        agent,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env();
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let app_name = settings.app_name.clone();

    let state = build_state(settings).await?;
    let app = router(state);

    info!(
        subsystem = "api",
        op = "startup",
        app = %app_name,
        addr = %addr,
        "Server listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
