//! # spaces-db
//!
//! PostgreSQL MetaStore for SpacesAI, the authoritative system of record.
//!
//! This crate provides:
//! - Connection pool management
//! - Idempotent schema initialization (pgvector + generated tsvector columns)
//! - Repositories for users/spaces, documents+chunks, image assets,
//!   research sessions, and the activity log
//! - The `metastore` retrieval backend (pgvector KNN + Postgres FTS)
//!
//! Search-index entries are derived from these tables and always rebuildable
//! (`reindex`); cross-store consistency is eventual by design.

pub mod activity;
pub mod documents;
pub mod image_assets;
pub mod pool;
pub mod research_sessions;
pub mod retrieval;
pub mod schema;
pub mod users;

pub use activity::PgActivityRepository;
pub use documents::{NewChunk, NewDocument, NewImageAsset, PgDocumentRepository};
pub use image_assets::PgImageAssetRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use research_sessions::PgResearchSessionRepository;
pub use retrieval::PgRetrieval;
pub use schema::init_schema;
pub use users::PgUserRepository;

use spaces_core::{Result, Settings};

/// Combined MetaStore context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::PgPool,
    pub users: PgUserRepository,
    pub documents: PgDocumentRepository,
    pub image_assets: PgImageAssetRepository,
    pub research_sessions: PgResearchSessionRepository,
    pub activity: PgActivityRepository,
    /// Retrieval over the relational store (the `metastore` backend).
    pub retrieval: PgRetrieval,
}

impl Database {
    /// Create a Database from an existing pool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            users: PgUserRepository::new(pool.clone()),
            documents: PgDocumentRepository::new(pool.clone()),
            image_assets: PgImageAssetRepository::new(pool.clone()),
            research_sessions: PgResearchSessionRepository::new(pool.clone()),
            activity: PgActivityRepository::new(pool.clone()),
            retrieval: PgRetrieval::new(pool.clone()),
            pool,
        }
    }

    /// Connect and build all repositories.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Connect using [`Settings`] (pool size, database URL) and initialize
    /// the schema. The startup entry point.
    pub async fn connect_with_settings(settings: &Settings) -> Result<Self> {
        let url = settings.require_database_url()?;
        let pool = create_pool_with_config(
            url,
            PoolConfig::default().max_connections(settings.db_pool_max),
        )
        .await?;
        init_schema(&pool, settings).await?;
        Ok(Self::new(pool))
    }
}
