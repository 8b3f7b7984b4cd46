//! RBAC to ABAC compilation and the engine pull protocol.

pub mod aggregate;
pub mod cache;
pub mod compiler;
pub mod engine;
pub mod errors;
pub mod pipeline;
pub mod resolver;
pub mod translate;
pub mod types;
pub mod web;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use cache::{CacheOptions, MetadataCache};
use engine::EngineService;
use pipeline::GrantPipeline;

use crate::settings::Settings;
use crate::storage::DbMetadataSource;

pub type DbMetadataCache = MetadataCache<DbMetadataSource>;
pub type DbGrantPipeline = GrantPipeline<DbMetadataSource>;

/// Metadata cache over the database, tuned from settings.
pub fn build_cache(db: &DatabaseConnection, settings: &Settings) -> Arc<DbMetadataCache> {
    Arc::new(MetadataCache::new(
        DbMetadataSource::new(db.clone()),
        CacheOptions::from_settings(&settings.cache),
    ))
}

pub fn build_engine(
    db: &DatabaseConnection,
    cache: Arc<DbMetadataCache>,
) -> Arc<EngineService<DbMetadataSource>> {
    Arc::new(EngineService::new(db.clone(), cache))
}

/// Grant pipeline sharing the engine's metadata cache.
pub fn build_pipeline(db: &DatabaseConnection, cache: Arc<DbMetadataCache>) -> Arc<DbGrantPipeline> {
    Arc::new(GrantPipeline::new(db.clone(), cache))
}
