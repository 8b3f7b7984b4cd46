use policyhub::authz::cache::{no_jitter, CacheOptions, MetadataCache};
use policyhub::authz::types::ResourceTypeRef;
use policyhub::authz::pipeline::GrantPipeline;
use policyhub::authz::{DbGrantPipeline, DbMetadataCache};
use policyhub::storage::{self, DbMetadataSource};
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        // Connect to database
        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        // Run migrations
        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// Metadata cache over this database with a fixed TTL and no jitter
    pub fn cache(&self) -> Arc<DbMetadataCache> {
        Arc::new(MetadataCache::new(
            DbMetadataSource::new(self.connection.clone()),
            CacheOptions {
                enabled: true,
                ttl: Duration::from_secs(60),
                error_ttl: Duration::from_secs(5),
                jitter: no_jitter(),
            },
        ))
    }

    /// Grant pipeline over this database with its own test cache
    pub fn pipeline(&self) -> DbGrantPipeline {
        GrantPipeline::new(self.connection.clone(), self.cache())
    }
}

/// Seeded model: `sys` system with `host` under `biz`, and actions on hosts.
pub struct SeedModel {
    pub host: i64,
    pub biz: i64,
    pub view_host: i64,
    pub edit_host: i64,
}

pub async fn seed_model(db: &DatabaseConnection) -> SeedModel {
    let host = storage::create_resource_type(db, "sys", "host", "Host")
        .await
        .expect("Failed to create resource type");
    let biz = storage::create_resource_type(db, "sys", "biz", "Business")
        .await
        .expect("Failed to create resource type");

    let related = [ResourceTypeRef {
        system: "sys".to_string(),
        id: "host".to_string(),
    }];
    let view_host = storage::create_action(db, "sys", "view_host", "View host", &related)
        .await
        .expect("Failed to create action");
    let edit_host = storage::create_action(db, "sys", "edit_host", "Edit host", &related)
        .await
        .expect("Failed to create action");

    SeedModel {
        host,
        biz,
        view_host,
        edit_host,
    }
}

/// Create a subject for testing
pub async fn seed_subject(db: &DatabaseConnection, subject_type: &str, id: &str) -> i64 {
    storage::create_subject(db, subject_type, id, &id.to_uppercase())
        .await
        .expect("Failed to create subject")
}
