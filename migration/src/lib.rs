pub use sea_orm_migration::prelude::*;

mod m20250301_000001_model_tables;
mod m20250301_000002_engine_policies;
mod m20250301_000003_rbac_expressions;
mod m20250301_000004_job_executions;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_model_tables::Migration),
            Box::new(m20250301_000002_engine_policies::Migration),
            Box::new(m20250301_000003_rbac_expressions::Migration),
            Box::new(m20250301_000004_job_executions::Migration),
        ]
    }
}

/// Auto-increment primary key. SQLite only assigns rowids to `INTEGER PRIMARY KEY`,
/// so the column type differs per backend.
pub(crate) fn pk_column<T: IntoIden>(manager: &SchemaManager, iden: T) -> ColumnDef {
    match manager.get_database_backend() {
        sea_orm::DatabaseBackend::Postgres => ColumnDef::new(iden)
            .big_integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned(),
        _ => ColumnDef::new(iden)
            .integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned(),
    }
}
