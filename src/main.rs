use clap::Parser;
use miette::{IntoDiagnostic, Result};
use policyhub::{authz, jobs, settings, storage, web};
use sea_orm_migration::MigratorTrait;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "policyhub",
    version,
    about = "RBAC to ABAC policy compiler and engine policy feed"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database)
    let db = storage::init(&settings.database).await?;
    migration::Migrator::up(&db, None).await.into_diagnostic()?;

    let cache = authz::build_cache(&db, &settings);
    let pipeline = authz::build_pipeline(&db, cache.clone());

    // keep the scheduler alive for the lifetime of the server
    let _scheduler = if settings.jobs.enabled {
        Some(jobs::init_scheduler(pipeline, &settings.jobs).await?)
    } else {
        tracing::info!("Background jobs disabled");
        None
    };

    web::serve(settings, db, cache).await?;
    Ok(())
}
