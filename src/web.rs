//! HTTP surface of the service: the engine pull API plus request tracing.
use crate::authz;
use crate::authz::DbMetadataCache;
use crate::settings::Settings;
use axum::Router;
use miette::IntoDiagnostic;
use sea_orm::DatabaseConnection;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Full application router.
pub fn app(db: &DatabaseConnection, cache: Arc<DbMetadataCache>) -> Router {
    let engine = authz::build_engine(db, cache);
    authz::web::router(engine).layer(TraceLayer::new_for_http())
}

pub async fn serve(
    settings: Settings,
    db: DatabaseConnection,
    cache: Arc<DbMetadataCache>,
) -> miette::Result<()> {
    let router = app(&db, cache);

    let addr: SocketAddr = settings
        .listen_addr()
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    tracing::info!(%addr, "Engine policy API listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    axum::serve(listener, router).await.into_diagnostic()?;
    Ok(())
}
