mod aggregator;
mod app;
mod config;
mod db_migrations;
mod db_sqlx;
mod error;
mod routes;
mod services;
mod spatial;
mod state;
mod store;

extern crate self as sqlx;
pub use crate::db_sqlx::{Error, PgPool, Postgres, postgres, query, query_as, query_scalar};

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::error::ApiError;
use crate::state::AppState;
use crate::store::Store;
use crate::store::memory::{Dataset, MemoryStore};
use crate::store::postgres::PgStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let store = match open_store().await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "failed to open data store");
            return;
        }
    };

    let state = match AppState::load(store).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "failed to load administrative hierarchy");
            return;
        }
    };
    if !state.store.supports_point_lookup() {
        tracing::warn!("point lookup unavailable; clients fall back to boundary navigation");
    }

    services::cache_warmer::warm_cache(&state).await;

    // Spawn background services
    tokio::spawn(services::cache_evictor::run(state.clone()));

    let app = app::build_app(state);

    let addr = format!("0.0.0.0:{}", config::server_port());
    tracing::info!("Atlas server listening on {addr}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind TCP listener");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server failed");
    }

    tracing::info!("Server shut down gracefully");
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise the seed dataset.
async fn open_store() -> Result<Store, ApiError> {
    let Some(database_url) = config::database_url() else {
        let path = config::seed_path();
        tracing::info!(path = %path.display(), "DATABASE_URL not set, serving seed dataset");
        let dataset = Dataset::load(&path).await?;
        return Ok(Store::Memory(Arc::new(MemoryStore::new(dataset))));
    };

    let db_max_connections = config::db_max_connections();
    tracing::info!(db_max_connections, "Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(db_max_connections)
        .connect(&database_url)
        .await?;
    db_migrations::run(&pool)
        .await
        .map_err(|e| ApiError::Internal(format!("migrations failed: {e}")))?;
    tracing::info!("Database connected and migrations applied");

    Ok(Store::Postgres(PgStore::new(pool).await))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
