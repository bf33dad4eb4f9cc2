mod config;
mod error;
mod routes;

use std::collections::HashMap;
use std::sync::Arc;

use blackbook_core::db::Database;
use blackbook_core::sync::{GoogleSourceFactory, Scheduler, SourceFactory, SyncEngine};

use config::AppConfig;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("blackbook_api=info".parse().expect("valid directive")),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Starting blackbook-api with config: {config:?}");

    let db = Arc::new(Database::open(&config.db_path)?);

    let factory: Arc<dyn SourceFactory> = match &config.google_tokens_file {
        Some(path) => Arc::new(GoogleSourceFactory::from_token_file(path)?),
        None => Arc::new(GoogleSourceFactory::new(HashMap::new())),
    };

    let engine = Arc::new(SyncEngine::new(db.clone(), factory).with_call_timeout(config.call_timeout));

    let scheduler = Arc::new(Scheduler::new(db.clone(), engine.clone()));
    tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run().await }
    });

    let bind_addr = config.bind_addr.clone();
    let state = AppState { db, engine };
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("blackbook-api listening on {bind_addr}");
    axum::serve(listener, router).await?;
    Ok(())
}
