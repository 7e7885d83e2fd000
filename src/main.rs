use anyhow::Context;
use axum::Router;
use interview_store::blob::{BlobStore, HttpBlobStore, LocalBlobStore};
use interview_store::config::Config;
use interview_store::identity::JwtVerifier;
use interview_store::state::{AppState, SharedState};
use interview_store::store::PgStore;
use interview_store::vault::Vault;
use interview_store::web;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;
    tracing::info!("Database migrations completed");

    let blobs: Arc<dyn BlobStore> = match &config.storage {
        Some(storage) => {
            tracing::info!("Resume files go to object storage bucket {}", storage.bucket);
            Arc::new(HttpBlobStore::new(storage))
        }
        None => {
            tracing::info!("Resume files go to {}", config.upload_dir.display());
            Arc::new(LocalBlobStore::new(config.upload_dir.clone()))
        }
    };

    let shared: SharedState = Arc::new(AppState {
        vault: Vault::new(Arc::new(PgStore::new(pool))),
        identity: Arc::new(JwtVerifier::new(config.jwt_secret.clone())),
        blobs,
    });

    let app = Router::new()
        .merge(web::routes(shared))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
