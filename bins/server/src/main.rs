//! Mavuno API Server
//!
//! Main entry point for the Mavuno cash ledger service.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mavuno_api::{AppState, create_router};
use mavuno_core::store::CashStore;
use mavuno_db::{SeaStore, connect_pool};
use mavuno_shared::{AppConfig, JwtConfig, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mavuno=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load()?;

    // Connect to database
    let db = connect_pool(&config.database).await?;
    info!(
        max_connections = config.database.max_connections,
        "Connected to database"
    );
    let store: Arc<dyn CashStore> = Arc::new(SeaStore::new(db));

    // Create JWT service
    let jwt_service = JwtService::new(JwtConfig {
        secret: config.jwt.secret.clone(),
        token_expires_minutes: i64::try_from(config.jwt.token_expiry_secs / 60)?,
    });

    info!(
        crops = ?config.settlement.harvest_sale_crop_types,
        "Harvest/Sale crop policy loaded"
    );
    let state = AppState::new(store, &config, Arc::new(jwt_service));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
