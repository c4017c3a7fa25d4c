mod config;

use anyhow::Result;
use crate::config::AppConfig;
use picker_api::{create_routes, AppState};
use picker_db::{DatabaseConnection, SqliteLedgerStore};
use picker_models::TeamDirectory;
use picker_services::{
    AccuracyLedger, AnalysisMetrics, FactorProviders, OpenAiReasoningClient,
    PredictionOrchestrator, QueryService,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "picker_rs=debug,picker_services=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Picker-RS matchup prediction service");

    // Load configuration
    let config = AppConfig::new()?;
    info!("✅ Configuration loaded successfully");
    info!("📊 Database: {}", config.database_url());
    info!("📁 Factor snapshots: {}", config.providers.data_dir);
    info!("🌐 Server will bind to: {}", config.server_addr());

    let db = DatabaseConnection::new(config.database_url(), config.database.max_connections).await?;
    db.run_migrations().await?;
    info!("✅ Database migrations applied");

    let store = Arc::new(SqliteLedgerStore::new(db.pool().clone()));
    let ledger = Arc::new(AccuracyLedger::open(store, config.analysis.recent_limit).await?);

    let api_key = config.reasoning.api_key.clone().unwrap_or_default();
    if api_key.is_empty() {
        warn!("⚠️  OPENAI_API_KEY is not set, analyses will fail until it is");
    }
    let reasoning = Arc::new(OpenAiReasoningClient::new(
        config.reasoning.endpoint.clone(),
        api_key,
        config.reasoning.model.clone(),
        Duration::from_secs(config.analysis.reasoning_timeout_secs),
    )?);

    let directory = Arc::new(TeamDirectory::nfl());
    let providers = FactorProviders::from_directory(&config.providers.data_dir);
    let orchestrator = PredictionOrchestrator::new(
        directory.clone(),
        providers.clone(),
        reasoning,
        ledger.clone(),
        AnalysisMetrics::new()?,
        config.orchestrator_config(),
    );
    let queries = QueryService::new(directory, providers.stats.clone(), ledger.clone());

    let app = create_routes()
        .with_state(AppState::new(orchestrator, queries))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.server_addr()).await?;
    info!("✅ All services started successfully");
    info!("⌨️  Press Ctrl+C to stop");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Shutting down gracefully");
    ledger.close().await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", err);
    }
}
