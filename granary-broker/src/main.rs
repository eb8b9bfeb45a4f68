mod api;
mod auth;
mod config;
mod service;
mod state;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "granary_broker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Granary Broker...");

    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Invalid configuration");

    tracing::info!("Connecting to database...");

    // Create database connection pool
    let pool = granary_db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");

    tracing::info!("Database connection pool created");

    // Run migrations
    granary_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let state = AppState::from_config(&config, pool).expect("Failed to initialize broker state");
    tracing::info!(
        "Trusting {} client key(s), arch:all affinity is {}",
        state.trusted_clients.len(),
        state.arch_affinity
    );

    // Build router with all endpoints
    let app = api::create_router(state);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

/// Resolves when the process is told to stop (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for ctrl-c");
    };

    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, closing listener");
}
