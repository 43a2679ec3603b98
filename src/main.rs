use axum::http::{HeaderValue, Method};
use secrecy::ExposeSecret;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use couponmaster::api::{self, AppState};
use couponmaster::config::Config;
use couponmaster::db;
use couponmaster::repository::PgRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "couponmaster=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CouponMaster server...");

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    let pool = db::create_pool(
        config.database_url.expose_secret(),
        config.database_max_connections,
    )
    .await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let state = AppState::new(Arc::new(PgRepository::new(pool)));

    let mut app = api::app(state);
    if let Some(origin) = &config.cors_allowed_origin {
        let cors = CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers(Any);
        app = app.layer(cors);
        tracing::info!(%origin, "CORS enabled");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // keep serving; the process can still be killed
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cleaning up...");
}
