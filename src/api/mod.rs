// API module - HTTP endpoints

pub mod coupons;
pub mod extract;
pub mod health;
pub mod state;
pub mod stores;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Assembles every route of the service
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .merge(coupons::router())
        .merge(stores::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
