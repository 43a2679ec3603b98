use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::extract::ApiJson;
use crate::api::state::AppState;
use crate::error::Result;
use crate::models::{Store, StoreData};
use crate::services::catalog;

/// Body for store create and update
#[derive(Debug, Deserialize)]
pub struct StoreRequest {
    pub name: String,
    pub tax_id: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl From<StoreRequest> for StoreData {
    fn from(req: StoreRequest) -> Self {
        Self {
            name: req.name,
            tax_id: req.tax_id,
            email: req.email,
            phone: req.phone,
            address: req.address,
            active: req.active,
        }
    }
}

async fn get_store(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Store>> {
    let store = catalog::get_store(state.storage.as_ref(), id).await?;
    Ok(Json(store))
}

async fn create_store(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<StoreRequest>,
) -> Result<(StatusCode, Json<Store>)> {
    let store = catalog::create_store(state.storage.as_ref(), &req.into()).await?;
    Ok((StatusCode::CREATED, Json(store)))
}

async fn update_store(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<StoreRequest>,
) -> Result<Json<Store>> {
    let store = catalog::update_store(state.storage.as_ref(), id, &req.into()).await?;
    Ok(Json(store))
}

/// Refused with 409 while coupons are restricted to the store
async fn delete_store(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode> {
    catalog::delete_store(state.storage.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/stores", post(create_store))
        .route(
            "/api/stores/:id",
            get(get_store).put(update_store).delete(delete_store),
        )
}
