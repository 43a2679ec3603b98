use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::extract::ApiJson;
use crate::api::state::AppState;
use crate::error::{ErrorKind, Result};
use crate::models::{CouponData, CouponScope, CouponView, DiscountKind, UsageRecord};
use crate::services::catalog;
use crate::services::redemption::{Decision, Outcome, RedeemRequest};

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub order_amount: Decimal,
    pub store_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateCouponResponse {
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon: Option<CouponView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct RedeemCouponRequest {
    pub store_id: Option<i64>,
    pub order_amount: Decimal,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemCouponResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageRecord>,
}

impl RedeemCouponResponse {
    fn rejected(kind: ErrorKind, message: String) -> (StatusCode, Json<Self>) {
        (
            kind.status_code(),
            Json(Self {
                success: false,
                message,
                kind: Some(kind),
                discount: None,
                usage: None,
            }),
        )
    }
}

/// Body for coupon create and update
#[derive(Debug, Deserialize)]
pub struct CouponRequest {
    pub code: String,
    pub discount_kind: DiscountKind,
    pub discount_magnitude: Decimal,
    pub expiry: DateTime<Utc>,
    pub capacity: i32,
    #[serde(default = "default_active")]
    pub active: bool,
    pub rules: Option<String>,
    pub store_id: Option<i64>,
}

fn default_active() -> bool {
    true
}

impl From<CouponRequest> for CouponData {
    fn from(req: CouponRequest) -> Self {
        Self {
            code: req.code,
            discount_kind: req.discount_kind,
            discount_magnitude: req.discount_magnitude,
            expiry: req.expiry,
            capacity: req.capacity,
            active: req.active,
            rules: req.rules,
            scope: CouponScope::from_store_id(req.store_id),
        }
    }
}

/// Checks a code against an order without consuming it
async fn validate_coupon(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ValidateCouponRequest>,
) -> Result<(StatusCode, Json<ValidateCouponResponse>)> {
    let decision = state
        .engine
        .validate(&req.code, req.order_amount, req.store_id)
        .await?;

    let response = match decision {
        Decision::Accepted { coupon, discount } => (
            StatusCode::OK,
            Json(ValidateCouponResponse {
                valid: true,
                message: "coupon valid".to_string(),
                kind: None,
                coupon: Some(coupon.view()),
                discount: Some(discount),
            }),
        ),
        Decision::Rejected(rejection) => (
            rejection.kind().status_code(),
            Json(ValidateCouponResponse {
                valid: false,
                message: rejection.to_string(),
                kind: Some(rejection.kind()),
                coupon: None,
                discount: None,
            }),
        ),
    };

    Ok(response)
}

/// Consumes one unit of a coupon for an order at a store
async fn redeem_coupon(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<RedeemCouponRequest>,
) -> Result<(StatusCode, Json<RedeemCouponResponse>)> {
    let Some(store_id) = req.store_id else {
        return Ok(RedeemCouponResponse::rejected(
            ErrorKind::InvalidInput,
            "store_id is required".to_string(),
        ));
    };

    let outcome = state
        .engine
        .redeem(RedeemRequest {
            coupon_id: id,
            store_id,
            order_amount: req.order_amount,
            note: req.note,
        })
        .await?;

    let response = match outcome {
        Outcome::Redeemed {
            discount, usage, ..
        } => (
            StatusCode::OK,
            Json(RedeemCouponResponse {
                success: true,
                message: "coupon redeemed".to_string(),
                kind: None,
                discount: Some(discount),
                usage: Some(usage),
            }),
        ),
        Outcome::Rejected(rejection) => {
            RedeemCouponResponse::rejected(rejection.kind(), rejection.to_string())
        }
    };

    Ok(response)
}

async fn coupon_usage(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<UsageRecord>>> {
    let history = catalog::coupon_usage(state.storage.as_ref(), id).await?;
    Ok(Json(history))
}

async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CouponView>> {
    let coupon = catalog::get_coupon(state.storage.as_ref(), id).await?;
    Ok(Json(coupon.view()))
}

async fn get_coupon_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<CouponView>> {
    let coupon = catalog::get_coupon_by_code(state.storage.as_ref(), &code).await?;
    Ok(Json(coupon.view()))
}

async fn create_coupon(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CouponRequest>,
) -> Result<(StatusCode, Json<CouponView>)> {
    let coupon = catalog::create_coupon(state.storage.as_ref(), &req.into()).await?;
    Ok((StatusCode::CREATED, Json(coupon.view())))
}

async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<CouponRequest>,
) -> Result<Json<CouponView>> {
    let coupon = catalog::update_coupon(state.storage.as_ref(), id, &req.into()).await?;
    Ok(Json(coupon.view()))
}

async fn delete_coupon(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode> {
    catalog::delete_coupon(state.storage.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/coupons", post(create_coupon))
        .route("/api/coupons/validate", post(validate_coupon))
        .route("/api/coupons/code/:code", get(get_coupon_by_code))
        .route(
            "/api/coupons/:id",
            get(get_coupon).put(update_coupon).delete(delete_coupon),
        )
        .route("/api/coupons/:id/redeem", post(redeem_coupon))
        .route("/api/coupons/:id/usage", get(coupon_usage))
}
