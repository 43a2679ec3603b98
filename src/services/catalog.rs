//! Administrative management of coupons and stores.
//!
//! Inputs are normalized and checked here before they reach storage, and
//! storage constraint violations are translated back into caller-facing errors.

use rust_decimal::Decimal;

use crate::models::{money, Coupon, CouponData, DiscountKind, Store, StoreData, UsageRecord};
use crate::repository::{CatalogRepository, RepositoryError};

const CODE_MAX_LEN: usize = 50;
const RULES_MAX_LEN: usize = 500;
const STORE_NAME_MAX_LEN: usize = 200;
const TAX_ID_MAX_LEN: usize = 18;
const EMAIL_MAX_LEN: usize = 200;
const PHONE_MAX_LEN: usize = 20;
const ADDRESS_MAX_LEN: usize = 500;

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Repository(RepositoryError),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

fn coupon_write_error(err: RepositoryError) -> CatalogError {
    match err {
        RepositoryError::Conflict(_) => CatalogError::Conflict("coupon code already exists".to_string()),
        RepositoryError::InvalidReference(_) => CatalogError::InvalidInput("store not found".to_string()),
        RepositoryError::Constraint(_) => CatalogError::InvalidInput(
            "capacity cannot be lower than the number of redemptions".to_string(),
        ),
        other => CatalogError::Repository(other),
    }
}

fn store_write_error(err: RepositoryError) -> CatalogError {
    match err {
        RepositoryError::Conflict(_) => {
            CatalogError::Conflict("store tax id already registered".to_string())
        }
        RepositoryError::InvalidReference(_) => {
            CatalogError::Conflict("store still has coupons restricted to it".to_string())
        }
        other => CatalogError::Repository(other),
    }
}

fn required(field: &str, value: &str, max_len: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CatalogError::InvalidInput(format!("{} is required", field)));
    }
    if value.chars().count() > max_len {
        return Err(CatalogError::InvalidInput(format!(
            "{} must be at most {} characters",
            field, max_len
        )));
    }
    Ok(value.to_string())
}

fn optional(field: &str, value: Option<&str>, max_len: usize) -> Result<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => required(field, v, max_len).map(Some),
        None => Ok(None),
    }
}

/// Normalizes coupon input: trims text, pins the magnitude to cents,
/// and rejects values the schema would refuse.
pub fn prepare_coupon(data: &CouponData) -> Result<CouponData> {
    let code = required("code", &data.code, CODE_MAX_LEN)?;

    let discount_magnitude = money::magnitude(data.discount_magnitude)
        .map_err(|e| CatalogError::InvalidInput(format!("discount_magnitude: {}", e)))?;
    if data.discount_kind == DiscountKind::Percentage && discount_magnitude > Decimal::ONE_HUNDRED
    {
        return Err(CatalogError::InvalidInput(
            "percentage discount cannot exceed 100".to_string(),
        ));
    }

    if data.capacity < 0 {
        return Err(CatalogError::InvalidInput(
            "capacity must not be negative".to_string(),
        ));
    }

    Ok(CouponData {
        code,
        discount_kind: data.discount_kind,
        discount_magnitude,
        expiry: data.expiry,
        capacity: data.capacity,
        active: data.active,
        rules: optional("rules", data.rules.as_deref(), RULES_MAX_LEN)?,
        scope: data.scope,
    })
}

/// Normalizes store input
pub fn prepare_store(data: &StoreData) -> Result<StoreData> {
    let email = required("email", &data.email, EMAIL_MAX_LEN)?;
    if !email.contains('@') {
        return Err(CatalogError::InvalidInput(
            "email must be a valid address".to_string(),
        ));
    }

    Ok(StoreData {
        name: required("name", &data.name, STORE_NAME_MAX_LEN)?,
        tax_id: required("tax_id", &data.tax_id, TAX_ID_MAX_LEN)?,
        email,
        phone: optional("phone", data.phone.as_deref(), PHONE_MAX_LEN)?,
        address: optional("address", data.address.as_deref(), ADDRESS_MAX_LEN)?,
        active: data.active,
    })
}

pub async fn get_coupon(repo: &dyn CatalogRepository, id: i64) -> Result<Coupon> {
    repo.find_by_id(id)
        .await
        .map_err(CatalogError::Repository)?
        .ok_or(CatalogError::NotFound("coupon"))
}

pub async fn get_coupon_by_code(repo: &dyn CatalogRepository, code: &str) -> Result<Coupon> {
    repo.find_by_code(code.trim())
        .await
        .map_err(CatalogError::Repository)?
        .ok_or(CatalogError::NotFound("coupon"))
}

#[tracing::instrument(skip(repo, data), fields(code = %data.code))]
pub async fn create_coupon(repo: &dyn CatalogRepository, data: &CouponData) -> Result<Coupon> {
    let data = prepare_coupon(data)?;
    let coupon = repo.insert_coupon(&data).await.map_err(coupon_write_error)?;

    tracing::info!(coupon_id = coupon.id, "Coupon created");

    Ok(coupon)
}

#[tracing::instrument(skip(repo, data))]
pub async fn update_coupon(
    repo: &dyn CatalogRepository,
    id: i64,
    data: &CouponData,
) -> Result<Coupon> {
    let data = prepare_coupon(data)?;

    let current = get_coupon(repo, id).await?;
    if data.capacity < current.used {
        return Err(CatalogError::InvalidInput(format!(
            "capacity cannot be lower than the {} redemptions already made",
            current.used
        )));
    }

    let coupon = repo
        .update_coupon(id, &data)
        .await
        .map_err(coupon_write_error)?
        .ok_or(CatalogError::NotFound("coupon"))?;

    tracing::info!(coupon_id = coupon.id, "Coupon updated");

    Ok(coupon)
}

/// Deletes a coupon together with its usage history
#[tracing::instrument(skip(repo))]
pub async fn delete_coupon(repo: &dyn CatalogRepository, id: i64) -> Result<()> {
    if !repo.delete_coupon(id).await.map_err(CatalogError::Repository)? {
        return Err(CatalogError::NotFound("coupon"));
    }

    tracing::info!(coupon_id = id, "Coupon deleted");

    Ok(())
}

pub async fn coupon_usage(repo: &dyn CatalogRepository, id: i64) -> Result<Vec<UsageRecord>> {
    let coupon = get_coupon(repo, id).await?;
    repo.usage_for_coupon(coupon.id)
        .await
        .map_err(CatalogError::Repository)
}

pub async fn get_store(repo: &dyn CatalogRepository, id: i64) -> Result<Store> {
    repo.find_store_by_id(id)
        .await
        .map_err(CatalogError::Repository)?
        .ok_or(CatalogError::NotFound("store"))
}

#[tracing::instrument(skip(repo, data))]
pub async fn create_store(repo: &dyn CatalogRepository, data: &StoreData) -> Result<Store> {
    let data = prepare_store(data)?;
    let store = repo.insert_store(&data).await.map_err(store_write_error)?;

    tracing::info!(store_id = store.id, "Store created");

    Ok(store)
}

#[tracing::instrument(skip(repo, data))]
pub async fn update_store(repo: &dyn CatalogRepository, id: i64, data: &StoreData) -> Result<Store> {
    let data = prepare_store(data)?;
    let store = repo
        .update_store(id, &data)
        .await
        .map_err(store_write_error)?
        .ok_or(CatalogError::NotFound("store"))?;

    tracing::info!(store_id = store.id, "Store updated");

    Ok(store)
}

/// Deletes a store. Refused while coupons are restricted to it.
#[tracing::instrument(skip(repo))]
pub async fn delete_store(repo: &dyn CatalogRepository, id: i64) -> Result<()> {
    if !repo.delete_store(id).await.map_err(store_write_error)? {
        return Err(CatalogError::NotFound("store"));
    }

    tracing::info!(store_id = id, "Store deleted");

    Ok(())
}
