//! In-process storage with the same guard, uniqueness and cascade rules as
//! the PostgreSQL schema. Used by tests and for running without a database.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{CatalogRepository, CouponRepository, RepositoryError, Result};
use crate::models::{Coupon, CouponData, NewUsageRecord, Store, StoreData, UsageRecord};

#[derive(Default)]
struct Tables {
    coupons: BTreeMap<i64, Coupon>,
    stores: BTreeMap<i64, Store>,
    usage: Vec<UsageRecord>,
    last_coupon_id: i64,
    last_store_id: i64,
    last_usage_id: i64,
}

impl Tables {
    fn code_taken(&self, code: &str, except: Option<i64>) -> bool {
        self.coupons
            .values()
            .any(|c| c.code == code && Some(c.id) != except)
    }

    fn tax_id_taken(&self, tax_id: &str, except: Option<i64>) -> bool {
        self.stores
            .values()
            .any(|s| s.tax_id == tax_id && Some(s.id) != except)
    }

    fn check_store_reference(&self, data: &CouponData) -> Result<()> {
        match data.scope.store_id() {
            Some(store_id) if !self.stores.contains_key(&store_id) => Err(
                RepositoryError::InvalidReference("coupons_store_id_fkey".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store snapshot as-is, keeping its id
    pub async fn import_store(&self, store: Store) {
        let mut tables = self.tables.write().await;
        tables.last_store_id = tables.last_store_id.max(store.id);
        tables.stores.insert(store.id, store);
    }

    /// Loads a coupon snapshot as-is, keeping its id and usage counter
    pub async fn import_coupon(&self, coupon: Coupon) {
        let mut tables = self.tables.write().await;
        tables.last_coupon_id = tables.last_coupon_id.max(coupon.id);
        tables.coupons.insert(coupon.id, coupon);
    }
}

#[async_trait]
impl CouponRepository for InMemoryRepository {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let tables = self.tables.read().await;
        Ok(tables.coupons.values().find(|c| c.code == code).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Coupon>> {
        Ok(self.tables.read().await.coupons.get(&id).cloned())
    }

    async fn find_store_by_id(&self, id: i64) -> Result<Option<Store>> {
        Ok(self.tables.read().await.stores.get(&id).cloned())
    }

    async fn commit_redemption(
        &self,
        coupon_id: i64,
        expected_used: i32,
        record: NewUsageRecord,
    ) -> Result<Option<UsageRecord>> {
        let mut tables = self.tables.write().await;

        let Some(coupon) = tables.coupons.get(&coupon_id) else {
            return Ok(None);
        };
        if coupon.used != expected_used || coupon.used >= coupon.capacity {
            return Ok(None);
        }
        if let Some(store_id) = record.store_id {
            if !tables.stores.contains_key(&store_id) {
                return Err(RepositoryError::InvalidReference(
                    "usage_records_store_id_fkey".to_string(),
                ));
            }
        }

        let Some(coupon) = tables.coupons.get_mut(&coupon_id) else {
            return Ok(None);
        };
        coupon.used += 1;
        coupon.updated_at = Some(record.used_at);

        tables.last_usage_id += 1;
        let inserted = UsageRecord {
            id: tables.last_usage_id,
            coupon_id,
            used_at: record.used_at,
            order_amount: record.order_amount,
            discount_amount: record.discount_amount,
            store_id: record.store_id,
            note: record.note,
        };
        tables.usage.push(inserted.clone());

        Ok(Some(inserted))
    }

    async fn usage_for_coupon(&self, coupon_id: i64) -> Result<Vec<UsageRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<UsageRecord> = tables
            .usage
            .iter()
            .filter(|r| r.coupon_id == coupon_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.used_at, r.id));
        Ok(records)
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn insert_coupon(&self, data: &CouponData) -> Result<Coupon> {
        let mut tables = self.tables.write().await;

        if tables.code_taken(&data.code, None) {
            return Err(RepositoryError::Conflict("coupons_code_key".to_string()));
        }
        tables.check_store_reference(data)?;

        let now = Utc::now();
        tables.last_coupon_id += 1;
        let coupon = Coupon {
            id: tables.last_coupon_id,
            code: data.code.clone(),
            discount_kind: data.discount_kind,
            discount_magnitude: data.discount_magnitude,
            expiry: data.expiry,
            capacity: data.capacity,
            used: 0,
            active: data.active,
            rules: data.rules.clone(),
            scope: data.scope,
            created_at: now,
            updated_at: Some(now),
        };
        tables.coupons.insert(coupon.id, coupon.clone());

        Ok(coupon)
    }

    async fn update_coupon(&self, id: i64, data: &CouponData) -> Result<Option<Coupon>> {
        let mut tables = self.tables.write().await;

        let Some(current) = tables.coupons.get(&id) else {
            return Ok(None);
        };
        if data.capacity < current.used {
            return Err(RepositoryError::Constraint(
                "coupons_used_within_capacity".to_string(),
            ));
        }
        if tables.code_taken(&data.code, Some(id)) {
            return Err(RepositoryError::Conflict("coupons_code_key".to_string()));
        }
        tables.check_store_reference(data)?;

        let Some(coupon) = tables.coupons.get_mut(&id) else {
            return Ok(None);
        };
        coupon.code = data.code.clone();
        coupon.discount_kind = data.discount_kind;
        coupon.discount_magnitude = data.discount_magnitude;
        coupon.expiry = data.expiry;
        coupon.capacity = data.capacity;
        coupon.active = data.active;
        coupon.rules = data.rules.clone();
        coupon.scope = data.scope;
        coupon.updated_at = Some(Utc::now());

        Ok(Some(coupon.clone()))
    }

    async fn delete_coupon(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.coupons.remove(&id).is_none() {
            return Ok(false);
        }
        tables.usage.retain(|r| r.coupon_id != id);
        Ok(true)
    }

    async fn insert_store(&self, data: &StoreData) -> Result<Store> {
        let mut tables = self.tables.write().await;

        if tables.tax_id_taken(&data.tax_id, None) {
            return Err(RepositoryError::Conflict("stores_tax_id_key".to_string()));
        }

        let now = Utc::now();
        tables.last_store_id += 1;
        let store = Store {
            id: tables.last_store_id,
            name: data.name.clone(),
            tax_id: data.tax_id.clone(),
            email: data.email.clone(),
            phone: data.phone.clone(),
            address: data.address.clone(),
            active: data.active,
            created_at: now,
            updated_at: Some(now),
        };
        tables.stores.insert(store.id, store.clone());

        Ok(store)
    }

    async fn update_store(&self, id: i64, data: &StoreData) -> Result<Option<Store>> {
        let mut tables = self.tables.write().await;

        if !tables.stores.contains_key(&id) {
            return Ok(None);
        }
        if tables.tax_id_taken(&data.tax_id, Some(id)) {
            return Err(RepositoryError::Conflict("stores_tax_id_key".to_string()));
        }

        let Some(store) = tables.stores.get_mut(&id) else {
            return Ok(None);
        };
        store.name = data.name.clone();
        store.tax_id = data.tax_id.clone();
        store.email = data.email.clone();
        store.phone = data.phone.clone();
        store.address = data.address.clone();
        store.active = data.active;
        store.updated_at = Some(Utc::now());

        Ok(Some(store.clone()))
    }

    async fn delete_store(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;

        if !tables.stores.contains_key(&id) {
            return Ok(false);
        }
        if tables.coupons.values().any(|c| c.scope.store_id() == Some(id)) {
            return Err(RepositoryError::InvalidReference(
                "coupons_store_id_fkey".to_string(),
            ));
        }

        tables.stores.remove(&id);
        for record in tables.usage.iter_mut().filter(|r| r.store_id == Some(id)) {
            record.store_id = None;
        }
        Ok(true)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
