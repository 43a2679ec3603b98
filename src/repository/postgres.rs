use async_trait::async_trait;
use sqlx::PgPool;

use super::{CatalogRepository, CouponRepository, Result};
use crate::models::{Coupon, CouponData, NewUsageRecord, Store, StoreData, UsageRecord};

/// PostgreSQL-backed storage
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CouponRepository for PgRepository {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(Coupon::find_by_code(&self.pool, code).await?)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Coupon>> {
        Ok(Coupon::find_by_id(&self.pool, id).await?)
    }

    async fn find_store_by_id(&self, id: i64) -> Result<Option<Store>> {
        Ok(Store::find_by_id(&self.pool, id).await?)
    }

    async fn commit_redemption(
        &self,
        coupon_id: i64,
        expected_used: i32,
        record: NewUsageRecord,
    ) -> Result<Option<UsageRecord>> {
        let mut tx = self.pool.begin().await?;

        // Guarded increment: concurrent writers re-evaluate the WHERE clause
        // after the row lock is released, so only one of them can match.
        let result = sqlx::query(
            r#"
            UPDATE coupons
            SET used = used + 1, updated_at = $3
            WHERE id = $1 AND used = $2 AND used < capacity
            "#,
        )
        .bind(coupon_id)
        .bind(expected_used)
        .bind(record.used_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let inserted = UsageRecord::insert(&mut *tx, coupon_id, &record).await?;

        tx.commit().await?;

        Ok(Some(inserted))
    }

    async fn usage_for_coupon(&self, coupon_id: i64) -> Result<Vec<UsageRecord>> {
        Ok(UsageRecord::list_by_coupon(&self.pool, coupon_id).await?)
    }
}

#[async_trait]
impl CatalogRepository for PgRepository {
    async fn insert_coupon(&self, data: &CouponData) -> Result<Coupon> {
        Ok(Coupon::create(&self.pool, data).await?)
    }

    async fn update_coupon(&self, id: i64, data: &CouponData) -> Result<Option<Coupon>> {
        Ok(Coupon::update(&self.pool, id, data).await?)
    }

    async fn delete_coupon(&self, id: i64) -> Result<bool> {
        Ok(Coupon::delete(&self.pool, id).await?)
    }

    async fn insert_store(&self, data: &StoreData) -> Result<Store> {
        Ok(Store::create(&self.pool, data).await?)
    }

    async fn update_store(&self, id: i64, data: &StoreData) -> Result<Option<Store>> {
        Ok(Store::update(&self.pool, id, data).await?)
    }

    async fn delete_store(&self, id: i64) -> Result<bool> {
        Ok(Store::delete(&self.pool, id).await?)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
