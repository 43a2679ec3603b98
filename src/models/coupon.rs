use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, PgPool, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "discount_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountKind {
    Percentage,
    FixedAmount,
}

/// Where a coupon may be redeemed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponScope {
    Global,
    RestrictedTo(i64),
}

impl CouponScope {
    pub fn from_store_id(store_id: Option<i64>) -> Self {
        match store_id {
            Some(id) => CouponScope::RestrictedTo(id),
            None => CouponScope::Global,
        }
    }

    pub fn store_id(self) -> Option<i64> {
        match self {
            CouponScope::Global => None,
            CouponScope::RestrictedTo(id) => Some(id),
        }
    }

    /// Whether a redemption at `store_id` is allowed
    pub fn admits(self, store_id: i64) -> bool {
        match self {
            CouponScope::Global => true,
            CouponScope::RestrictedTo(owner) => owner == store_id,
        }
    }
}

/// Immutable snapshot of a coupon row
#[derive(Debug, Clone, PartialEq)]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    pub discount_kind: DiscountKind,
    pub discount_magnitude: Decimal,
    pub expiry: DateTime<Utc>,
    pub capacity: i32,
    pub used: i32,
    pub active: bool,
    pub rules: Option<String>,
    pub scope: CouponScope,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Coupon {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.capacity
    }

    pub fn view(&self) -> CouponView {
        CouponView::from(self)
    }
}

impl<'r> FromRow<'r, PgRow> for Coupon {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            discount_kind: row.try_get("discount_kind")?,
            discount_magnitude: row.try_get("discount_magnitude")?,
            expiry: row.try_get("expiry")?,
            capacity: row.try_get("capacity")?,
            used: row.try_get("used")?,
            active: row.try_get("active")?,
            rules: row.try_get("rules")?,
            scope: CouponScope::from_store_id(row.try_get("store_id")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Wire representation of a coupon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponView {
    pub id: i64,
    pub code: String,
    pub discount_kind: DiscountKind,
    pub discount_magnitude: Decimal,
    pub expiry: DateTime<Utc>,
    pub capacity: i32,
    pub used: i32,
    pub active: bool,
    pub rules: Option<String>,
    pub store_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Coupon> for CouponView {
    fn from(coupon: &Coupon) -> Self {
        Self {
            id: coupon.id,
            code: coupon.code.clone(),
            discount_kind: coupon.discount_kind,
            discount_magnitude: coupon.discount_magnitude,
            expiry: coupon.expiry,
            capacity: coupon.capacity,
            used: coupon.used,
            active: coupon.active,
            rules: coupon.rules.clone(),
            store_id: coupon.scope.store_id(),
            created_at: coupon.created_at,
            updated_at: coupon.updated_at,
        }
    }
}

/// Administrative fields of a coupon, used for both create and full update
#[derive(Debug, Clone, PartialEq)]
pub struct CouponData {
    pub code: String,
    pub discount_kind: DiscountKind,
    pub discount_magnitude: Decimal,
    pub expiry: DateTime<Utc>,
    pub capacity: i32,
    pub active: bool,
    pub rules: Option<String>,
    pub scope: CouponScope,
}

impl Coupon {
    /// Inserts a new coupon with `used = 0`
    pub async fn create(pool: &PgPool, data: &CouponData) -> Result<Self, sqlx::Error> {
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            INSERT INTO coupons (
                code, discount_kind, discount_magnitude, expiry,
                capacity, used, active, rules, store_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $8, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(&data.code)
        .bind(data.discount_kind)
        .bind(data.discount_magnitude)
        .bind(data.expiry)
        .bind(data.capacity)
        .bind(data.active)
        .bind(&data.rules)
        .bind(data.scope.store_id())
        .fetch_one(pool)
        .await?;

        Ok(coupon)
    }

    /// Finds a coupon by its internal ID
    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            SELECT * FROM coupons WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(coupon)
    }

    /// Finds a coupon by its unique code
    pub async fn find_by_code(pool: &PgPool, code: &str) -> Result<Option<Self>, sqlx::Error> {
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            SELECT * FROM coupons WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(pool)
        .await?;

        Ok(coupon)
    }

    /// Replaces the administrative fields of a coupon.
    ///
    /// `used` is never touched here; the `used <= capacity` check constraint
    /// rejects a capacity below the current usage.
    pub async fn update(
        pool: &PgPool,
        id: i64,
        data: &CouponData,
    ) -> Result<Option<Self>, sqlx::Error> {
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            UPDATE coupons
            SET
                code = $2,
                discount_kind = $3,
                discount_magnitude = $4,
                expiry = $5,
                capacity = $6,
                active = $7,
                rules = $8,
                store_id = $9,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&data.code)
        .bind(data.discount_kind)
        .bind(data.discount_magnitude)
        .bind(data.expiry)
        .bind(data.capacity)
        .bind(data.active)
        .bind(&data.rules)
        .bind(data.scope.store_id())
        .fetch_optional(pool)
        .await?;

        Ok(coupon)
    }

    /// Deletes a coupon and, by cascade, its usage history
    pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM coupons WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
