use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};

/// Audit entry written once per successful redemption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UsageRecord {
    pub id: i64,
    pub coupon_id: i64,
    pub used_at: DateTime<Utc>,
    pub order_amount: Decimal,
    pub discount_amount: Decimal,
    pub store_id: Option<i64>, // nullable: store may be deleted later
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUsageRecord {
    pub used_at: DateTime<Utc>,
    pub order_amount: Decimal,
    pub discount_amount: Decimal,
    pub store_id: Option<i64>,
    pub note: Option<String>,
}

impl UsageRecord {
    /// Appends a usage record inside the caller's transaction
    pub async fn insert(
        conn: &mut PgConnection,
        coupon_id: i64,
        record: &NewUsageRecord,
    ) -> Result<Self, sqlx::Error> {
        let inserted = sqlx::query_as::<_, UsageRecord>(
            r#"
            INSERT INTO usage_records (coupon_id, used_at, order_amount, discount_amount, store_id, note)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(coupon_id)
        .bind(record.used_at)
        .bind(record.order_amount)
        .bind(record.discount_amount)
        .bind(record.store_id)
        .bind(&record.note)
        .fetch_one(conn)
        .await?;

        Ok(inserted)
    }

    /// Lists the usage history of a coupon, oldest first
    pub async fn list_by_coupon(pool: &PgPool, coupon_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        let records = sqlx::query_as::<_, UsageRecord>(
            r#"
            SELECT * FROM usage_records
            WHERE coupon_id = $1
            ORDER BY used_at ASC, id ASC
            "#,
        )
        .bind(coupon_id)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }
}
