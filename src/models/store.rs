use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Store {
    pub id: i64,
    pub name: String,
    pub tax_id: String, // CNPJ, unique
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreData {
    pub name: String,
    pub tax_id: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub active: bool,
}

impl Store {
    /// Creates a new store
    pub async fn create(pool: &PgPool, data: &StoreData) -> Result<Self, sqlx::Error> {
        let store = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO stores (name, tax_id, email, phone, address, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(&data.name)
        .bind(&data.tax_id)
        .bind(&data.email)
        .bind(&data.phone)
        .bind(&data.address)
        .bind(data.active)
        .fetch_one(pool)
        .await?;

        Ok(store)
    }

    /// Finds a store by its internal ID
    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        let store = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM stores WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(store)
    }

    /// Replaces a store's fields
    pub async fn update(
        pool: &PgPool,
        id: i64,
        data: &StoreData,
    ) -> Result<Option<Self>, sqlx::Error> {
        let store = sqlx::query_as::<_, Self>(
            r#"
            UPDATE stores
            SET
                name = $2,
                tax_id = $3,
                email = $4,
                phone = $5,
                address = $6,
                active = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.tax_id)
        .bind(&data.email)
        .bind(&data.phone)
        .bind(&data.address)
        .bind(data.active)
        .fetch_optional(pool)
        .await?;

        Ok(store)
    }

    /// Deletes a store. Fails with a foreign key violation while coupons are scoped to it.
    pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM stores WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
