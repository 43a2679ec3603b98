//! Storage contracts
//!
//! The redemption engine depends on [`CouponRepository`] only; administrative
//! endpoints additionally need [`CatalogRepository`]. Both are implemented by
//! the PostgreSQL store and by the in-memory store used in tests.

use async_trait::async_trait;

use crate::models::{Coupon, CouponData, NewUsageRecord, Store, StoreData, UsageRecord};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PgRepository;

#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Referenced row missing or still referenced: {0}")]
    InvalidReference(String),

    #[error("Check constraint violated: {0}")]
    Constraint(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let constraint = db.constraint().unwrap_or_default().to_string();
            if db.is_unique_violation() {
                return RepositoryError::Conflict(constraint);
            }
            if db.is_foreign_key_violation() {
                return RepositoryError::InvalidReference(constraint);
            }
            if db.is_check_violation() {
                return RepositoryError::Constraint(constraint);
            }
        }
        RepositoryError::Database(err)
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Reads and the single write path the redemption engine relies on
#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Coupon>>;

    async fn find_store_by_id(&self, id: i64) -> Result<Option<Store>>;

    /// Increments `used` and appends `record` as one unit.
    ///
    /// The increment only happens while the stored counter still equals
    /// `expected_used` and is below `capacity`. Returns `None` without writing
    /// anything when that guard fails.
    async fn commit_redemption(
        &self,
        coupon_id: i64,
        expected_used: i32,
        record: NewUsageRecord,
    ) -> Result<Option<UsageRecord>>;

    /// Usage history of a coupon, oldest first
    async fn usage_for_coupon(&self, coupon_id: i64) -> Result<Vec<UsageRecord>>;
}

/// Administrative writes for coupons and stores
#[async_trait]
pub trait CatalogRepository: CouponRepository {
    async fn insert_coupon(&self, data: &CouponData) -> Result<Coupon>;

    async fn update_coupon(&self, id: i64, data: &CouponData) -> Result<Option<Coupon>>;

    async fn delete_coupon(&self, id: i64) -> Result<bool>;

    async fn insert_store(&self, data: &StoreData) -> Result<Store>;

    async fn update_store(&self, id: i64, data: &StoreData) -> Result<Option<Store>>;

    async fn delete_store(&self, id: i64) -> Result<bool>;

    /// Cheap round trip used by the health check
    async fn ping(&self) -> Result<()>;
}
