use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::ErrorKind;
use crate::models::{money, Coupon, DiscountKind, NewUsageRecord, Store, UsageRecord};
use crate::repository::{CouponRepository, RepositoryError};

const NOTE_MAX_LEN: usize = 500;

/// Infrastructure failures. Business rejections are returned as values, never as errors.
#[derive(thiserror::Error, Debug)]
pub enum RedemptionError {
    #[error("Storage error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Why a coupon cannot be applied to an order
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("{0}")]
    InvalidInput(String),

    #[error("coupon not found")]
    CouponNotFound,

    #[error("coupon inactive")]
    CouponInactive,

    #[error("coupon expired")]
    CouponExpired,

    #[error("coupon exhausted")]
    CouponExhausted,

    #[error("store not found")]
    StoreNotFound,

    #[error("store inactive")]
    StoreInactive,

    #[error("coupon not valid for this store")]
    StoreMismatch {
        coupon_store_id: i64,
        requested_store_id: i64,
    },
}

impl Rejection {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Rejection::InvalidInput(_) => ErrorKind::InvalidInput,
            Rejection::CouponNotFound | Rejection::StoreNotFound => ErrorKind::NotFound,
            Rejection::CouponInactive | Rejection::StoreInactive => ErrorKind::Inactive,
            Rejection::CouponExpired => ErrorKind::Expired,
            Rejection::CouponExhausted => ErrorKind::Exhausted,
            Rejection::StoreMismatch { .. } => ErrorKind::StoreMismatch,
        }
    }
}

/// Result of a read-only validation
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accepted { coupon: Coupon, discount: Decimal },
    Rejected(Rejection),
}

/// Result of a committed redemption
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Redeemed {
        coupon_id: i64,
        discount: Decimal,
        usage: UsageRecord,
    },
    Rejected(Rejection),
}

#[derive(Debug, Clone)]
pub struct RedeemRequest {
    pub coupon_id: i64,
    pub store_id: i64,
    pub order_amount: Decimal,
    pub note: Option<String>,
}

/// Discount granted by a coupon on an order.
///
/// Fixed amounts are returned as-is and are not capped at the order total.
pub fn compute_discount(kind: DiscountKind, magnitude: Decimal, order_amount: Decimal) -> Decimal {
    match kind {
        DiscountKind::Percentage => money::round(order_amount * magnitude / Decimal::ONE_HUNDRED),
        DiscountKind::FixedAmount => magnitude,
    }
}

/// Status checks shared by validation and redemption, in precedence order
pub fn check_coupon(coupon: &Coupon, now: DateTime<Utc>) -> Result<(), Rejection> {
    if !coupon.active {
        return Err(Rejection::CouponInactive);
    }
    if coupon.is_expired_at(now) {
        return Err(Rejection::CouponExpired);
    }
    if coupon.is_exhausted() {
        return Err(Rejection::CouponExhausted);
    }
    Ok(())
}

/// Scope check for validation: only enforced when the caller names a store
pub fn check_requested_store(coupon: &Coupon, store_id: Option<i64>) -> Result<(), Rejection> {
    match (coupon.scope.store_id(), store_id) {
        (Some(owner), Some(requested)) if owner != requested => Err(Rejection::StoreMismatch {
            coupon_store_id: owner,
            requested_store_id: requested,
        }),
        _ => Ok(()),
    }
}

/// Store checks for redemption: the store must exist, be active, and be admitted by the scope
pub fn check_redeeming_store(
    coupon: &Coupon,
    store: Option<&Store>,
    store_id: i64,
) -> Result<(), Rejection> {
    let store = store.ok_or(Rejection::StoreNotFound)?;
    if !store.active {
        return Err(Rejection::StoreInactive);
    }
    if !coupon.scope.admits(store_id) {
        return Err(Rejection::StoreMismatch {
            coupon_store_id: coupon.scope.store_id().unwrap_or_default(),
            requested_store_id: store_id,
        });
    }
    Ok(())
}

fn checked_order_amount(amount: Decimal) -> Result<Decimal, Rejection> {
    money::order_amount(amount).map_err(|e| Rejection::InvalidInput(format!("order_amount: {}", e)))
}

/// Validates and redeems coupons against a [`CouponRepository`]
pub struct RedemptionEngine {
    repository: Arc<dyn CouponRepository>,
}

impl RedemptionEngine {
    pub fn new(repository: Arc<dyn CouponRepository>) -> Self {
        Self { repository }
    }

    /// Checks whether a coupon code can be applied to an order. Never writes.
    #[tracing::instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        order_amount: Decimal,
        store_id: Option<i64>,
    ) -> Result<Decision, RedemptionError> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(Decision::Rejected(Rejection::InvalidInput(
                "coupon code is required".to_string(),
            )));
        }
        let order_amount = match checked_order_amount(order_amount) {
            Ok(amount) => amount,
            Err(rejection) => return Ok(Decision::Rejected(rejection)),
        };

        let Some(coupon) = self.repository.find_by_code(code).await? else {
            tracing::info!(kind = ?ErrorKind::NotFound, "Coupon validation rejected");
            return Ok(Decision::Rejected(Rejection::CouponNotFound));
        };

        let verdict = check_coupon(&coupon, Utc::now())
            .and_then(|()| check_requested_store(&coupon, store_id));
        if let Err(rejection) = verdict {
            tracing::info!(
                coupon_id = coupon.id,
                kind = ?rejection.kind(),
                "Coupon validation rejected"
            );
            return Ok(Decision::Rejected(rejection));
        }

        let discount = compute_discount(coupon.discount_kind, coupon.discount_magnitude, order_amount);

        tracing::info!(coupon_id = coupon.id, %discount, "Coupon valid");

        Ok(Decision::Accepted { coupon, discount })
    }

    /// Applies a coupon to an order at a store, consuming one unit of quota.
    ///
    /// The usage counter and the usage record are committed together through a
    /// compare-and-commit on the counter this call validated. When another
    /// redemption wins the race, the coupon is reloaded and every check runs
    /// again, so losing the last unit is reported as `CouponExhausted` and a
    /// coupon deactivated meanwhile as `CouponInactive`. While the fresh
    /// snapshot still passes, the commit is retried against it.
    #[tracing::instrument(
        skip(self, request),
        fields(coupon_id = request.coupon_id, store_id = request.store_id)
    )]
    pub async fn redeem(&self, request: RedeemRequest) -> Result<Outcome, RedemptionError> {
        let order_amount = match checked_order_amount(request.order_amount) {
            Ok(amount) => amount,
            Err(rejection) => return Ok(Outcome::Rejected(rejection)),
        };
        let note = request
            .note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if note.as_ref().is_some_and(|n| n.chars().count() > NOTE_MAX_LEN) {
            return Ok(Outcome::Rejected(Rejection::InvalidInput(format!(
                "note must be at most {} characters",
                NOTE_MAX_LEN
            ))));
        }

        let Some(mut coupon) = self.repository.find_by_id(request.coupon_id).await? else {
            tracing::info!(kind = ?ErrorKind::NotFound, "Redemption rejected");
            return Ok(Outcome::Rejected(Rejection::CouponNotFound));
        };

        // Coupon checks precede store checks, so skip the store lookup when they already fail
        if let Err(rejection) = check_coupon(&coupon, Utc::now()) {
            tracing::info!(kind = ?rejection.kind(), "Redemption rejected");
            return Ok(Outcome::Rejected(rejection));
        }
        let store = self.repository.find_store_by_id(request.store_id).await?;

        let mut lost_races: u32 = 0;
        loop {
            let now = Utc::now();
            let verdict = check_coupon(&coupon, now)
                .and_then(|()| check_redeeming_store(&coupon, store.as_ref(), request.store_id));
            if let Err(rejection) = verdict {
                if lost_races > 0 {
                    tracing::warn!(
                        lost_races,
                        kind = ?rejection.kind(),
                        "Redemption lost a concurrent race"
                    );
                } else {
                    tracing::info!(kind = ?rejection.kind(), "Redemption rejected");
                }
                return Ok(Outcome::Rejected(rejection));
            }

            let discount =
                compute_discount(coupon.discount_kind, coupon.discount_magnitude, order_amount);
            let record = NewUsageRecord {
                used_at: now,
                order_amount,
                discount_amount: discount,
                store_id: Some(request.store_id),
                note: note.clone(),
            };

            match self
                .repository
                .commit_redemption(coupon.id, coupon.used, record)
                .await
            {
                Ok(Some(usage)) => {
                    tracing::info!(
                        usage_id = usage.id,
                        %discount,
                        used = coupon.used + 1,
                        capacity = coupon.capacity,
                        "Coupon redeemed"
                    );
                    return Ok(Outcome::Redeemed {
                        coupon_id: coupon.id,
                        discount,
                        usage,
                    });
                }
                Ok(None) => {}
                // the guard held, so the missing row is the store
                Err(RepositoryError::InvalidReference(constraint)) => {
                    tracing::warn!(%constraint, "Store removed before commit");
                    return Ok(Outcome::Rejected(Rejection::StoreNotFound));
                }
                Err(e) => return Err(e.into()),
            }

            // a failed guard means another redemption committed in between
            lost_races += 1;
            tracing::debug!(lost_races, expected_used = coupon.used, "Commit guard failed");

            coupon = match self.repository.find_by_id(request.coupon_id).await? {
                Some(fresh) => fresh,
                None => return Ok(Outcome::Rejected(Rejection::CouponNotFound)),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CouponScope;
    use crate::repository::InMemoryRepository;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::task::JoinSet;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn coupon(id: i64, code: &str, kind: DiscountKind, magnitude: &str) -> Coupon {
        let now = Utc::now();
        Coupon {
            id,
            code: code.to_string(),
            discount_kind: kind,
            discount_magnitude: d(magnitude),
            expiry: now + Duration::days(30),
            capacity: 100,
            used: 0,
            active: true,
            rules: None,
            scope: CouponScope::Global,
            created_at: now - Duration::days(1),
            updated_at: None,
        }
    }

    fn store(id: i64, active: bool) -> Store {
        Store {
            id,
            name: format!("Loja {}", id),
            tax_id: format!("00.000.000/0001-{:02}", id),
            email: format!("loja{}@lojas.com", id),
            phone: None,
            address: None,
            active,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    async fn setup(coupons: Vec<Coupon>) -> (Arc<InMemoryRepository>, RedemptionEngine) {
        let repo = Arc::new(InMemoryRepository::new());
        repo.import_store(store(1, true)).await;
        repo.import_store(store(2, true)).await;
        repo.import_store(store(3, false)).await;
        for c in coupons {
            repo.import_coupon(c).await;
        }
        let engine = RedemptionEngine::new(repo.clone());
        (repo, engine)
    }

    fn redeem_request(coupon_id: i64, store_id: i64, amount: &str) -> RedeemRequest {
        RedeemRequest {
            coupon_id,
            store_id,
            order_amount: d(amount),
            note: None,
        }
    }

    fn rejection_of(decision: Decision) -> Rejection {
        match decision {
            Decision::Rejected(r) => r,
            Decision::Accepted { .. } => panic!("expected rejection"),
        }
    }

    fn outcome_rejection(outcome: Outcome) -> Rejection {
        match outcome {
            Outcome::Rejected(r) => r,
            Outcome::Redeemed { .. } => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_percentage_discount() {
        let discount = compute_discount(DiscountKind::Percentage, d("10"), d("200.00"));
        assert_eq!(discount.to_string(), "20.00");
    }

    #[test]
    fn test_percentage_discount_rounds_to_cents() {
        // 33.33 * 15% = 4.9995
        let discount = compute_discount(DiscountKind::Percentage, d("15"), d("33.33"));
        assert_eq!(discount, d("5.00"));
    }

    #[test]
    fn test_fixed_discount_ignores_order_amount() {
        for amount in ["0.00", "10.00", "5000.00"] {
            let discount = compute_discount(DiscountKind::FixedAmount, d("50.00"), d(amount));
            assert_eq!(discount, d("50.00"));
        }
    }

    #[test]
    fn test_check_order_inactive_before_expired() {
        let mut c = coupon(1, "OLD", DiscountKind::Percentage, "10");
        c.active = false;
        c.expiry = Utc::now() - Duration::days(1);
        c.used = c.capacity;
        assert_eq!(check_coupon(&c, Utc::now()), Err(Rejection::CouponInactive));

        c.active = true;
        assert_eq!(check_coupon(&c, Utc::now()), Err(Rejection::CouponExpired));
    }

    #[test]
    fn test_rejection_kinds() {
        assert_eq!(Rejection::StoreNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(Rejection::StoreInactive.kind(), ErrorKind::Inactive);
        assert_eq!(Rejection::CouponExhausted.to_string(), "coupon exhausted");
    }

    #[tokio::test]
    async fn test_validate_welcome_coupon_any_store() {
        let mut c = coupon(1, "BEMVINDO10", DiscountKind::Percentage, "10");
        c.used = 15;
        let (_, engine) = setup(vec![c]).await;

        for store_id in [None, Some(1), Some(2)] {
            match engine.validate("BEMVINDO10", d("200.00"), store_id).await.unwrap() {
                Decision::Accepted { coupon, discount } => {
                    assert_eq!(coupon.code, "BEMVINDO10");
                    assert_eq!(discount, d("20.00"));
                }
                Decision::Rejected(r) => panic!("unexpected rejection: {}", r),
            }
        }
    }

    #[tokio::test]
    async fn test_validate_store_mismatch() {
        let mut c = coupon(2, "NATAL2024", DiscountKind::FixedAmount, "50");
        c.scope = CouponScope::RestrictedTo(1);
        let (_, engine) = setup(vec![c]).await;

        let rejection =
            rejection_of(engine.validate("NATAL2024", d("300"), Some(2)).await.unwrap());
        assert_eq!(rejection.kind(), ErrorKind::StoreMismatch);

        // no store named: scoped coupon is still valid
        let decision = engine.validate("NATAL2024", d("300"), None).await.unwrap();
        assert!(matches!(decision, Decision::Accepted { .. }));
    }

    #[tokio::test]
    async fn test_exhausted_regardless_of_amount() {
        let mut c = coupon(3, "ESGOTADO", DiscountKind::Percentage, "10");
        c.capacity = 50;
        c.used = 50;
        let (repo, engine) = setup(vec![c]).await;

        for amount in ["0", "1.00", "99999.99"] {
            let rejection = rejection_of(engine.validate("ESGOTADO", d(amount), None).await.unwrap());
            assert_eq!(rejection, Rejection::CouponExhausted);

            let outcome = engine.redeem(redeem_request(3, 1, amount)).await.unwrap();
            assert_eq!(outcome_rejection(outcome), Rejection::CouponExhausted);
        }
        assert_eq!(repo.find_by_id(3).await.unwrap().unwrap().used, 50);
    }

    #[tokio::test]
    async fn test_expired_even_with_quota() {
        let mut c = coupon(4, "VENCIDO", DiscountKind::FixedAmount, "15");
        c.expiry = Utc::now() - Duration::minutes(1);
        let (_, engine) = setup(vec![c]).await;

        let rejection = rejection_of(engine.validate("VENCIDO", d("100"), None).await.unwrap());
        assert_eq!(rejection, Rejection::CouponExpired);

        let outcome = engine.redeem(redeem_request(4, 1, "100")).await.unwrap();
        assert_eq!(outcome_rejection(outcome), Rejection::CouponExpired);
    }

    #[tokio::test]
    async fn test_validate_unknown_code_and_bad_input() {
        let (_, engine) = setup(vec![]).await;

        let rejection = rejection_of(engine.validate("NOPE", d("10"), None).await.unwrap());
        assert_eq!(rejection, Rejection::CouponNotFound);

        let rejection = rejection_of(engine.validate("   ", d("10"), None).await.unwrap());
        assert_eq!(rejection.kind(), ErrorKind::InvalidInput);

        let rejection = rejection_of(engine.validate("NOPE", d("-1"), None).await.unwrap());
        assert_eq!(rejection.kind(), ErrorKind::InvalidInput);

        let rejection = rejection_of(engine.validate("NOPE", d("1.999"), None).await.unwrap());
        assert_eq!(rejection.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_validate_has_no_side_effects() {
        let (repo, engine) = setup(vec![coupon(5, "LEITURA", DiscountKind::Percentage, "5")]).await;

        engine.validate("LEITURA", d("80"), Some(1)).await.unwrap();

        assert_eq!(repo.find_by_id(5).await.unwrap().unwrap().used, 0);
        assert!(repo.usage_for_coupon(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fixed_discount_may_exceed_order() {
        let (_, engine) = setup(vec![coupon(6, "FIXO50", DiscountKind::FixedAmount, "50.00")]).await;

        match engine.redeem(redeem_request(6, 1, "10.00")).await.unwrap() {
            Outcome::Redeemed { discount, usage, .. } => {
                assert_eq!(discount, d("50.00"));
                assert_eq!(usage.order_amount, d("10.00"));
                assert_eq!(usage.discount_amount, d("50.00"));
            }
            Outcome::Rejected(r) => panic!("unexpected rejection: {}", r),
        }
    }

    #[tokio::test]
    async fn test_redeem_store_checks() {
        let mut scoped = coupon(7, "CENTRO", DiscountKind::Percentage, "10");
        scoped.scope = CouponScope::RestrictedTo(1);
        let (repo, engine) = setup(vec![scoped]).await;

        let outcome = engine.redeem(redeem_request(7, 99, "100")).await.unwrap();
        assert_eq!(outcome_rejection(outcome), Rejection::StoreNotFound);

        let outcome = engine.redeem(redeem_request(7, 3, "100")).await.unwrap();
        assert_eq!(outcome_rejection(outcome), Rejection::StoreInactive);

        let outcome = engine.redeem(redeem_request(7, 2, "100")).await.unwrap();
        assert_eq!(
            outcome_rejection(outcome),
            Rejection::StoreMismatch {
                coupon_store_id: 1,
                requested_store_id: 2
            }
        );

        let outcome = engine.redeem(redeem_request(99, 1, "100")).await.unwrap();
        assert_eq!(outcome_rejection(outcome), Rejection::CouponNotFound);

        assert_eq!(repo.find_by_id(7).await.unwrap().unwrap().used, 0);
        assert!(repo.usage_for_coupon(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redeem_rejects_bad_amount_without_writing() {
        let (repo, engine) = setup(vec![coupon(8, "BAD", DiscountKind::Percentage, "10")]).await;

        let outcome = engine.redeem(redeem_request(8, 1, "-5")).await.unwrap();
        assert_eq!(outcome_rejection(outcome).kind(), ErrorKind::InvalidInput);
        assert_eq!(repo.find_by_id(8).await.unwrap().unwrap().used, 0);
    }

    #[tokio::test]
    async fn test_sequential_redemptions_are_counted_exactly() {
        let mut c = coupon(9, "DEZ", DiscountKind::Percentage, "10");
        c.capacity = 10;
        let (repo, engine) = setup(vec![c]).await;

        let amounts = ["10.00", "20.00", "33.33", "45.50", "100.00"];
        for amount in amounts {
            let outcome = engine.redeem(redeem_request(9, 2, amount)).await.unwrap();
            assert!(matches!(outcome, Outcome::Redeemed { .. }));
        }

        let stored = repo.find_by_id(9).await.unwrap().unwrap();
        assert_eq!(stored.used, amounts.len() as i32);

        let history = repo.usage_for_coupon(9).await.unwrap();
        assert_eq!(history.len(), amounts.len());
        let timestamps: HashSet<_> = history.iter().map(|r| r.used_at).collect();
        assert_eq!(timestamps.len(), amounts.len());
        for (record, amount) in history.iter().zip(amounts) {
            assert_eq!(record.order_amount, d(amount));
            assert_eq!(
                record.discount_amount,
                compute_discount(DiscountKind::Percentage, d("10"), d(amount))
            );
            assert_eq!(record.store_id, Some(2));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redemptions_on_last_unit() {
        let mut c = coupon(10, "ULTIMO", DiscountKind::FixedAmount, "5");
        c.capacity = 20;
        c.used = 19;
        let (repo, engine) = setup(vec![c]).await;
        let engine = Arc::new(engine);

        let mut tasks = JoinSet::new();
        for _ in 0..16 {
            let engine = engine.clone();
            tasks.spawn(async move { engine.redeem(redeem_request(10, 1, "30.00")).await });
        }

        let mut successes = 0;
        let mut exhausted = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap().unwrap() {
                Outcome::Redeemed { .. } => successes += 1,
                Outcome::Rejected(Rejection::CouponExhausted) => exhausted += 1,
                Outcome::Rejected(other) => panic!("unexpected rejection: {}", other),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(exhausted, 15);
        let stored = repo.find_by_id(10).await.unwrap().unwrap();
        assert_eq!(stored.used, stored.capacity);
        assert_eq!(repo.usage_for_coupon(10).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redemptions_with_spare_quota_all_commit() {
        let mut c = coupon(11, "MUITOS", DiscountKind::Percentage, "10");
        c.capacity = 100_000;
        let (repo, engine) = setup(vec![c]).await;
        let engine = Arc::new(engine);

        for _ in 0..20 {
            let mut tasks = JoinSet::new();
            for _ in 0..64 {
                let engine = engine.clone();
                tasks.spawn(async move { engine.redeem(redeem_request(11, 1, "50.00")).await });
            }
            while let Some(result) = tasks.join_next().await {
                match result.unwrap().unwrap() {
                    Outcome::Redeemed { discount, .. } => assert_eq!(discount, d("5.00")),
                    Outcome::Rejected(r) => panic!("unexpected rejection: {}", r),
                }
            }
        }

        assert_eq!(repo.find_by_id(11).await.unwrap().unwrap().used, 20 * 64);
        assert_eq!(repo.usage_for_coupon(11).await.unwrap().len(), 20 * 64);
    }

    /// Storage where another writer commits and then edits the coupon just
    /// before the first guarded commit lands
    struct EditedDuringCommit {
        inner: InMemoryRepository,
        edit: fn(&mut Coupon),
        raced: AtomicBool,
    }

    impl EditedDuringCommit {
        fn new(inner: InMemoryRepository, edit: fn(&mut Coupon)) -> Self {
            Self {
                inner,
                edit,
                raced: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl CouponRepository for EditedDuringCommit {
        async fn find_by_code(&self, code: &str) -> crate::repository::Result<Option<Coupon>> {
            self.inner.find_by_code(code).await
        }

        async fn find_by_id(&self, id: i64) -> crate::repository::Result<Option<Coupon>> {
            self.inner.find_by_id(id).await
        }

        async fn find_store_by_id(&self, id: i64) -> crate::repository::Result<Option<Store>> {
            self.inner.find_store_by_id(id).await
        }

        async fn commit_redemption(
            &self,
            coupon_id: i64,
            expected_used: i32,
            record: NewUsageRecord,
        ) -> crate::repository::Result<Option<UsageRecord>> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                if let Some(mut coupon) = self.inner.find_by_id(coupon_id).await? {
                    coupon.used += 1;
                    (self.edit)(&mut coupon);
                    self.inner.import_coupon(coupon).await;
                }
            }
            self.inner
                .commit_redemption(coupon_id, expected_used, record)
                .await
        }

        async fn usage_for_coupon(
            &self,
            coupon_id: i64,
        ) -> crate::repository::Result<Vec<UsageRecord>> {
            self.inner.usage_for_coupon(coupon_id).await
        }
    }

    async fn redeem_with_edit_during_commit(
        edit: fn(&mut Coupon),
    ) -> (Outcome, Arc<EditedDuringCommit>) {
        let inner = InMemoryRepository::new();
        inner.import_store(store(1, true)).await;
        inner
            .import_coupon(coupon(12, "DISPUTADO", DiscountKind::Percentage, "10"))
            .await;
        let repo = Arc::new(EditedDuringCommit::new(inner, edit));
        let engine = RedemptionEngine::new(repo.clone());

        let outcome = engine.redeem(redeem_request(12, 1, "10")).await.unwrap();
        (outcome, repo)
    }

    #[tokio::test]
    async fn test_lost_race_reports_deactivation() {
        let (outcome, repo) = redeem_with_edit_during_commit(|c| c.active = false).await;

        assert_eq!(outcome_rejection(outcome), Rejection::CouponInactive);
        let stored = repo.find_by_id(12).await.unwrap().unwrap();
        assert_eq!(stored.used, 1);
        assert!(repo.usage_for_coupon(12).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lost_race_reports_expiry() {
        let (outcome, _) =
            redeem_with_edit_during_commit(|c| c.expiry = Utc::now() - Duration::seconds(1)).await;

        assert_eq!(outcome_rejection(outcome), Rejection::CouponExpired);
    }

    #[tokio::test]
    async fn test_lost_race_with_quota_left_retries() {
        let (outcome, repo) = redeem_with_edit_during_commit(|_| {}).await;

        match outcome {
            Outcome::Redeemed { usage, .. } => assert_eq!(usage.coupon_id, 12),
            Outcome::Rejected(r) => panic!("unexpected rejection: {}", r),
        }
        assert_eq!(repo.find_by_id(12).await.unwrap().unwrap().used, 2);
    }

    /// Storage whose store lookup still sees a store that is already gone
    struct StaleStoreLookup(InMemoryRepository);

    #[async_trait]
    impl CouponRepository for StaleStoreLookup {
        async fn find_by_code(&self, code: &str) -> crate::repository::Result<Option<Coupon>> {
            self.0.find_by_code(code).await
        }

        async fn find_by_id(&self, id: i64) -> crate::repository::Result<Option<Coupon>> {
            self.0.find_by_id(id).await
        }

        async fn find_store_by_id(&self, id: i64) -> crate::repository::Result<Option<Store>> {
            Ok(Some(store(id, true)))
        }

        async fn commit_redemption(
            &self,
            coupon_id: i64,
            expected_used: i32,
            record: NewUsageRecord,
        ) -> crate::repository::Result<Option<UsageRecord>> {
            self.0.commit_redemption(coupon_id, expected_used, record).await
        }

        async fn usage_for_coupon(
            &self,
            coupon_id: i64,
        ) -> crate::repository::Result<Vec<UsageRecord>> {
            self.0.usage_for_coupon(coupon_id).await
        }
    }

    #[tokio::test]
    async fn test_store_removed_before_commit_is_not_found() {
        let inner = InMemoryRepository::new();
        inner
            .import_coupon(coupon(13, "SEMLOJA", DiscountKind::FixedAmount, "5"))
            .await;
        let repo = Arc::new(StaleStoreLookup(inner));
        let engine = RedemptionEngine::new(repo.clone());

        let outcome = engine.redeem(redeem_request(13, 7, "20")).await.unwrap();

        assert_eq!(outcome_rejection(outcome), Rejection::StoreNotFound);
        assert_eq!(repo.find_by_id(13).await.unwrap().unwrap().used, 0);
    }
}
