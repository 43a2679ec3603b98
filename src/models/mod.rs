// Models module - Database entity representations

pub mod coupon;
pub mod money;
pub mod store;
pub mod usage_record;

pub use coupon::{Coupon, CouponData, CouponScope, CouponView, DiscountKind};
pub use store::{Store, StoreData};
pub use usage_record::{NewUsageRecord, UsageRecord};
