// Services module - Business logic

pub mod catalog;
pub mod redemption;
