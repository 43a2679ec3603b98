use axum::extract::FromRequest;

use crate::error::AppError;

/// `Json` body extractor whose rejections render as `invalid_input`
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);
