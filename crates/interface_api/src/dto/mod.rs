//! Request and response bodies
//!
//! Successful calls answer with either `{ "data": ... }` or
//! `{ "success": true }`; failures use `ErrorResponse`.

pub mod installment;
pub mod invoice;
pub mod service;

use serde::{Deserialize, Serialize};

/// Successful result carrying a payload
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Successful result without a payload
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
