//! Billing domain errors

use thiserror::Error;

use core_kernel::{MoneyError, PortError};
use crate::invoice::InvoiceStatus;

/// Errors that can occur in the billing domain
///
/// Every mutating operation returns one of these instead of panicking.
/// `Storage` carries the full adapter error for server-side logging; callers
/// facing end users should show `public_message()` instead of `to_string()`.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Missing or invalid identifiers or required fields
    #[error("{0}")]
    Validation(String),

    /// A billing rule forbids the operation
    #[error("{0}")]
    BusinessRule(String),

    /// The invoice status change is not allowed
    #[error("Invalid invoice transition from {from} to {to}")]
    InvalidTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },

    /// The underlying persistence failed
    #[error("Storage error: {0}")]
    Storage(#[source] PortError),
}

impl BillingError {
    /// Creates a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        BillingError::Validation(message.into())
    }

    /// Creates a business rule error
    pub fn business_rule(message: impl Into<String>) -> Self {
        BillingError::BusinessRule(message.into())
    }

    /// Returns true for persistence failures
    pub fn is_storage(&self) -> bool {
        matches!(self, BillingError::Storage(_))
    }

    /// Message safe to show to the caller
    ///
    /// Storage failures collapse to a generic message; everything else is
    /// already phrased for the user.
    pub fn public_message(&self) -> String {
        match self {
            BillingError::Storage(_) => "A storage error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

/// Port errors for caller-supplied ids surface as validation failures
impl From<PortError> for BillingError {
    fn from(error: PortError) -> Self {
        match error {
            PortError::NotFound { entity_type, id } => {
                BillingError::Validation(format!("{} not found: {}", entity_type, id))
            }
            PortError::Validation { message, .. } => BillingError::Validation(message),
            other => BillingError::Storage(other),
        }
    }
}

impl From<MoneyError> for BillingError {
    fn from(error: MoneyError) -> Self {
        BillingError::Validation(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_validation() {
        let err: BillingError = PortError::not_found("Case", "CASE-1").into();
        assert!(matches!(err, BillingError::Validation(_)));
        assert!(err.to_string().contains("CASE-1"));
    }

    #[test]
    fn test_connection_maps_to_storage() {
        let err: BillingError = PortError::connection("pool timed out").into();
        assert!(err.is_storage());
        assert!(!err.public_message().contains("pool"));
    }

    #[test]
    fn test_business_rule_message_is_public() {
        let err = BillingError::business_rule("cannot delete down payment");
        assert_eq!(err.public_message(), "cannot delete down payment");
    }
}
