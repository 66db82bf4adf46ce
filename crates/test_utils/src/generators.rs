//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::Amount;
use domain_billing::{InvoiceStatus, NewInstallment};

/// Strategy for amounts from 0.00 to 100,000.00 in cents
pub fn amount_strategy() -> impl Strategy<Value = Amount> {
    (0u64..10_000_000u64).prop_map(Amount::from_minor)
}

/// Strategy for strictly positive amounts
pub fn positive_amount_strategy() -> impl Strategy<Value = Amount> {
    (1u64..10_000_000u64).prop_map(Amount::from_minor)
}

/// Strategy for negative decimals, which every amount input must reject
pub fn negative_decimal_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000_000i64, 0u32..4u32).prop_map(|(m, s)| -Decimal::new(m, s))
}

/// Strategy for due dates within 2024..=2027
pub fn due_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (2024i32..=2027i32, 1u32..=12u32, 1u32..=28u32)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).expect("day 1-28 exists in every month"))
}

/// Strategy for installment input
pub fn new_installment_strategy() -> impl Strategy<Value = NewInstallment> {
    (amount_strategy(), proptest::option::of(due_date_strategy()), any::<bool>()).prop_map(
        |(amount, due_date, automatic_invoice)| NewInstallment {
            amount,
            due_date,
            automatic_invoice,
        },
    )
}

/// Strategy for service gross prices
pub fn service_prices_strategy(max: usize) -> impl Strategy<Value = Vec<Amount>> {
    prop::collection::vec(amount_strategy(), 1..=max)
}

/// Strategy for any invoice status
pub fn invoice_status_strategy() -> impl Strategy<Value = InvoiceStatus> {
    prop::sample::select(InvoiceStatus::ALL.to_vec())
}
