//! Custom Test Assertions
//!
//! Provides assertion helpers for installment schedules that give more
//! meaningful error messages than standard assertions.

use rust_decimal::Decimal;

use core_kernel::Amount;
use domain_billing::Installment;

/// Asserts that positions are exactly `1..=N` in list order
///
/// # Panics
///
/// Panics with the observed positions if there is a gap, a duplicate or an
/// out-of-order row
pub fn assert_positions_contiguous(installments: &[Installment]) {
    let positions: Vec<u32> = installments.iter().map(|i| i.position).collect();
    let expected: Vec<u32> = (1..=installments.len() as u32).collect();
    assert_eq!(positions, expected, "Positions are not contiguous: {:?}", positions);
}

/// Asserts that exactly one installment is the down payment
pub fn assert_single_down_payment(installments: &[Installment]) {
    let count = installments.iter().filter(|i| i.is_down_payment).count();
    assert_eq!(count, 1, "Expected exactly one down payment, found {}", count);
}

/// Asserts both schedule invariants at once
pub fn assert_schedule_valid(installments: &[Installment]) {
    assert_single_down_payment(installments);
    assert_positions_contiguous(installments);
}

/// Asserts the amounts of a schedule in position order
pub fn assert_amounts(installments: &[Installment], expected: &[Decimal]) {
    let actual: Vec<Decimal> = installments.iter().map(|i| i.amount.value()).collect();
    assert_eq!(actual, expected, "Installment amounts differ");
}

/// Asserts that an amount equals a decimal value
pub fn assert_amount_eq(actual: Amount, expected: Decimal) {
    assert_eq!(
        actual.value(),
        expected,
        "Amount mismatch: actual={}, expected={}",
        actual,
        expected
    );
}

/// Sum of all installment amounts
pub fn schedule_total(installments: &[Installment]) -> Decimal {
    installments.iter().map(|i| i.amount.value()).sum()
}
