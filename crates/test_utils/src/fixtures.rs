//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for the billing domain. These fixtures are
//! consistent and predictable; `random_service_name` is the only exception.

use std::sync::Arc;

use chrono::NaiveDate;
use fake::faker::company::en::Buzzword;
use fake::Fake;
use rust_decimal_macros::dec;

use core_kernel::{Amount, CaseId};
use domain_billing::ports::mock::InMemoryBillingStore;
use domain_billing::{BillingEngine, CatalogService, Installment, NewInstallment};

/// Fixture for amounts
pub struct AmountFixtures;

impl AmountFixtures {
    pub fn zero() -> Amount {
        Amount::ZERO
    }

    /// Gross price of the standard consultation service
    pub fn consultation_fee() -> Amount {
        Amount::from_minor(50_000)
    }

    /// Gross price of the standard filing service
    pub fn filing_fee() -> Amount {
        Amount::from_minor(30_000)
    }

    pub fn of(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).expect("fixture amounts are non-negative")
    }
}

/// Fixture for dates
pub struct DateFixtures;

impl DateFixtures {
    /// First due date used by schedules (Feb 1, 2025)
    pub fn first_due() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 1).expect("valid date")
    }

    /// Due date `months` months after `first_due`
    pub fn monthly(months: u32) -> NaiveDate {
        Self::first_due()
            .checked_add_months(chrono::Months::new(months))
            .expect("valid date")
    }
}

/// Fixture for service names
pub struct StringFixtures;

impl StringFixtures {
    pub fn consultation() -> &'static str {
        "Consultation"
    }

    pub fn filing() -> &'static str {
        "Filing"
    }

    /// A random, non-empty service name
    pub fn random_service_name() -> String {
        let word: String = Buzzword().fake();
        format!("{} Service", word)
    }
}

/// An in-memory engine with one registered, initialized case
pub struct MemoryCase {
    pub engine: BillingEngine,
    pub store: Arc<InMemoryBillingStore>,
    pub case_id: CaseId,
}

impl MemoryCase {
    /// Registers a case and inserts its down payment
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryBillingStore::new());
        let case_id = CaseId::new();
        store.register_case(case_id).await;

        let engine = BillingEngine::from_adapter(store.clone());
        engine
            .ledger
            .initialize(case_id)
            .await
            .expect("fresh case initializes");

        Self {
            engine,
            store,
            case_id,
        }
    }

    /// Builds `[dp(1, 100), i(2, 50), i(3, 25)]`
    pub async fn with_three_installments() -> Self {
        let case = Self::new().await;
        let down_payment = case.down_payment().await;
        case.engine
            .ledger
            .update(
                down_payment.id,
                domain_billing::InstallmentChanges {
                    amount: AmountFixtures::of(dec!(100)),
                    due_date: None,
                    automatic_invoice: false,
                },
            )
            .await
            .expect("down payment updates");
        case.add(dec!(50)).await;
        case.add(dec!(25)).await;
        case
    }

    /// Appends an installment with the given amount
    pub async fn add(&self, amount: rust_decimal::Decimal) -> Installment {
        self.engine
            .ledger
            .add(self.case_id, NewInstallment::with_amount(AmountFixtures::of(amount)))
            .await
            .expect("installment appends")
    }

    pub async fn down_payment(&self) -> Installment {
        self.engine
            .ledger
            .list(self.case_id)
            .await
            .expect("schedule loads")
            .into_iter()
            .find(|installment| installment.is_down_payment)
            .expect("case has a down payment")
    }

    /// Adds the consultation and filing services to the catalog
    pub async fn standard_services(&self) -> (CatalogService, CatalogService) {
        let consultation = self
            .store
            .add_service(StringFixtures::consultation(), AmountFixtures::consultation_fee())
            .await;
        let filing = self
            .store
            .add_service(StringFixtures::filing(), AmountFixtures::filing_fee())
            .await;
        (consultation, filing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fees() {
        assert_eq!(AmountFixtures::consultation_fee().value(), dec!(500));
        assert_eq!(AmountFixtures::filing_fee().value(), dec!(300));
    }

    #[test]
    fn test_monthly_dates() {
        assert_eq!(DateFixtures::monthly(2), NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());
    }

    #[test]
    fn test_random_service_name_is_not_blank() {
        assert!(!StringFixtures::random_service_name().trim().is_empty());
    }

    #[tokio::test]
    async fn test_three_installment_case() {
        let case = MemoryCase::with_three_installments().await;
        let rows = case.engine.ledger.list(case.case_id).await.unwrap();

        let amounts: Vec<_> = rows.iter().map(|row| row.amount.value()).collect();
        assert_eq!(amounts, vec![dec!(100), dec!(50), dec!(25)]);
    }
}
