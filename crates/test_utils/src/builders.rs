//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use core_kernel::{Amount, CaseId, InstallmentId};
use domain_billing::{Installment, NewInstallment, NewInvoice};

use crate::fixtures::AmountFixtures;

/// Builder for installment input
#[derive(Debug, Clone, Default)]
pub struct TestInstallmentBuilder {
    amount: Amount,
    due_date: Option<NaiveDate>,
    automatic_invoice: bool,
}

impl TestInstallmentBuilder {
    /// Creates a new builder for a zero-amount installment
    pub fn new() -> Self {
        Self::default()
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = AmountFixtures::of(amount);
        self
    }

    pub fn due_on(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn automatic(mut self) -> Self {
        self.automatic_invoice = true;
        self
    }

    pub fn build(self) -> NewInstallment {
        NewInstallment {
            amount: self.amount,
            due_date: self.due_date,
            automatic_invoice: self.automatic_invoice,
        }
    }
}

/// Builder for invoice input
#[derive(Debug, Clone)]
pub struct TestInvoiceBuilder {
    case_id: CaseId,
    installment_id: Option<InstallmentId>,
    invoice_name: String,
    amount: Amount,
    due_date: Option<NaiveDate>,
}

impl TestInvoiceBuilder {
    /// Creates a builder for a 100.00 invoice on `case_id`
    pub fn new(case_id: CaseId) -> Self {
        Self {
            case_id,
            installment_id: None,
            invoice_name: "Services - Down Payment".to_string(),
            amount: Amount::from_minor(10_000),
            due_date: None,
        }
    }

    /// Takes the installment id, amount and due date from `installment`
    pub fn for_installment(mut self, installment: &Installment) -> Self {
        self.installment_id = Some(installment.id);
        self.amount = installment.amount;
        self.due_date = installment.due_date;
        self
    }

    pub fn installment_id(mut self, id: InstallmentId) -> Self {
        self.installment_id = Some(id);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.invoice_name = name.into();
        self
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = AmountFixtures::of(amount);
        self
    }

    pub fn build(self) -> NewInvoice {
        NewInvoice {
            case_id: self.case_id,
            installment_id: self.installment_id,
            invoice_name: self.invoice_name,
            amount: self.amount,
            due_date: self.due_date,
        }
    }
}
