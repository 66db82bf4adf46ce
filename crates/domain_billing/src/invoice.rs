//! Invoices and their status lifecycle
//!
//! The status lifecycle is an explicit finite state machine. Every change is
//! checked against the transition table before anything is written:
//!
//! | from \ to  | sent | viewed | paid | overdue | cancelled |
//! |------------|------|--------|------|---------|-----------|
//! | draft      |  ✓   |        |  ✓   |         |     ✓     |
//! | sent       |      |   ✓    |  ✓   |    ✓    |     ✓     |
//! | viewed     |      |        |  ✓   |    ✓    |     ✓     |
//! | overdue    |      |   ✓    |  ✓   |         |     ✓     |
//!
//! `paid` and `cancelled` are terminal. Requesting the current status again
//! is rejected like any other missing transition.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{Amount, CaseId, InstallmentId, InvoiceId};
use crate::error::BillingError;

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    /// Created, not yet sent
    Draft,
    /// Sent to the client
    Sent,
    /// Opened by the client
    Viewed,
    /// Money collected
    Paid,
    /// Past due date without payment
    Overdue,
    /// Voided
    Cancelled,
}

impl InvoiceStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [InvoiceStatus; 6] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::Viewed,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Viewed => "viewed",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true for states no transition leaves
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    /// The transition table
    pub fn can_transition_to(&self, to: InvoiceStatus) -> bool {
        use InvoiceStatus::*;

        matches!(
            (*self, to),
            (Draft, Sent | Paid | Cancelled)
                | (Sent, Viewed | Paid | Overdue | Cancelled)
                | (Viewed, Paid | Overdue | Cancelled)
                | (Overdue, Viewed | Paid | Cancelled)
        )
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvoiceStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| BillingError::validation(format!("Unknown invoice status: {}", s)))
    }
}

/// Side effect an invoice change has on the installment ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceEffect {
    /// Nothing outside the invoice changes
    None,
    /// The referenced installment must be flagged paid in the same unit of work
    SettleInstallment(InstallmentId),
}

/// Data for creating an invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub case_id: CaseId,
    pub installment_id: Option<InstallmentId>,
    pub invoice_name: String,
    pub amount: Amount,
    pub due_date: Option<NaiveDate>,
}

/// A billing document raised against a case, usually for one installment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier
    pub id: InvoiceId,
    /// Billed case
    pub case_id: CaseId,
    /// Installment the invoice was raised against
    pub installment_id: Option<InstallmentId>,
    /// Display label
    pub invoice_name: String,
    /// Human-readable number, assigned when the invoice leaves draft
    pub invoice_number: Option<String>,
    /// Amount billed
    pub amount: Amount,
    /// Due date
    pub due_date: Option<NaiveDate>,
    /// Lifecycle status
    pub status: InvoiceStatus,
    /// When the invoice was sent
    pub sent_at: Option<DateTime<Utc>>,
    /// When the invoice was paid
    pub paid_at: Option<DateTime<Utc>>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Creates a draft invoice
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the name is blank
    pub fn new(new: NewInvoice) -> Result<Self, BillingError> {
        let invoice_name = new.invoice_name.trim().to_string();
        if invoice_name.is_empty() {
            return Err(BillingError::validation("Invoice name is required"));
        }

        let now = Utc::now();
        Ok(Self {
            id: InvoiceId::new_v7(),
            case_id: new.case_id,
            installment_id: new.installment_id,
            invoice_name,
            invoice_number: None,
            amount: new.amount,
            due_date: new.due_date,
            status: InvoiceStatus::Draft,
            sent_at: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Checks a transition without applying it
    pub fn ensure_transition(&self, to: InvoiceStatus) -> Result<(), BillingError> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(BillingError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }

    /// Moves the invoice to `to`, stamping the matching timestamp
    ///
    /// Entering `sent` records `sent_at` and takes `invoice_number` if none is
    /// assigned yet; entering `paid` records `paid_at` and asks for the linked
    /// installment to be settled.
    pub fn transition_to(
        &mut self,
        to: InvoiceStatus,
        invoice_number: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<InvoiceEffect, BillingError> {
        self.ensure_transition(to)?;

        self.status = to;
        self.updated_at = now;

        match to {
            InvoiceStatus::Sent => {
                self.sent_at = Some(now);
                if self.invoice_number.is_none() {
                    self.invoice_number = invoice_number;
                }
                Ok(InvoiceEffect::None)
            }
            InvoiceStatus::Paid => {
                self.paid_at = Some(now);
                Ok(self
                    .installment_id
                    .map_or(InvoiceEffect::None, InvoiceEffect::SettleInstallment))
            }
            _ => Ok(InvoiceEffect::None),
        }
    }

    /// Sends a draft invoice
    pub fn send(&mut self, invoice_number: Option<String>, now: DateTime<Utc>) -> Result<(), BillingError> {
        self.transition_to(InvoiceStatus::Sent, invoice_number, now)
            .map(|_| ())
    }

    /// Checks if the invoice is past due on `today`
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        match self.due_date {
            Some(due) => today > due && !self.status.is_terminal(),
            None => false,
        }
    }
}
