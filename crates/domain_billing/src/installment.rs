//! Installments and the per-case installment schedule
//!
//! An `InstallmentSchedule` is the in-memory arena for one case: it holds
//! every installment of the case ordered by position and performs all edits
//! (append, delete with recompaction, merge, down-payment adjustments) as
//! pure operations. Adapters load a schedule, apply an edit and write the
//! result back as one unit of work, so positions are never reassigned row by
//! row outside a transaction.
//!
//! # Invariants
//!
//! - Exactly one installment per case is the down payment, and it cannot be
//!   deleted
//! - Positions are the contiguous range `1..=N` in schedule order

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Amount, CaseId, InstallmentId};
use crate::error::BillingError;

/// A scheduled partial payment belonging to one case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    /// Unique identifier
    pub id: InstallmentId,
    /// Owning case
    pub case_id: CaseId,
    /// Amount due
    pub amount: Amount,
    /// Optional due date
    pub due_date: Option<NaiveDate>,
    /// 1-based position within the case
    pub position: u32,
    /// Whether this is the case's down payment
    pub is_down_payment: bool,
    /// Intent for future automated invoicing
    pub automatic_invoice: bool,
    /// Set when an invoice raised against it is paid
    pub paid: bool,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Installment {
    /// Creates the down payment for a case: amount 0 at position 1
    pub fn down_payment(case_id: CaseId) -> Self {
        let now = Utc::now();
        Self {
            id: InstallmentId::new_v7(),
            case_id,
            amount: Amount::ZERO,
            due_date: None,
            position: 1,
            is_down_payment: true,
            automatic_invoice: false,
            paid: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a regular installment at the given position
    pub fn regular(id: InstallmentId, case_id: CaseId, position: u32, new: NewInstallment) -> Self {
        let now = Utc::now();
        Self {
            id,
            case_id,
            amount: new.amount,
            due_date: new.due_date,
            position,
            is_down_payment: false,
            automatic_invoice: new.automatic_invoice,
            paid: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Data for appending a regular installment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewInstallment {
    pub amount: Amount,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub automatic_invoice: bool,
}

impl NewInstallment {
    /// An installment with only an amount
    pub fn with_amount(amount: Amount) -> Self {
        Self {
            amount,
            ..Default::default()
        }
    }

    /// Sets the due date
    pub fn due_on(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    /// Marks the installment for automatic invoicing
    pub fn automatic(mut self) -> Self {
        self.automatic_invoice = true;
        self
    }
}

/// Replacement values for the user-editable fields of an installment
///
/// Position and the down-payment flag are never editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentChanges {
    pub amount: Amount,
    pub due_date: Option<NaiveDate>,
    pub automatic_invoice: bool,
}

/// All installments of one case, ordered by position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallmentSchedule {
    case_id: CaseId,
    installments: Vec<Installment>,
}

impl InstallmentSchedule {
    /// Creates an empty schedule for a case
    pub fn empty(case_id: CaseId) -> Self {
        Self {
            case_id,
            installments: Vec::new(),
        }
    }

    /// Builds a schedule from stored rows, ordering them by position
    ///
    /// Rows are taken as stored; positions are not recompacted here.
    pub fn from_rows(case_id: CaseId, mut rows: Vec<Installment>) -> Self {
        rows.sort_by_key(|i| i.position);
        Self {
            case_id,
            installments: rows,
        }
    }

    pub fn case_id(&self) -> CaseId {
        self.case_id
    }

    /// Installments in position order
    pub fn installments(&self) -> &[Installment] {
        &self.installments
    }

    pub fn into_installments(self) -> Vec<Installment> {
        self.installments
    }

    pub fn len(&self) -> usize {
        self.installments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installments.is_empty()
    }

    /// Finds an installment by ID
    pub fn get(&self, id: InstallmentId) -> Option<&Installment> {
        self.installments.iter().find(|i| i.id == id)
    }

    fn get_mut(&mut self, id: InstallmentId) -> Option<&mut Installment> {
        self.installments.iter_mut().find(|i| i.id == id)
    }

    /// Returns the down payment, if the case has one
    pub fn down_payment(&self) -> Option<&Installment> {
        self.installments.iter().find(|i| i.is_down_payment)
    }

    /// Sum of all installment amounts
    pub fn total(&self) -> Amount {
        self.installments.iter().map(|i| i.amount).sum()
    }

    /// Position the next appended installment receives
    pub fn next_position(&self) -> u32 {
        self.installments
            .iter()
            .map(|i| i.position)
            .max()
            .map_or(1, |max| max + 1)
    }

    /// 1-based index of the installment among the case's installments
    pub fn ordinal_of(&self, id: InstallmentId) -> Option<usize> {
        self.installments
            .iter()
            .position(|i| i.id == id)
            .map(|index| index + 1)
    }

    /// Inserts the mandatory down payment at position 1
    ///
    /// # Errors
    ///
    /// Returns `BusinessRule` if the case already has a down payment
    pub fn insert_down_payment(&mut self) -> Result<&Installment, BillingError> {
        if self.down_payment().is_some() {
            return Err(BillingError::business_rule("case already has a down payment"));
        }

        self.installments.insert(0, Installment::down_payment(self.case_id));
        self.recompact();
        Ok(&self.installments[0])
    }

    /// Appends a regular installment after the current last position
    pub fn append(&mut self, id: InstallmentId, new: NewInstallment) -> &Installment {
        let position = self.next_position();
        self.installments
            .push(Installment::regular(id, self.case_id, position, new));
        &self.installments[self.installments.len() - 1]
    }

    /// Replaces amount, due date and automatic-invoice flag in place
    pub fn update(
        &mut self,
        id: InstallmentId,
        changes: InstallmentChanges,
    ) -> Result<&Installment, BillingError> {
        let case_id = self.case_id;
        let installment = self
            .get_mut(id)
            .ok_or_else(|| not_in_case(id, case_id))?;

        installment.amount = changes.amount;
        installment.due_date = changes.due_date;
        installment.automatic_invoice = changes.automatic_invoice;
        installment.updated_at = Utc::now();
        Ok(installment)
    }

    /// Removes a regular installment and recompacts positions
    ///
    /// # Errors
    ///
    /// - `Validation` if the installment is not part of this case
    /// - `BusinessRule` if it is the down payment; nothing is changed
    pub fn remove(&mut self, id: InstallmentId) -> Result<Installment, BillingError> {
        let index = self
            .installments
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| not_in_case(id, self.case_id))?;

        if self.installments[index].is_down_payment {
            return Err(BillingError::business_rule("cannot delete down payment"));
        }

        let removed = self.installments.remove(index);
        self.recompact();
        Ok(removed)
    }

    /// Folds an installment's amount into its predecessor and removes it
    ///
    /// The predecessor is the installment at `position - 1`. The total over
    /// the schedule is unchanged and the count drops by one.
    ///
    /// # Returns
    ///
    /// The ID of the predecessor that absorbed the amount
    pub fn merge_into_predecessor(&mut self, id: InstallmentId) -> Result<InstallmentId, BillingError> {
        let current = self
            .get(id)
            .ok_or_else(|| not_in_case(id, self.case_id))?;
        let (position, amount) = (current.position, current.amount);

        let predecessor_id = self
            .installments
            .iter()
            .find(|i| position > 1 && i.position == position - 1)
            .map(|i| i.id)
            .ok_or_else(|| BillingError::business_rule("no installment to merge with"))?;

        // Rejected before any amount moves so a failed merge leaves no trace
        if current.is_down_payment {
            return Err(BillingError::business_rule("cannot delete down payment"));
        }

        if let Some(predecessor) = self.get_mut(predecessor_id) {
            predecessor.amount = predecessor.amount.checked_add(amount)?;
            predecessor.updated_at = Utc::now();
        }
        self.remove(id)?;
        Ok(predecessor_id)
    }

    /// Raises the down payment by `price`
    pub fn increase_down_payment(&mut self, price: Amount) -> Result<Amount, BillingError> {
        let down_payment = self.down_payment_mut()?;
        down_payment.amount = down_payment.amount.checked_add(price)?;
        down_payment.updated_at = Utc::now();
        Ok(down_payment.amount)
    }

    /// Lowers the down payment by `price`, never below zero
    pub fn decrease_down_payment(&mut self, price: Amount) -> Result<Amount, BillingError> {
        let down_payment = self.down_payment_mut()?;
        down_payment.amount = down_payment.amount.saturating_sub(price);
        down_payment.updated_at = Utc::now();
        Ok(down_payment.amount)
    }

    /// Sets the paid flag on an installment
    pub fn mark_paid(&mut self, id: InstallmentId) -> Result<(), BillingError> {
        let case_id = self.case_id;
        let installment = self
            .get_mut(id)
            .ok_or_else(|| not_in_case(id, case_id))?;
        installment.paid = true;
        installment.updated_at = Utc::now();
        Ok(())
    }

    /// Reassigns positions `1..=N` keeping the current relative order
    pub fn recompact(&mut self) {
        self.installments.sort_by_key(|i| i.position);
        for (index, installment) in self.installments.iter_mut().enumerate() {
            let target = index as u32 + 1;
            if installment.position != target {
                installment.position = target;
                installment.updated_at = Utc::now();
            }
        }
    }

    /// Checks both schedule invariants
    ///
    /// Returns a description of the first violation found.
    pub fn verify(&self) -> Result<(), String> {
        let down_payments = self.installments.iter().filter(|i| i.is_down_payment).count();
        if down_payments != 1 {
            return Err(format!("expected exactly one down payment, found {}", down_payments));
        }

        for (index, installment) in self.installments.iter().enumerate() {
            if installment.position as usize != index + 1 {
                return Err(format!(
                    "installment {} has position {}, expected {}",
                    installment.id,
                    installment.position,
                    index + 1
                ));
            }
        }
        Ok(())
    }

    fn down_payment_mut(&mut self) -> Result<&mut Installment, BillingError> {
        let case_id = self.case_id;
        self.installments
            .iter_mut()
            .find(|i| i.is_down_payment)
            .ok_or_else(|| {
                BillingError::business_rule(format!("case {} has no down payment", case_id))
            })
    }
}

fn not_in_case(id: InstallmentId, case_id: CaseId) -> BillingError {
    BillingError::validation(format!("Installment {} not found in case {}", id, case_id))
}
