//! Installment ledger
//!
//! Owns the ordered installment schedule of every case. Each mutation is a
//! pure `InstallmentSchedule` edit executed by the store as one unit of
//! work, so recompaction and merges are all-or-nothing.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use core_kernel::{Amount, CaseId, InstallmentId};

use crate::error::BillingError;
use crate::installment::{Installment, InstallmentChanges, NewInstallment};
use crate::ports::{schedule_edit, InstallmentStore};

/// Installment operations for cases
#[derive(Clone)]
pub struct InstallmentLedger {
    store: Arc<dyn InstallmentStore>,
}

impl InstallmentLedger {
    pub fn new(store: Arc<dyn InstallmentStore>) -> Self {
        Self { store }
    }

    /// Creates the mandatory down payment of a freshly created case
    ///
    /// # Errors
    ///
    /// - `Validation` if the case does not exist
    /// - `BusinessRule` if the case already has a down payment
    #[instrument(skip_all, fields(case_id = %case_id))]
    pub async fn initialize(&self, case_id: CaseId) -> Result<Installment, BillingError> {
        let edited = self
            .store
            .edit_schedule(
                case_id,
                schedule_edit(|schedule| Ok(Some(schedule.insert_down_payment()?.id))),
            )
            .await
            .inspect_err(|e| warn!(error = %e, "Down payment not created"))?;

        let down_payment = edited.touched_installment()?;
        info!(installment_id = %down_payment.id, "Down payment created");
        Ok(down_payment)
    }

    /// Appends a regular installment at the end of the schedule
    #[instrument(skip_all, fields(case_id = %case_id, amount = %new.amount))]
    pub async fn add(&self, case_id: CaseId, new: NewInstallment) -> Result<Installment, BillingError> {
        let id = InstallmentId::new_v7();
        let edited = self
            .store
            .edit_schedule(
                case_id,
                schedule_edit(move |schedule| Ok(Some(schedule.append(id, new).id))),
            )
            .await?;

        let installment = edited.touched_installment()?;
        info!(installment_id = %id, position = installment.position, "Installment added");
        Ok(installment)
    }

    /// Replaces amount, due date and automatic-invoice flag
    #[instrument(skip_all, fields(installment_id = %id))]
    pub async fn update(
        &self,
        id: InstallmentId,
        changes: InstallmentChanges,
    ) -> Result<Installment, BillingError> {
        let current = self.store.get_installment(id).await?;
        let edited = self
            .store
            .edit_schedule(
                current.case_id,
                schedule_edit(move |schedule| Ok(Some(schedule.update(id, changes)?.id))),
            )
            .await?;

        info!("Installment updated");
        edited.touched_installment()
    }

    /// Deletes a regular installment and recompacts the remaining positions
    ///
    /// # Errors
    ///
    /// `BusinessRule("cannot delete down payment")` if `id` is the down payment
    #[instrument(skip_all, fields(installment_id = %id))]
    pub async fn delete(&self, id: InstallmentId) -> Result<(), BillingError> {
        let current = self.store.get_installment(id).await?;
        self.store
            .edit_schedule(
                current.case_id,
                schedule_edit(move |schedule| {
                    schedule.remove(id)?;
                    Ok(None)
                }),
            )
            .await
            .inspect_err(|e| warn!(error = %e, "Installment not deleted"))?;

        info!(case_id = %current.case_id, "Installment deleted");
        Ok(())
    }

    /// Folds an installment into the one before it
    ///
    /// # Returns
    ///
    /// The predecessor with its enlarged amount
    ///
    /// # Errors
    ///
    /// `BusinessRule("no installment to merge with")` if nothing sits at the
    /// previous position
    #[instrument(skip_all, fields(installment_id = %id))]
    pub async fn merge(&self, id: InstallmentId) -> Result<Installment, BillingError> {
        let current = self.store.get_installment(id).await?;
        let edited = self
            .store
            .edit_schedule(
                current.case_id,
                schedule_edit(move |schedule| Ok(Some(schedule.merge_into_predecessor(id)?))),
            )
            .await
            .inspect_err(|e| warn!(error = %e, "Installment not merged"))?;

        let predecessor = edited.touched_installment()?;
        info!(into = %predecessor.id, amount = %predecessor.amount, "Installment merged");
        Ok(predecessor)
    }

    /// Installments of a case ordered by position
    pub async fn list(&self, case_id: CaseId) -> Result<Vec<Installment>, BillingError> {
        let schedule = self.store.load_schedule(case_id).await?;
        Ok(schedule.into_installments())
    }

    pub async fn get(&self, id: InstallmentId) -> Result<Installment, BillingError> {
        Ok(self.store.get_installment(id).await?)
    }

    /// Sum of all installment amounts of a case
    pub async fn total(&self, case_id: CaseId) -> Result<Amount, BillingError> {
        Ok(self.store.load_schedule(case_id).await?.total())
    }
}
