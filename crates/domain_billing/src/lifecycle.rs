//! Invoice lifecycle
//!
//! Creation, sending and status changes of invoices. Every status change is
//! checked against `InvoiceStatus::can_transition_to` before anything is
//! written, and is checked again inside the store's unit of work so a
//! concurrent change cannot slip an illegal transition through.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use core_kernel::{CaseId, InvoiceId};

use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceStatus, NewInvoice};
use crate::ports::{invoice_edit, InvoiceStore};

/// Invoice operations
#[derive(Clone)]
pub struct InvoiceLifecycle {
    invoices: Arc<dyn InvoiceStore>,
}

impl InvoiceLifecycle {
    pub fn new(invoices: Arc<dyn InvoiceStore>) -> Self {
        Self { invoices }
    }

    /// Creates a draft invoice
    ///
    /// # Errors
    ///
    /// `Validation` if the case or installment does not exist, or the name
    /// is blank
    #[instrument(skip_all, fields(case_id = %new.case_id, amount = %new.amount))]
    pub async fn create(&self, new: NewInvoice) -> Result<Invoice, BillingError> {
        let invoice = self.invoices.insert_invoice(Invoice::new(new)?).await?;

        info!(invoice_id = %invoice.id, "Invoice created");
        Ok(invoice)
    }

    /// Creates an invoice and sends it with a single write
    ///
    /// No draft is ever persisted, so a failure leaves nothing behind. The
    /// store numbers the invoice as part of the insert.
    #[instrument(skip_all, fields(case_id = %new.case_id, amount = %new.amount))]
    pub async fn create_and_send(&self, new: NewInvoice) -> Result<Invoice, BillingError> {
        let mut invoice = Invoice::new(new)?;
        invoice.send(None, Utc::now())?;
        let invoice = self.invoices.insert_invoice(invoice).await?;

        info!(
            invoice_id = %invoice.id,
            invoice_number = invoice.invoice_number.as_deref().unwrap_or_default(),
            "Invoice created and sent"
        );
        Ok(invoice)
    }

    /// Sends a draft invoice
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless the invoice is a draft
    #[instrument(skip_all, fields(invoice_id = %id))]
    pub async fn send(&self, id: InvoiceId) -> Result<Invoice, BillingError> {
        self.change_status(id, InvoiceStatus::Sent).await
    }

    /// Moves an invoice to `status`
    ///
    /// Entering `paid` also flags the linked installment paid in the same
    /// unit of work.
    #[instrument(skip_all, fields(invoice_id = %id, to = %status))]
    pub async fn update_status(&self, id: InvoiceId, status: InvoiceStatus) -> Result<Invoice, BillingError> {
        self.change_status(id, status).await
    }

    async fn change_status(&self, id: InvoiceId, to: InvoiceStatus) -> Result<Invoice, BillingError> {
        let current = self.invoices.get_invoice(id).await?;
        current
            .ensure_transition(to)
            .inspect_err(|e| warn!(error = %e, "Invoice transition rejected"))?;

        // The store numbers the invoice under its lock, after this edit passes
        let updated = self
            .invoices
            .edit_invoice(
                id,
                invoice_edit(move |invoice| invoice.transition_to(to, None, Utc::now())),
            )
            .await
            .inspect_err(|e| warn!(error = %e, "Invoice transition failed"))?;

        info!(from = %current.status, to = %updated.status, "Invoice status changed");
        Ok(updated)
    }

    /// Hard-deletes an invoice
    ///
    /// An installment already flagged paid through this invoice stays paid.
    #[instrument(skip_all, fields(invoice_id = %id))]
    pub async fn delete(&self, id: InvoiceId) -> Result<(), BillingError> {
        self.invoices.delete_invoice(id).await?;
        info!("Invoice deleted");
        Ok(())
    }

    /// Invoices of a case, newest first
    pub async fn list_for_case(&self, case_id: CaseId) -> Result<Vec<Invoice>, BillingError> {
        Ok(self.invoices.list_invoices(case_id).await?)
    }

    pub async fn get(&self, id: InvoiceId) -> Result<Invoice, BillingError> {
        Ok(self.invoices.get_invoice(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installment::NewInstallment;
    use crate::ledger::InstallmentLedger;
    use crate::ports::mock::InMemoryBillingStore;
    use core_kernel::{Amount, InstallmentId};
    use rust_decimal_macros::dec;

    struct Fixture {
        lifecycle: InvoiceLifecycle,
        ledger: InstallmentLedger,
        case_id: CaseId,
        installment_id: InstallmentId,
    }

    async fn setup() -> Fixture {
        let store = Arc::new(InMemoryBillingStore::new());
        let case_id = CaseId::new();
        store.register_case(case_id).await;

        let ledger = InstallmentLedger::new(store.clone());
        ledger.initialize(case_id).await.unwrap();
        let installment = ledger
            .add(case_id, NewInstallment::with_amount(Amount::new(dec!(100)).unwrap()))
            .await
            .unwrap();

        Fixture {
            lifecycle: InvoiceLifecycle::new(store),
            ledger,
            case_id,
            installment_id: installment.id,
        }
    }

    fn new_invoice(fx: &Fixture) -> NewInvoice {
        NewInvoice {
            case_id: fx.case_id,
            installment_id: Some(fx.installment_id),
            invoice_name: "Consultation - Installment 2".to_string(),
            amount: Amount::new(dec!(100)).unwrap(),
            due_date: None,
        }
    }

    #[tokio::test]
    async fn test_create_send_pay_scenario() {
        let fx = setup().await;
        let invoice = fx.lifecycle.create(new_invoice(&fx)).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert!(invoice.invoice_number.is_none());

        let sent = fx.lifecycle.send(invoice.id).await.unwrap();
        assert_eq!(sent.status, InvoiceStatus::Sent);
        assert!(sent.sent_at.is_some());
        assert_eq!(sent.invoice_number.as_deref(), Some("INV0000001"));

        let paid = fx.lifecycle.update_status(invoice.id, InvoiceStatus::Paid).await.unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert!(paid.paid_at.is_some());

        let installment = fx.ledger.get(fx.installment_id).await.unwrap();
        assert!(installment.paid);
    }

    #[tokio::test]
    async fn test_send_twice_rejected() {
        let fx = setup().await;
        let invoice = fx.lifecycle.create(new_invoice(&fx)).await.unwrap();
        fx.lifecycle.send(invoice.id).await.unwrap();

        let result = fx.lifecycle.send(invoice.id).await;
        assert!(matches!(
            result,
            Err(BillingError::InvalidTransition { from: InvoiceStatus::Sent, to: InvoiceStatus::Sent })
        ));
    }

    #[tokio::test]
    async fn test_rejected_transition_does_not_draw_number() {
        let fx = setup().await;
        let invoice = fx.lifecycle.create(new_invoice(&fx)).await.unwrap();
        fx.lifecycle.update_status(invoice.id, InvoiceStatus::Cancelled).await.unwrap();
        assert!(fx.lifecycle.send(invoice.id).await.is_err());

        let other = fx.lifecycle.create(new_invoice(&fx)).await.unwrap();
        let sent = fx.lifecycle.send(other.id).await.unwrap();
        assert_eq!(sent.invoice_number.as_deref(), Some("INV0000001"));
    }

    #[tokio::test]
    async fn test_concurrent_sends_consume_one_number() {
        let fx = setup().await;
        let id = fx.lifecycle.create(new_invoice(&fx)).await.unwrap().id;

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let lifecycle = fx.lifecycle.clone();
                tokio::spawn(async move { lifecycle.send(id).await })
            })
            .collect();
        let mut sent = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(invoice) => {
                    assert_eq!(invoice.invoice_number.as_deref(), Some("INV0000001"));
                    sent += 1;
                }
                Err(e) => assert!(matches!(e, BillingError::InvalidTransition { .. })),
            }
        }
        assert_eq!(sent, 1);

        let next = fx.lifecycle.create(new_invoice(&fx)).await.unwrap();
        let next = fx.lifecycle.send(next.id).await.unwrap();
        assert_eq!(next.invoice_number.as_deref(), Some("INV0000002"));
    }

    #[tokio::test]
    async fn test_paid_is_terminal() {
        let fx = setup().await;
        let invoice = fx.lifecycle.create(new_invoice(&fx)).await.unwrap();
        fx.lifecycle.update_status(invoice.id, InvoiceStatus::Paid).await.unwrap();

        for status in InvoiceStatus::ALL {
            let result = fx.lifecycle.update_status(invoice.id, status).await;
            assert!(matches!(result, Err(BillingError::InvalidTransition { .. })));
        }
    }

    #[tokio::test]
    async fn test_overdue_then_viewed_then_paid() {
        let fx = setup().await;
        let invoice = fx.lifecycle.create(new_invoice(&fx)).await.unwrap();
        fx.lifecycle.send(invoice.id).await.unwrap();

        for status in [InvoiceStatus::Overdue, InvoiceStatus::Viewed, InvoiceStatus::Paid] {
            let updated = fx.lifecycle.update_status(invoice.id, status).await.unwrap();
            assert_eq!(updated.status, status);
        }
    }

    #[tokio::test]
    async fn test_create_and_send_writes_once() {
        let fx = setup().await;
        let invoice = fx.lifecycle.create_and_send(new_invoice(&fx)).await.unwrap();

        assert_eq!(invoice.status, InvoiceStatus::Sent);
        let stored = fx.lifecycle.list_for_case(fx.case_id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], invoice);
    }

    #[tokio::test]
    async fn test_unknown_installment_rejected() {
        let fx = setup().await;
        let mut new = new_invoice(&fx);
        new.installment_id = Some(InstallmentId::new());

        let result = fx.lifecycle.create(new).await;
        assert!(matches!(result, Err(BillingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_keeps_installment_paid() {
        let fx = setup().await;
        let invoice = fx.lifecycle.create(new_invoice(&fx)).await.unwrap();
        fx.lifecycle.update_status(invoice.id, InvoiceStatus::Paid).await.unwrap();

        fx.lifecycle.delete(invoice.id).await.unwrap();

        assert!(fx.lifecycle.get(invoice.id).await.is_err());
        assert!(fx.ledger.get(fx.installment_id).await.unwrap().paid);
    }

    #[tokio::test]
    async fn test_invoice_survives_installment_delete() {
        let fx = setup().await;
        let invoice = fx.lifecycle.create(new_invoice(&fx)).await.unwrap();
        fx.ledger.delete(fx.installment_id).await.unwrap();

        let stored = fx.lifecycle.get(invoice.id).await.unwrap();
        assert!(stored.installment_id.is_none());

        let paid = fx.lifecycle.update_status(invoice.id, InvoiceStatus::Paid).await.unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn test_list_for_case_newest_first() {
        let fx = setup().await;
        let first = fx.lifecycle.create(new_invoice(&fx)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = fx.lifecycle.create(new_invoice(&fx)).await.unwrap();

        let ids: Vec<_> = fx
            .lifecycle
            .list_for_case(fx.case_id)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
