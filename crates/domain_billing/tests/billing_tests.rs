//! Integration tests for domain_billing

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal_macros::dec;

use core_kernel::{Amount, CaseId, InstallmentId};

use domain_billing::installment::{InstallmentChanges, InstallmentSchedule, NewInstallment};
use domain_billing::invoice::{Invoice, InvoiceEffect, InvoiceStatus, NewInvoice};
use domain_billing::ports::mock::InMemoryBillingStore;
use domain_billing::{BillingEngine, BillingError};

fn amount(value: rust_decimal::Decimal) -> Amount {
    Amount::new(value).unwrap()
}

// ============================================================================
// Invoice Status Tests
// ============================================================================

mod invoice_status_tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use InvoiceStatus::*;

        let allowed = [
            (Draft, Sent),
            (Draft, Paid),
            (Draft, Cancelled),
            (Sent, Viewed),
            (Sent, Paid),
            (Sent, Overdue),
            (Sent, Cancelled),
            (Viewed, Paid),
            (Viewed, Overdue),
            (Viewed, Cancelled),
            (Overdue, Viewed),
            (Overdue, Paid),
            (Overdue, Cancelled),
        ];

        for from in InvoiceStatus::ALL {
            for to in InvoiceStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_same_state_never_allowed() {
        for status in InvoiceStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&InvoiceStatus::Overdue).unwrap();
        assert_eq!(json, "\"overdue\"");

        let parsed: InvoiceStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, InvoiceStatus::Cancelled);
    }

    #[test]
    fn test_draft_to_paid_settles() {
        let installment_id = InstallmentId::new();
        let mut invoice = Invoice::new(NewInvoice {
            case_id: CaseId::new(),
            installment_id: Some(installment_id),
            invoice_name: "Services - Installment 2".to_string(),
            amount: amount(dec!(40)),
            due_date: None,
        })
        .unwrap();

        let effect = invoice.transition_to(InvoiceStatus::Paid, None, Utc::now()).unwrap();

        assert_eq!(effect, InvoiceEffect::SettleInstallment(installment_id));
        assert!(invoice.sent_at.is_none());
        assert!(invoice.invoice_number.is_none());
    }
}

// ============================================================================
// Schedule Tests
// ============================================================================

mod schedule_tests {
    use super::*;

    #[test]
    fn test_verify_detects_gap() {
        let case_id = CaseId::new();
        let mut schedule = InstallmentSchedule::empty(case_id);
        schedule.insert_down_payment().unwrap();
        schedule.append(InstallmentId::new(), NewInstallment::with_amount(amount(dec!(10))));

        let mut rows = schedule.into_installments();
        rows[1].position = 5;
        let broken = InstallmentSchedule::from_rows(case_id, rows);

        assert!(broken.verify().is_err());
    }

    #[test]
    fn test_update_unknown_installment() {
        let mut schedule = InstallmentSchedule::empty(CaseId::new());
        schedule.insert_down_payment().unwrap();

        let result = schedule.update(
            InstallmentId::new(),
            InstallmentChanges {
                amount: Amount::ZERO,
                due_date: None,
                automatic_invoice: false,
            },
        );
        assert!(matches!(result, Err(BillingError::Validation(_))));
    }

    #[test]
    fn test_new_installment_deserializes_with_defaults() {
        let new: NewInstallment = serde_json::from_str(r#"{"amount": "250.00"}"#).unwrap();
        assert_eq!(new.amount.value(), dec!(250));
        assert!(new.due_date.is_none());
        assert!(!new.automatic_invoice);
    }

    #[test]
    fn test_new_installment_rejects_negative_amount() {
        let result: Result<NewInstallment, _> = serde_json::from_str(r#"{"amount": "-1"}"#);
        assert!(result.is_err());
    }
}

// ============================================================================
// Engine Workflow Tests
// ============================================================================

mod workflow_tests {
    use super::*;

    async fn engine_with_case() -> (BillingEngine, Arc<InMemoryBillingStore>, CaseId) {
        let store = Arc::new(InMemoryBillingStore::new());
        let case_id = CaseId::new();
        store.register_case(case_id).await;
        let engine = BillingEngine::from_adapter(store.clone());
        engine.ledger.initialize(case_id).await.unwrap();
        (engine, store, case_id)
    }

    #[tokio::test]
    async fn test_full_case_billing_flow() {
        let (engine, store, case_id) = engine_with_case().await;
        let service = store.add_service("Visa Application", amount(dec!(1200))).await;
        engine.pricing.attach_service(case_id, service.id).await.unwrap();

        let due = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let second = engine
            .ledger
            .add(case_id, NewInstallment::with_amount(amount(dec!(400))).due_on(due))
            .await
            .unwrap();
        engine
            .ledger
            .add(case_id, NewInstallment::with_amount(amount(dec!(400))))
            .await
            .unwrap();

        let dp = engine.ledger.list(case_id).await.unwrap().remove(0);
        let dp_invoice = engine.facade.send_invoice_for_installment(case_id, dp.id).await.unwrap();
        let second_invoice = engine
            .facade
            .send_invoice_for_installment(case_id, second.id)
            .await
            .unwrap();

        assert_eq!(dp_invoice.invoice_name, "Visa Application - Down Payment");
        assert_eq!(dp_invoice.amount.value(), dec!(1200));
        assert_eq!(second_invoice.invoice_name, "Visa Application - Installment 2");
        assert_ne!(dp_invoice.invoice_number, second_invoice.invoice_number);

        engine.invoices.update_status(dp_invoice.id, InvoiceStatus::Paid).await.unwrap();

        let rows = engine.ledger.list(case_id).await.unwrap();
        assert!(rows[0].paid);
        assert!(!rows[1].paid);

        let invoices = engine.invoices.list_for_case(case_id).await.unwrap();
        assert_eq!(invoices.len(), 2);
    }

    #[tokio::test]
    async fn test_ordinal_follows_recompaction() {
        let (engine, _, case_id) = engine_with_case().await;
        let second = engine
            .ledger
            .add(case_id, NewInstallment::with_amount(amount(dec!(10))))
            .await
            .unwrap();
        let third = engine
            .ledger
            .add(case_id, NewInstallment::with_amount(amount(dec!(20))))
            .await
            .unwrap();

        engine.ledger.delete(second.id).await.unwrap();

        let name = engine.facade.invoice_name_for(case_id, third.id).await.unwrap();
        assert_eq!(name, "Services - Installment 2");
    }

    #[tokio::test]
    async fn test_down_payment_delete_is_rejected() {
        let (engine, _, case_id) = engine_with_case().await;
        let before = engine.ledger.list(case_id).await.unwrap();

        let result = engine.ledger.delete(before[0].id).await;

        assert!(matches!(result, Err(BillingError::BusinessRule(_))));
        assert_eq!(engine.ledger.list(case_id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_multiple_invoices_per_installment_allowed() {
        let (engine, _, case_id) = engine_with_case().await;
        let dp = engine.ledger.list(case_id).await.unwrap().remove(0);

        engine.facade.send_invoice_for_installment(case_id, dp.id).await.unwrap();
        engine.facade.send_invoice_for_installment(case_id, dp.id).await.unwrap();

        assert_eq!(engine.invoices.list_for_case(case_id).await.unwrap().len(), 2);
    }
}
