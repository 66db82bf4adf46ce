//! PostgreSQL adapter tests
//!
//! These start a container per test and need Docker:
//! `cargo test -p test_utils -- --ignored`

use std::sync::Arc;

use rust_decimal_macros::dec;

use core_kernel::{AdapterHealth, CaseId, HealthCheckable};
use domain_billing::{BillingEngine, BillingError, InstallmentStore, InvoiceStatus};
use infra_db::PostgresBillingAdapter;
use test_utils::{
    assert_amounts, assert_schedule_valid, schedule_total, AmountFixtures, DateFixtures, TestDatabase,
    TestInstallmentBuilder, TestInvoiceBuilder,
};

async fn setup() -> (TestDatabase, BillingEngine, Arc<PostgresBillingAdapter>, CaseId) {
    let db = TestDatabase::new().await.expect("container starts");
    let adapter = Arc::new(db.adapter());
    let case_id = CaseId::new();
    adapter.register_case(case_id).await.unwrap();

    let engine = BillingEngine::from_adapter(adapter.clone());
    engine.ledger.initialize(case_id).await.unwrap();
    (db, engine, adapter, case_id)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_merge_folds_into_predecessor() {
    let (_db, engine, _, case_id) = setup().await;
    let dp = engine.ledger.list(case_id).await.unwrap().remove(0);
    engine
        .ledger
        .update(
            dp.id,
            domain_billing::InstallmentChanges {
                amount: AmountFixtures::of(dec!(100)),
                due_date: None,
                automatic_invoice: false,
            },
        )
        .await
        .unwrap();
    engine.ledger.add(case_id, TestInstallmentBuilder::new().amount(dec!(50)).build()).await.unwrap();
    let third = engine
        .ledger
        .add(case_id, TestInstallmentBuilder::new().amount(dec!(25)).build())
        .await
        .unwrap();

    let predecessor = engine.ledger.merge(third.id).await.unwrap();

    let rows = engine.ledger.list(case_id).await.unwrap();
    assert_eq!(predecessor.position, 2);
    assert_schedule_valid(&rows);
    assert_amounts(&rows, &[dec!(100), dec!(75)]);
    assert_eq!(schedule_total(&rows), dec!(175));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_delete_recompacts_in_order() {
    let (_db, engine, _, case_id) = setup().await;
    let mut ids = Vec::new();
    for (month, amount) in [dec!(10), dec!(20), dec!(30), dec!(40)].into_iter().enumerate() {
        let new = TestInstallmentBuilder::new()
            .amount(amount)
            .due_on(DateFixtures::monthly(month as u32))
            .build();
        ids.push(engine.ledger.add(case_id, new).await.unwrap().id);
    }

    engine.ledger.delete(ids[1]).await.unwrap();
    engine.ledger.delete(ids[0]).await.unwrap();

    let rows = engine.ledger.list(case_id).await.unwrap();
    assert_schedule_valid(&rows);
    assert_amounts(&rows, &[dec!(0), dec!(30), dec!(40)]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_down_payment_delete_rejected() {
    let (_db, engine, _, case_id) = setup().await;
    let before = engine.ledger.list(case_id).await.unwrap();

    let result = engine.ledger.delete(before[0].id).await;

    assert!(matches!(result, Err(BillingError::BusinessRule(_))));
    assert_eq!(engine.ledger.list(case_id).await.unwrap(), before);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_second_initialize_rejected() {
    let (_db, engine, _, case_id) = setup().await;

    let result = engine.ledger.initialize(case_id).await;

    assert!(matches!(result, Err(BillingError::BusinessRule(_))));
    assert_eq!(engine.ledger.list(case_id).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_service_pricing_adjusts_down_payment() {
    let (_db, engine, adapter, case_id) = setup().await;
    let consultation = adapter.add_service("Consultation", AmountFixtures::consultation_fee()).await.unwrap();
    let filing = adapter.add_service("Filing", AmountFixtures::filing_fee()).await.unwrap();

    let (first, dp) = engine.pricing.attach_service(case_id, consultation.id).await.unwrap();
    assert_eq!(dp.value(), dec!(500));
    let (_, dp) = engine.pricing.attach_service(case_id, filing.id).await.unwrap();
    assert_eq!(dp.value(), dec!(800));

    let dp = engine.pricing.detach_service(case_id, first.id).await.unwrap();
    assert_eq!(dp.value(), dec!(300));

    let stored = adapter.load_schedule(case_id).await.unwrap();
    assert_eq!(stored.down_payment().unwrap().amount.value(), dec!(300));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_attach_without_down_payment_rolls_back() {
    let db = TestDatabase::new().await.expect("container starts");
    let adapter = Arc::new(db.adapter());
    let case_id = CaseId::new();
    adapter.register_case(case_id).await.unwrap();
    let engine = BillingEngine::from_adapter(adapter.clone());
    let consultation = adapter.add_service("Consultation", AmountFixtures::consultation_fee()).await.unwrap();

    let result = engine.pricing.attach_service(case_id, consultation.id).await;

    assert!(matches!(result, Err(BillingError::BusinessRule(_))));
    assert!(engine.pricing.attached_services(case_id).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_catalog_listed_by_name() {
    let (_db, engine, adapter, case_id) = setup().await;
    adapter.add_service("Filing", AmountFixtures::filing_fee()).await.unwrap();
    let consultation = adapter.add_service("Consultation", AmountFixtures::consultation_fee()).await.unwrap();
    engine.pricing.attach_service(case_id, consultation.id).await.unwrap();

    let names: Vec<String> = engine
        .pricing
        .list_services()
        .await
        .unwrap()
        .into_iter()
        .map(|service| service.name)
        .collect();
    assert_eq!(names, vec!["Consultation", "Filing"]);

    let attached = engine.pricing.attached_services(case_id).await.unwrap();
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0].attachment.service_id, consultation.id);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_sends_number_once() {
    let (_db, engine, _, case_id) = setup().await;
    let id = engine
        .invoices
        .create(TestInvoiceBuilder::new(case_id).build())
        .await
        .unwrap()
        .id;

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let invoices = engine.invoices.clone();
            tokio::spawn(async move { invoices.send(id).await })
        })
        .collect();
    let mut sent = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            sent += 1;
        }
    }
    assert_eq!(sent, 1);

    let next = engine
        .invoices
        .create(TestInvoiceBuilder::new(case_id).build())
        .await
        .unwrap();
    let next = engine.invoices.send(next.id).await.unwrap();
    assert_eq!(next.invoice_number.as_deref(), Some("INV0000002"));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_invoice_lifecycle_settles_installment() {
    let (_db, engine, _, case_id) = setup().await;
    let installment = engine
        .ledger
        .add(case_id, TestInstallmentBuilder::new().amount(dec!(100)).build())
        .await
        .unwrap();

    let draft = engine
        .invoices
        .create(TestInvoiceBuilder::new(case_id).for_installment(&installment).build())
        .await
        .unwrap();
    assert!(draft.invoice_number.is_none());

    let sent = engine.invoices.send(draft.id).await.unwrap();
    assert_eq!(sent.status, InvoiceStatus::Sent);
    assert_eq!(sent.invoice_number.as_deref(), Some("INV0000001"));
    assert!(sent.sent_at.is_some());

    let paid = engine.invoices.update_status(draft.id, InvoiceStatus::Paid).await.unwrap();
    assert!(paid.paid_at.is_some());
    assert!(engine.ledger.get(installment.id).await.unwrap().paid);

    let result = engine.invoices.update_status(draft.id, InvoiceStatus::Sent).await;
    assert!(matches!(result, Err(BillingError::InvalidTransition { .. })));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_deleting_installment_keeps_invoice() {
    let (_db, engine, _, case_id) = setup().await;
    let installment = engine
        .ledger
        .add(case_id, TestInstallmentBuilder::new().amount(dec!(40)).build())
        .await
        .unwrap();
    let invoice = engine
        .facade
        .send_invoice_for_installment(case_id, installment.id)
        .await
        .unwrap();

    engine.ledger.delete(installment.id).await.unwrap();

    let kept = engine.invoices.get(invoice.id).await.unwrap();
    assert!(kept.installment_id.is_none());
    assert_eq!(kept.invoice_name, "Services - Installment 2");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_adds_keep_positions_unique() {
    let (_db, engine, _, case_id) = setup().await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let ledger = engine.ledger.clone();
            tokio::spawn(async move {
                ledger
                    .add(case_id, TestInstallmentBuilder::new().amount(dec!(5)).build())
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let rows = engine.ledger.list(case_id).await.unwrap();
    assert_eq!(rows.len(), 9);
    assert_schedule_valid(&rows);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_health_check_and_clear() {
    let (db, engine, adapter, case_id) = setup().await;

    assert_eq!(adapter.health_check().await.status, AdapterHealth::Healthy);

    db.clear_data().await.unwrap();
    let result = engine.ledger.list(case_id).await;
    assert!(matches!(result, Err(BillingError::Validation(_))));
}
