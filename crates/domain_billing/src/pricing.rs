//! Down-payment synchronization with attached service prices
//!
//! Attaching a service raises the case's down payment by the service's gross
//! price; detaching lowers it by the same price, floored at zero. Both
//! adjustments run through the case-locked schedule edit, so concurrent
//! attach and detach calls on one case cannot lose an update.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use core_kernel::{Amount, AttachmentId, CaseId, ServiceId};

use crate::error::BillingError;
use crate::ports::{schedule_edit, InstallmentStore, ScheduleEdit, ServiceCatalog};
use crate::service::{AttachedService, CatalogService, ServiceAttachment};

#[derive(Debug, Clone, Copy)]
enum Adjustment {
    Increase(Amount),
    Decrease(Amount),
}

/// Keeps the down payment in step with the services attached to a case
#[derive(Clone)]
pub struct ServicePriceAggregator {
    installments: Arc<dyn InstallmentStore>,
    catalog: Arc<dyn ServiceCatalog>,
}

impl ServicePriceAggregator {
    pub fn new(installments: Arc<dyn InstallmentStore>, catalog: Arc<dyn ServiceCatalog>) -> Self {
        Self {
            installments,
            catalog,
        }
    }

    /// Applies the price of a newly attached service to the down payment
    ///
    /// # Returns
    ///
    /// The down payment amount after the adjustment
    #[instrument(skip_all, fields(case_id = %case_id, service_id = %service_id))]
    pub async fn on_service_attached(
        &self,
        case_id: CaseId,
        service_id: ServiceId,
    ) -> Result<Amount, BillingError> {
        let service = self.catalog.get_service(service_id).await?;
        self.adjust(case_id, Adjustment::Increase(service.gross_price)).await
    }

    /// Removes the price of an attached service from the down payment
    ///
    /// Reads the price through the attachment, so it must be called before
    /// the attachment is removed.
    #[instrument(skip_all, fields(case_id = %case_id, attachment_id = %attachment_id))]
    pub async fn on_service_detached(
        &self,
        case_id: CaseId,
        attachment_id: AttachmentId,
    ) -> Result<Amount, BillingError> {
        let attached = self.attachment_of(case_id, attachment_id).await?;
        self.adjust(case_id, Adjustment::Decrease(attached.gross_price)).await
    }

    /// Attaches a catalog service to a case and raises the down payment
    ///
    /// The attachment and the adjustment are written together, so a case
    /// without a down payment ends up with neither.
    #[instrument(skip_all, fields(case_id = %case_id, service_id = %service_id))]
    pub async fn attach_service(
        &self,
        case_id: CaseId,
        service_id: ServiceId,
    ) -> Result<(ServiceAttachment, Amount), BillingError> {
        let service = self.catalog.get_service(service_id).await?;
        let (attachment, edited) = self
            .catalog
            .attach_service(case_id, service_id, adjustment_edit(Adjustment::Increase(service.gross_price)))
            .await
            .inspect_err(|e| warn!(error = %e, "Service attach rejected"))?;
        let down_payment = edited.touched_installment()?.amount;

        info!(attachment_id = %attachment.id, %down_payment, "Service attached");
        Ok((attachment, down_payment))
    }

    /// Detaches a service from a case and lowers the down payment
    ///
    /// The attachment is only removed if the adjustment succeeds.
    #[instrument(skip_all, fields(case_id = %case_id, attachment_id = %attachment_id))]
    pub async fn detach_service(
        &self,
        case_id: CaseId,
        attachment_id: AttachmentId,
    ) -> Result<Amount, BillingError> {
        let attached = self.attachment_of(case_id, attachment_id).await?;
        let edited = self
            .catalog
            .remove_attachment(attachment_id, adjustment_edit(Adjustment::Decrease(attached.gross_price)))
            .await
            .inspect_err(|e| warn!(error = %e, "Service detach rejected"))?;
        let down_payment = edited.touched_installment()?.amount;

        info!(%down_payment, "Service detached");
        Ok(down_payment)
    }

    /// The service catalog ordered by name
    pub async fn list_services(&self) -> Result<Vec<CatalogService>, BillingError> {
        Ok(self.catalog.list_services().await?)
    }

    /// Services attached to a case with their current prices
    pub async fn attached_services(&self, case_id: CaseId) -> Result<Vec<AttachedService>, BillingError> {
        Ok(self.catalog.attached_services(case_id).await?)
    }

    async fn attachment_of(
        &self,
        case_id: CaseId,
        attachment_id: AttachmentId,
    ) -> Result<AttachedService, BillingError> {
        let attached = self.catalog.get_attachment(attachment_id).await?;
        if attached.attachment.case_id != case_id {
            warn!(owner = %attached.attachment.case_id, "Attachment belongs to another case");
            return Err(BillingError::validation(format!(
                "Attachment {} does not belong to case {}",
                attachment_id, case_id
            )));
        }
        Ok(attached)
    }

    async fn adjust(&self, case_id: CaseId, adjustment: Adjustment) -> Result<Amount, BillingError> {
        let edited = self
            .installments
            .edit_schedule(case_id, adjustment_edit(adjustment))
            .await?;

        let down_payment = edited.touched_installment()?;
        debug!(amount = %down_payment.amount, ?adjustment, "Down payment adjusted");
        Ok(down_payment.amount)
    }
}

/// Schedule edit applying `adjustment` to the down payment
///
/// Reports the down payment as the touched installment. A zero price leaves
/// the row as it is but still requires a down payment.
fn adjustment_edit(adjustment: Adjustment) -> ScheduleEdit {
    schedule_edit(move |schedule| {
        match adjustment {
            Adjustment::Increase(price) | Adjustment::Decrease(price) if price.is_zero() => {}
            Adjustment::Increase(price) => {
                schedule.increase_down_payment(price)?;
            }
            Adjustment::Decrease(price) => {
                schedule.decrease_down_payment(price)?;
            }
        }
        schedule
            .down_payment()
            .map(|dp| Some(dp.id))
            .ok_or_else(|| BillingError::business_rule(format!("case {} has no down payment", schedule.case_id())))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InstallmentLedger;
    use crate::ports::mock::InMemoryBillingStore;
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<InMemoryBillingStore>,
        aggregator: ServicePriceAggregator,
        ledger: InstallmentLedger,
        case_id: CaseId,
    }

    async fn setup() -> Fixture {
        let store = Arc::new(InMemoryBillingStore::new());
        let case_id = CaseId::new();
        store.register_case(case_id).await;

        let ledger = InstallmentLedger::new(store.clone());
        ledger.initialize(case_id).await.unwrap();

        Fixture {
            aggregator: ServicePriceAggregator::new(store.clone(), store.clone()),
            store,
            ledger,
            case_id,
        }
    }

    fn amount(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_attach_detach_scenario() {
        let fx = setup().await;
        let first = fx.store.add_service("Consultation", amount(dec!(500))).await;
        let second = fx.store.add_service("Filing", amount(dec!(300))).await;

        let (first_attachment, dp) = fx.aggregator.attach_service(fx.case_id, first.id).await.unwrap();
        assert_eq!(dp.value(), dec!(500));

        let (_, dp) = fx.aggregator.attach_service(fx.case_id, second.id).await.unwrap();
        assert_eq!(dp.value(), dec!(800));

        let dp = fx.aggregator.detach_service(fx.case_id, first_attachment.id).await.unwrap();
        assert_eq!(dp.value(), dec!(300));

        let attached = fx.store.attached_services(fx.case_id).await.unwrap();
        assert_eq!(attached.len(), 1);
        assert_eq!(attached[0].name, "Filing");
    }

    #[tokio::test]
    async fn test_detach_floors_at_zero() {
        let fx = setup().await;
        let service = fx.store.add_service("Consultation", amount(dec!(500))).await;
        let (attachment, _) = fx.aggregator.attach_service(fx.case_id, service.id).await.unwrap();

        // Manual edit lowers the down payment below the attached price
        let dp = fx.ledger.list(fx.case_id).await.unwrap().remove(0);
        fx.ledger
            .update(
                dp.id,
                crate::installment::InstallmentChanges {
                    amount: amount(dec!(200)),
                    due_date: None,
                    automatic_invoice: false,
                },
            )
            .await
            .unwrap();

        let after = fx.aggregator.detach_service(fx.case_id, attachment.id).await.unwrap();
        assert!(after.is_zero());
    }

    #[tokio::test]
    async fn test_detach_uses_live_catalog_price() {
        let fx = setup().await;
        let service = fx.store.add_service("Consultation", amount(dec!(500))).await;
        let (attachment, _) = fx.aggregator.attach_service(fx.case_id, service.id).await.unwrap();

        fx.store.set_service_price(service.id, amount(dec!(100))).await;

        let after = fx.aggregator.detach_service(fx.case_id, attachment.id).await.unwrap();
        assert_eq!(after.value(), dec!(400));
    }

    #[tokio::test]
    async fn test_zero_price_service_leaves_down_payment() {
        let fx = setup().await;
        let free = fx.store.add_service("Intake call", Amount::ZERO).await;

        let (_, dp) = fx.aggregator.attach_service(fx.case_id, free.id).await.unwrap();
        assert!(dp.is_zero());
    }

    #[tokio::test]
    async fn test_on_service_detached_keeps_attachment() {
        let fx = setup().await;
        let service = fx.store.add_service("Consultation", amount(dec!(250))).await;
        let (attachment, _) = fx
            .store
            .attach_service(fx.case_id, service.id, schedule_edit(|_| Ok(None)))
            .await
            .unwrap();

        let dp = fx.aggregator.on_service_attached(fx.case_id, service.id).await.unwrap();
        assert_eq!(dp.value(), dec!(250));

        let dp = fx.aggregator.on_service_detached(fx.case_id, attachment.id).await.unwrap();
        assert!(dp.is_zero());
        assert!(fx.store.get_attachment(attachment.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_attachment_of_other_case_rejected() {
        let fx = setup().await;
        let other_case = CaseId::new();
        fx.store.register_case(other_case).await;
        let service = fx.store.add_service("Consultation", amount(dec!(500))).await;
        let (attachment, _) = fx
            .store
            .attach_service(other_case, service.id, schedule_edit(|_| Ok(None)))
            .await
            .unwrap();

        let result = fx.aggregator.detach_service(fx.case_id, attachment.id).await;
        assert!(matches!(result, Err(BillingError::Validation(_))));
        assert!(fx.store.get_attachment(attachment.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_attach_without_down_payment_writes_nothing() {
        let store = Arc::new(InMemoryBillingStore::new());
        let case_id = CaseId::new();
        store.register_case(case_id).await;
        let aggregator = ServicePriceAggregator::new(store.clone(), store.clone());
        let service = store.add_service("Consultation", amount(dec!(500))).await;

        let result = aggregator.attach_service(case_id, service.id).await;

        assert!(matches!(result, Err(BillingError::BusinessRule(_))));
        assert!(store.attached_services(case_id).await.unwrap().is_empty());

        let ledger = InstallmentLedger::new(store.clone());
        ledger.initialize(case_id).await.unwrap();
        assert!(ledger.list(case_id).await.unwrap()[0].amount.is_zero());
    }

    #[tokio::test]
    async fn test_failed_detach_keeps_attachment() {
        let fx = setup().await;
        let service = fx.store.add_service("Consultation", amount(dec!(500))).await;
        let (attachment, _) = fx.aggregator.attach_service(fx.case_id, service.id).await.unwrap();

        let result = fx
            .store
            .remove_attachment(
                attachment.id,
                schedule_edit(|_| Err(BillingError::business_rule("adjustment refused"))),
            )
            .await;

        assert!(matches!(result, Err(BillingError::BusinessRule(_))));
        assert_eq!(fx.store.attached_services(fx.case_id).await.unwrap().len(), 1);
        let dp = fx.ledger.list(fx.case_id).await.unwrap().remove(0);
        assert_eq!(dp.amount.value(), dec!(500));
    }

    #[tokio::test]
    async fn test_catalog_listed_by_name() {
        let fx = setup().await;
        fx.store.add_service("Filing", amount(dec!(300))).await;
        let consultation = fx.store.add_service("Consultation", amount(dec!(500))).await;
        fx.aggregator.attach_service(fx.case_id, consultation.id).await.unwrap();

        let names: Vec<_> = fx
            .aggregator
            .list_services()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Consultation", "Filing"]);

        let attached = fx.aggregator.attached_services(fx.case_id).await.unwrap();
        assert_eq!(attached.len(), 1);
        assert_eq!(attached[0].gross_price.value(), dec!(500));
    }

    #[tokio::test]
    async fn test_unknown_service_is_validation_error() {
        let fx = setup().await;
        let result = fx.aggregator.attach_service(fx.case_id, ServiceId::new()).await;
        assert!(matches!(result, Err(BillingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_as_storage_error() {
        let fx = setup().await;
        let service = fx.store.add_service("Consultation", amount(dec!(500))).await;
        fx.store.set_unavailable(true);

        let result = fx.aggregator.attach_service(fx.case_id, service.id).await;
        assert!(matches!(result, Err(BillingError::Storage(_))));
    }

    #[tokio::test]
    async fn test_concurrent_attaches_do_not_lose_updates() {
        let fx = setup().await;
        let service_id = fx.store.add_service("Consultation", amount(dec!(10))).await.id;

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let aggregator = fx.aggregator.clone();
                let case_id = fx.case_id;
                tokio::spawn(async move { aggregator.attach_service(case_id, service_id).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let dp = fx.ledger.list(fx.case_id).await.unwrap().remove(0);
        assert_eq!(dp.amount.value(), dec!(200));
    }
}
