//! Case billing facade
//!
//! Composes the ledger, the aggregator and the invoice lifecycle into the
//! operations the case screen needs, most importantly "send an invoice for
//! this installment".

use std::sync::Arc;
use tracing::{info, instrument};

use core_kernel::{CaseId, InstallmentId};

use crate::error::BillingError;
use crate::installment::{Installment, InstallmentSchedule};
use crate::invoice::{Invoice, NewInvoice};
use crate::ledger::InstallmentLedger;
use crate::lifecycle::InvoiceLifecycle;
use crate::ports::{InstallmentStore, InvoiceStore, ServiceCatalog};
use crate::pricing::ServicePriceAggregator;
use crate::service::AttachedService;

/// Name used when a case has no named services attached
pub const FALLBACK_SERVICE_LABEL: &str = "Services";

/// How an installment is labelled in an invoice name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallmentLabel {
    DownPayment,
    /// 1-based index among the case's installments
    Installment(usize),
}

impl InstallmentLabel {
    /// Label of `installment` within `schedule`
    pub fn of(schedule: &InstallmentSchedule, installment: &Installment) -> Option<Self> {
        if installment.is_down_payment {
            return Some(InstallmentLabel::DownPayment);
        }
        schedule.ordinal_of(installment.id).map(InstallmentLabel::Installment)
    }
}

/// Builds an invoice display name from service names and an installment label
///
/// ```
/// use domain_billing::facade::{derive_invoice_name, InstallmentLabel};
///
/// let name = derive_invoice_name(["Consultation", "Filing"], InstallmentLabel::Installment(2));
/// assert_eq!(name, "Consultation, Filing - Installment 2");
/// ```
pub fn derive_invoice_name<I, S>(service_names: I, label: InstallmentLabel) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let names: Vec<String> = service_names
        .into_iter()
        .map(|name| name.as_ref().trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    let services = if names.is_empty() {
        FALLBACK_SERVICE_LABEL.to_string()
    } else {
        names.join(", ")
    };

    match label {
        InstallmentLabel::DownPayment => format!("{} - Down Payment", services),
        InstallmentLabel::Installment(ordinal) => format!("{} - Installment {}", services, ordinal),
    }
}

/// Entry point for invoice actions on a case
#[derive(Clone)]
pub struct CaseBillingFacade {
    installments: Arc<dyn InstallmentStore>,
    catalog: Arc<dyn ServiceCatalog>,
    lifecycle: InvoiceLifecycle,
}

impl CaseBillingFacade {
    pub fn new(
        installments: Arc<dyn InstallmentStore>,
        catalog: Arc<dyn ServiceCatalog>,
        lifecycle: InvoiceLifecycle,
    ) -> Self {
        Self {
            installments,
            catalog,
            lifecycle,
        }
    }

    /// Creates and sends an invoice for one installment of a case
    ///
    /// The invoice is named after the case's attached services and the
    /// installment's label, and carries the installment's amount and due
    /// date. It is persisted once, already sent.
    ///
    /// # Errors
    ///
    /// `Validation` if the installment does not belong to the case
    #[instrument(skip_all, fields(case_id = %case_id, installment_id = %installment_id))]
    pub async fn send_invoice_for_installment(
        &self,
        case_id: CaseId,
        installment_id: InstallmentId,
    ) -> Result<Invoice, BillingError> {
        let (installment, invoice_name) = self.resolve(case_id, installment_id).await?;

        let invoice = self
            .lifecycle
            .create_and_send(NewInvoice {
                case_id,
                installment_id: Some(installment.id),
                invoice_name,
                amount: installment.amount,
                due_date: installment.due_date,
            })
            .await?;

        info!(invoice_id = %invoice.id, name = %invoice.invoice_name, "Invoice sent for installment");
        Ok(invoice)
    }

    /// The name `send_invoice_for_installment` would give the invoice
    pub async fn invoice_name_for(
        &self,
        case_id: CaseId,
        installment_id: InstallmentId,
    ) -> Result<String, BillingError> {
        let (_, name) = self.resolve(case_id, installment_id).await?;
        Ok(name)
    }

    async fn resolve(
        &self,
        case_id: CaseId,
        installment_id: InstallmentId,
    ) -> Result<(Installment, String), BillingError> {
        let schedule = self.installments.load_schedule(case_id).await?;
        let not_in_case = || {
            BillingError::validation(format!(
                "Installment {} not found in case {}",
                installment_id, case_id
            ))
        };

        let installment = schedule.get(installment_id).cloned().ok_or_else(not_in_case)?;
        let label = InstallmentLabel::of(&schedule, &installment).ok_or_else(not_in_case)?;

        let services: Vec<AttachedService> = self.catalog.attached_services(case_id).await?;
        let name = derive_invoice_name(services.iter().map(|s| s.name.as_str()), label);
        Ok((installment, name))
    }
}

/// The billing components wired to one set of ports
#[derive(Clone)]
pub struct BillingEngine {
    pub ledger: InstallmentLedger,
    pub pricing: ServicePriceAggregator,
    pub invoices: InvoiceLifecycle,
    pub facade: CaseBillingFacade,
}

impl BillingEngine {
    pub fn new(
        installments: Arc<dyn InstallmentStore>,
        invoices: Arc<dyn InvoiceStore>,
        catalog: Arc<dyn ServiceCatalog>,
    ) -> Self {
        let lifecycle = InvoiceLifecycle::new(invoices);
        Self {
            ledger: InstallmentLedger::new(installments.clone()),
            pricing: ServicePriceAggregator::new(installments.clone(), catalog.clone()),
            facade: CaseBillingFacade::new(installments, catalog, lifecycle.clone()),
            invoices: lifecycle,
        }
    }

    /// Wires every component to a single adapter implementing all ports
    pub fn from_adapter<A>(adapter: Arc<A>) -> Self
    where
        A: InstallmentStore + InvoiceStore + ServiceCatalog,
    {
        Self::new(adapter.clone(), adapter.clone(), adapter)
    }
}
