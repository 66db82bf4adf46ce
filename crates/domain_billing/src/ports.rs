//! Billing Domain Ports
//!
//! Persistence and catalog access for the billing components are defined as
//! port traits so the domain never depends on a concrete store.
//!
//! - **Internal Adapter**: PostgreSQL (`infra_db::PostgresBillingAdapter`)
//! - **Mock Adapter**: in-memory store for tests (`mock::InMemoryBillingStore`)
//!
//! # Units of work
//!
//! Schedule and invoice mutations are expressed as closures handed to the
//! store (`edit_schedule`, `edit_invoice`). The store loads the current state
//! under a per-case (or per-invoice) lock, runs the closure and persists the
//! result atomically. A closure returning an error leaves storage untouched.
//!
//! ```rust,ignore
//! let edited = store
//!     .edit_schedule(case_id, schedule_edit(move |schedule| {
//!         schedule.remove(installment_id)?;
//!         Ok(None)
//!     }))
//!     .await?;
//! ```

use async_trait::async_trait;

use core_kernel::{AttachmentId, CaseId, DomainPort, InstallmentId, InvoiceId, PortError, ServiceId};

use crate::error::BillingError;
use crate::installment::{Installment, InstallmentSchedule};
use crate::invoice::{Invoice, InvoiceEffect};
use crate::service::{AttachedService, CatalogService, ServiceAttachment};

/// Pure edit applied to a case's schedule inside a store transaction
///
/// Returns the installment the caller cares about, if any.
pub type ScheduleEdit =
    Box<dyn FnOnce(&mut InstallmentSchedule) -> Result<Option<InstallmentId>, BillingError> + Send>;

/// Pure edit applied to one invoice inside a store transaction
pub type InvoiceEdit = Box<dyn FnOnce(&mut Invoice) -> Result<InvoiceEffect, BillingError> + Send>;

/// Boxes a closure as a `ScheduleEdit`
pub fn schedule_edit<F>(edit: F) -> ScheduleEdit
where
    F: FnOnce(&mut InstallmentSchedule) -> Result<Option<InstallmentId>, BillingError> + Send + 'static,
{
    Box::new(edit)
}

/// Boxes a closure as an `InvoiceEdit`
pub fn invoice_edit<F>(edit: F) -> InvoiceEdit
where
    F: FnOnce(&mut Invoice) -> Result<InvoiceEffect, BillingError> + Send + 'static,
{
    Box::new(edit)
}

/// Outcome of a committed schedule edit
#[derive(Debug, Clone)]
pub struct EditedSchedule {
    /// The schedule as persisted
    pub schedule: InstallmentSchedule,
    /// Installment reported by the edit
    pub touched: Option<InstallmentId>,
}

impl EditedSchedule {
    /// Returns the installment the edit reported, as persisted
    pub fn touched_installment(&self) -> Result<Installment, BillingError> {
        self.touched
            .and_then(|id| self.schedule.get(id))
            .cloned()
            .ok_or_else(|| BillingError::validation("Edited installment is not part of the schedule"))
    }
}

/// Storage of per-case installment schedules
#[async_trait]
pub trait InstallmentStore: DomainPort {
    /// Loads every installment of a case ordered by position
    ///
    /// Returns `PortError::NotFound` if the case does not exist.
    async fn load_schedule(&self, case_id: CaseId) -> Result<InstallmentSchedule, PortError>;

    /// Retrieves one installment by ID
    async fn get_installment(&self, id: InstallmentId) -> Result<Installment, PortError>;

    /// Applies `edit` to the case's schedule as one atomic unit
    ///
    /// Concurrent edits of the same case are serialized. Nothing is written
    /// if the edit fails.
    async fn edit_schedule(
        &self,
        case_id: CaseId,
        edit: ScheduleEdit,
    ) -> Result<EditedSchedule, BillingError>;
}

/// Storage of invoices
#[async_trait]
pub trait InvoiceStore: DomainPort {
    /// Inserts a new invoice and returns it as stored
    ///
    /// A sent invoice without a number is numbered in the same write.
    /// Returns `PortError::NotFound` if the case or referenced installment
    /// does not exist.
    async fn insert_invoice(&self, invoice: Invoice) -> Result<Invoice, PortError>;

    /// Retrieves one invoice by ID
    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError>;

    /// Invoices of a case, newest first
    async fn list_invoices(&self, case_id: CaseId) -> Result<Vec<Invoice>, PortError>;

    /// Applies `edit` to an invoice as one atomic unit
    ///
    /// An invoice the edit leaves sent without a number gets the next one
    /// while the invoice is still locked. A `SettleInstallment` effect flags
    /// the installment paid in the same unit of work as the invoice write.
    async fn edit_invoice(&self, id: InvoiceId, edit: InvoiceEdit) -> Result<Invoice, BillingError>;

    /// Hard-deletes an invoice
    async fn delete_invoice(&self, id: InvoiceId) -> Result<(), PortError>;
}

/// Service catalog and case attachments
#[async_trait]
pub trait ServiceCatalog: DomainPort {
    /// Retrieves a catalog service by ID
    async fn get_service(&self, id: ServiceId) -> Result<CatalogService, PortError>;

    /// The whole catalog ordered by name
    async fn list_services(&self) -> Result<Vec<CatalogService>, PortError>;

    /// Attaches a service to a case and applies `edit` to the case's
    /// schedule in the same unit of work
    ///
    /// Nothing is written if the edit fails.
    async fn attach_service(
        &self,
        case_id: CaseId,
        service_id: ServiceId,
        edit: ScheduleEdit,
    ) -> Result<(ServiceAttachment, EditedSchedule), BillingError>;

    /// Retrieves an attachment with the current price of its service
    async fn get_attachment(&self, id: AttachmentId) -> Result<AttachedService, PortError>;

    /// Removes an attachment and applies `edit` to its case's schedule in
    /// the same unit of work
    ///
    /// Nothing is written if the edit fails.
    async fn remove_attachment(
        &self,
        id: AttachmentId,
        edit: ScheduleEdit,
    ) -> Result<EditedSchedule, BillingError>;

    /// Services attached to a case, in attachment order
    async fn attached_services(&self, case_id: CaseId) -> Result<Vec<AttachedService>, PortError>;
}

/// In-memory implementation of the billing ports for testing
///
/// All three ports share one state guarded by a single mutex, which gives
/// the same per-case serialization the database adapter gets from row locks.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use chrono::Utc;
    use tokio::sync::Mutex;

    use core_kernel::{AdapterHealth, Amount, HealthCheckResult, HealthCheckable};

    use crate::invoice::InvoiceStatus;

    #[derive(Debug, Default)]
    struct State {
        cases: HashSet<CaseId>,
        installments: HashMap<InstallmentId, Installment>,
        invoices: HashMap<InvoiceId, Invoice>,
        services: HashMap<ServiceId, CatalogService>,
        attachments: Vec<ServiceAttachment>,
        invoice_seq: u64,
    }

    impl State {
        fn require_case(&self, case_id: CaseId) -> Result<(), PortError> {
            if self.cases.contains(&case_id) {
                Ok(())
            } else {
                Err(PortError::not_found("Case", case_id))
            }
        }

        fn schedule(&self, case_id: CaseId) -> InstallmentSchedule {
            let rows = self
                .installments
                .values()
                .filter(|i| i.case_id == case_id)
                .cloned()
                .collect();
            InstallmentSchedule::from_rows(case_id, rows)
        }

        fn attached(&self, attachment: &ServiceAttachment) -> Result<AttachedService, PortError> {
            let service = self
                .services
                .get(&attachment.service_id)
                .ok_or_else(|| PortError::not_found("Service", attachment.service_id))?;
            Ok(AttachedService::join(attachment.clone(), service))
        }

        /// Runs `edit` on a copy of the schedule and stores the result only
        /// if it succeeds
        fn apply_schedule_edit(
            &mut self,
            case_id: CaseId,
            edit: ScheduleEdit,
        ) -> Result<EditedSchedule, BillingError> {
            self.require_case(case_id)?;

            let mut schedule = self.schedule(case_id);
            let touched = edit(&mut schedule)?;

            let kept: HashSet<InstallmentId> = schedule.installments().iter().map(|i| i.id).collect();
            self.installments
                .retain(|id, i| i.case_id != case_id || kept.contains(id));
            // Invoices outlive deleted installments and lose the reference
            for invoice in self.invoices.values_mut().filter(|i| i.case_id == case_id) {
                if invoice.installment_id.is_some_and(|id| !kept.contains(&id)) {
                    invoice.installment_id = None;
                }
            }
            for installment in schedule.installments() {
                self.installments.insert(installment.id, installment.clone());
            }

            Ok(EditedSchedule { schedule, touched })
        }

        fn number_if_sent(&mut self, invoice: &mut Invoice) {
            if invoice.status == InvoiceStatus::Sent && invoice.invoice_number.is_none() {
                self.invoice_seq += 1;
                invoice.invoice_number = Some(format!("INV{:07}", self.invoice_seq));
            }
        }
    }

    /// In-memory store implementing every billing port
    #[derive(Debug, Default)]
    pub struct InMemoryBillingStore {
        state: Mutex<State>,
        unavailable: AtomicBool,
    }

    impl InMemoryBillingStore {
        /// Creates an empty store
        pub fn new() -> Self {
            Self::default()
        }

        /// Registers a case so installments and invoices can reference it
        pub async fn register_case(&self, case_id: CaseId) {
            self.state.lock().await.cases.insert(case_id);
        }

        /// Adds a service to the catalog
        pub async fn add_service(&self, name: impl Into<String>, gross_price: Amount) -> CatalogService {
            let service = CatalogService {
                id: ServiceId::new_v7(),
                name: name.into(),
                gross_price,
            };
            self.state
                .lock()
                .await
                .services
                .insert(service.id, service.clone());
            service
        }

        /// Changes the catalog price of a service
        pub async fn set_service_price(&self, id: ServiceId, gross_price: Amount) {
            if let Some(service) = self.state.lock().await.services.get_mut(&id) {
                service.gross_price = gross_price;
            }
        }

        /// Makes every subsequent call fail with a connection error
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        fn check_available(&self) -> Result<(), PortError> {
            if self.unavailable.load(Ordering::SeqCst) {
                Err(PortError::connection("in-memory store is unavailable"))
            } else {
                Ok(())
            }
        }
    }

    impl DomainPort for InMemoryBillingStore {}

    #[async_trait]
    impl HealthCheckable for InMemoryBillingStore {
        async fn health_check(&self) -> HealthCheckResult {
            let status = if self.unavailable.load(Ordering::SeqCst) {
                AdapterHealth::Unhealthy
            } else {
                AdapterHealth::Healthy
            };
            HealthCheckResult {
                adapter_id: "in-memory-billing-store".to_string(),
                status,
                latency_ms: 0,
                message: None,
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl InstallmentStore for InMemoryBillingStore {
        async fn load_schedule(&self, case_id: CaseId) -> Result<InstallmentSchedule, PortError> {
            self.check_available()?;
            let state = self.state.lock().await;
            state.require_case(case_id)?;
            Ok(state.schedule(case_id))
        }

        async fn get_installment(&self, id: InstallmentId) -> Result<Installment, PortError> {
            self.check_available()?;
            self.state
                .lock()
                .await
                .installments
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Installment", id))
        }

        async fn edit_schedule(
            &self,
            case_id: CaseId,
            edit: ScheduleEdit,
        ) -> Result<EditedSchedule, BillingError> {
            self.check_available()?;
            self.state.lock().await.apply_schedule_edit(case_id, edit)
        }
    }

    #[async_trait]
    impl InvoiceStore for InMemoryBillingStore {
        async fn insert_invoice(&self, mut invoice: Invoice) -> Result<Invoice, PortError> {
            self.check_available()?;
            let mut state = self.state.lock().await;
            state.require_case(invoice.case_id)?;

            if let Some(installment_id) = invoice.installment_id {
                let belongs = state
                    .installments
                    .get(&installment_id)
                    .is_some_and(|i| i.case_id == invoice.case_id);
                if !belongs {
                    return Err(PortError::not_found("Installment", installment_id));
                }
            }
            if state.invoices.contains_key(&invoice.id) {
                return Err(PortError::conflict(format!("Invoice {} already exists", invoice.id)));
            }

            state.number_if_sent(&mut invoice);
            state.invoices.insert(invoice.id, invoice.clone());
            Ok(invoice)
        }

        async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError> {
            self.check_available()?;
            self.state
                .lock()
                .await
                .invoices
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Invoice", id))
        }

        async fn list_invoices(&self, case_id: CaseId) -> Result<Vec<Invoice>, PortError> {
            self.check_available()?;
            let state = self.state.lock().await;
            state.require_case(case_id)?;

            let mut invoices: Vec<Invoice> = state
                .invoices
                .values()
                .filter(|i| i.case_id == case_id)
                .cloned()
                .collect();
            invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.as_uuid().cmp(a.id.as_uuid())));
            Ok(invoices)
        }

        async fn edit_invoice(&self, id: InvoiceId, edit: InvoiceEdit) -> Result<Invoice, BillingError> {
            self.check_available()?;
            let mut state = self.state.lock().await;

            let mut invoice = state
                .invoices
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Invoice", id))?;

            let effect = edit(&mut invoice)?;
            state.number_if_sent(&mut invoice);

            if let InvoiceEffect::SettleInstallment(installment_id) = effect {
                let installment = state
                    .installments
                    .get_mut(&installment_id)
                    .ok_or_else(|| PortError::not_found("Installment", installment_id))?;
                installment.paid = true;
                installment.updated_at = Utc::now();
            }

            state.invoices.insert(id, invoice.clone());
            Ok(invoice)
        }

        async fn delete_invoice(&self, id: InvoiceId) -> Result<(), PortError> {
            self.check_available()?;
            self.state
                .lock()
                .await
                .invoices
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| PortError::not_found("Invoice", id))
        }
    }

    #[async_trait]
    impl ServiceCatalog for InMemoryBillingStore {
        async fn get_service(&self, id: ServiceId) -> Result<CatalogService, PortError> {
            self.check_available()?;
            self.state
                .lock()
                .await
                .services
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Service", id))
        }

        async fn list_services(&self) -> Result<Vec<CatalogService>, PortError> {
            self.check_available()?;
            let mut services: Vec<CatalogService> =
                self.state.lock().await.services.values().cloned().collect();
            services.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.as_uuid().cmp(b.id.as_uuid())));
            Ok(services)
        }

        async fn attach_service(
            &self,
            case_id: CaseId,
            service_id: ServiceId,
            edit: ScheduleEdit,
        ) -> Result<(ServiceAttachment, EditedSchedule), BillingError> {
            self.check_available()?;
            let mut state = self.state.lock().await;
            state.require_case(case_id)?;
            if !state.services.contains_key(&service_id) {
                return Err(PortError::not_found("Service", service_id).into());
            }

            let edited = state.apply_schedule_edit(case_id, edit)?;
            let attachment = ServiceAttachment::new(case_id, service_id);
            state.attachments.push(attachment.clone());
            Ok((attachment, edited))
        }

        async fn get_attachment(&self, id: AttachmentId) -> Result<AttachedService, PortError> {
            self.check_available()?;
            let state = self.state.lock().await;
            let attachment = state
                .attachments
                .iter()
                .find(|a| a.id == id)
                .ok_or_else(|| PortError::not_found("Attachment", id))?;
            state.attached(attachment)
        }

        async fn remove_attachment(
            &self,
            id: AttachmentId,
            edit: ScheduleEdit,
        ) -> Result<EditedSchedule, BillingError> {
            self.check_available()?;
            let mut state = self.state.lock().await;
            let index = state
                .attachments
                .iter()
                .position(|a| a.id == id)
                .ok_or_else(|| PortError::not_found("Attachment", id))?;

            let case_id = state.attachments[index].case_id;
            let edited = state.apply_schedule_edit(case_id, edit)?;
            state.attachments.remove(index);
            Ok(edited)
        }

        async fn attached_services(&self, case_id: CaseId) -> Result<Vec<AttachedService>, PortError> {
            self.check_available()?;
            let state = self.state.lock().await;
            state.require_case(case_id)?;
            state
                .attachments
                .iter()
                .filter(|a| a.case_id == case_id)
                .map(|a| state.attached(a))
                .collect()
        }
    }
}
