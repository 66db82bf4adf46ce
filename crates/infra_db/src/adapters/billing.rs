//! PostgreSQL Billing Adapter
//!
//! This module provides the internal (database) adapter for the billing
//! domain, implementing `InstallmentStore`, `InvoiceStore` and
//! `ServiceCatalog` on top of the `BillingRepository`.
//!
//! # Units of work
//!
//! `edit_schedule` locks the case row (`SELECT ... FOR UPDATE`), loads the
//! full schedule, applies the domain edit in memory and writes back only the
//! rows that changed, all in one transaction. The `(case_id, position)`
//! unique constraint is deferred to commit, so recompaction can shift
//! positions in any order. Attaching and detaching a service run the same
//! schedule edit in the transaction that writes the attachment.
//! `edit_invoice` locks the invoice row, numbers it if it was just sent and
//! settles the linked installment before committing.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresBillingAdapter;
//! use domain_billing::BillingEngine;
//! use std::sync::Arc;
//!
//! let adapter = Arc::new(PostgresBillingAdapter::new(pool));
//! let engine = BillingEngine::from_adapter(adapter);
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use core_kernel::{
    AdapterHealth, Amount, AttachmentId, CaseId, DomainPort, HealthCheckResult, HealthCheckable,
    InstallmentId, InvoiceId, PortError, ServiceId,
};
use domain_billing::ports::{EditedSchedule, InvoiceEdit, ScheduleEdit};
use domain_billing::{
    AttachedService, BillingError, CatalogService, Installment, InstallmentSchedule, InstallmentStore,
    Invoice, InvoiceEffect, InvoiceStatus, InvoiceStore, ServiceAttachment, ServiceCatalog,
};

use crate::error::DatabaseError;
use crate::repositories::billing::{
    AttachedServiceRow, AttachmentRow, BillingRepository, InstallmentRow, InvoiceRow,
    InvoiceStatus as DbInvoiceStatus, ServiceRow,
};

const ADAPTER_ID: &str = "postgres-billing-adapter";

/// PostgreSQL-backed implementation of the billing ports
///
/// # Error Handling
///
/// Database errors are translated to `PortError` variants:
/// - `DatabaseError::NotFound` -> `PortError::NotFound`
/// - `DatabaseError::ForeignKeyViolation` -> `PortError::Validation`
/// - Unique/check violations and serialization failures -> `PortError::Conflict`
/// - Connection errors -> `PortError::Connection`
/// - Other errors -> `PortError::Internal`
#[derive(Debug, Clone)]
pub struct PostgresBillingAdapter {
    repository: BillingRepository,
}

impl PostgresBillingAdapter {
    /// Creates a new PostgreSQL billing adapter
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: BillingRepository::new(pool),
        }
    }

    /// Returns a reference to the underlying repository
    pub fn repository(&self) -> &BillingRepository {
        &self.repository
    }

    /// Registers a case owned by the case management side
    pub async fn register_case(&self, case_id: CaseId) -> Result<(), PortError> {
        self.repository
            .create_case(case_id.into())
            .await
            .map_err(db_to_port_error)
    }

    /// Adds a service to the catalog
    pub async fn add_service(&self, name: &str, gross_price: Amount) -> Result<CatalogService, PortError> {
        let row = self
            .repository
            .create_service(name, gross_price.value())
            .await
            .map_err(db_to_port_error)?;
        row_to_service(row)
    }

    /// Locks the case, applies `edit` to its schedule and writes back the
    /// changed rows on `conn`
    ///
    /// The caller owns the transaction and commits it.
    async fn apply_schedule_edit(
        &self,
        conn: &mut PgConnection,
        case_id: CaseId,
        edit: ScheduleEdit,
    ) -> Result<EditedSchedule, BillingError> {
        self.repository
            .lock_case(conn, case_id.into())
            .await
            .map_err(db_to_port_error)?;
        let before = self
            .repository
            .fetch_installments(conn, case_id.into())
            .await
            .map_err(db_to_port_error)?;

        let installments: Vec<Installment> = before
            .iter()
            .cloned()
            .map(row_to_installment)
            .collect::<Result<_, _>>()?;
        let mut schedule = InstallmentSchedule::from_rows(case_id, installments);

        let touched = edit(&mut schedule)?;

        let after: Vec<InstallmentRow> = schedule.installments().iter().map(installment_to_row).collect();
        let original: HashMap<Uuid, &InstallmentRow> =
            before.iter().map(|row| (row.installment_id, row)).collect();

        let removed: Vec<Uuid> = before
            .iter()
            .map(|row| row.installment_id)
            .filter(|id| !after.iter().any(|row| row.installment_id == *id))
            .collect();
        self.repository
            .delete_installments(conn, &removed)
            .await
            .map_err(db_to_port_error)?;

        let mut written = 0usize;
        for row in after.iter().filter(|row| original.get(&row.installment_id) != Some(row)) {
            self.repository
                .upsert_installment(conn, row)
                .await
                .map_err(db_to_port_error)?;
            written += 1;
        }

        debug!(removed = removed.len(), written, "Schedule edit applied");
        Ok(EditedSchedule { schedule, touched })
    }

    /// Gives a sent invoice without a number the next one from the sequence
    async fn number_if_sent(&self, conn: &mut PgConnection, invoice: &mut Invoice) -> Result<(), PortError> {
        if invoice.status == InvoiceStatus::Sent && invoice.invoice_number.is_none() {
            let value = self
                .repository
                .next_invoice_sequence(conn)
                .await
                .map_err(db_to_port_error)?;
            invoice.invoice_number = Some(format_invoice_number(value));
        }
        Ok(())
    }
}

// Mark as a domain port
impl DomainPort for PostgresBillingAdapter {}

#[async_trait]
impl HealthCheckable for PostgresBillingAdapter {
    /// Runs `SELECT 1` against the pool
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let result = self.repository.ping().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(()) => (AdapterHealth::Healthy, None),
            Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
        };

        HealthCheckResult {
            adapter_id: ADAPTER_ID.to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl InstallmentStore for PostgresBillingAdapter {
    #[instrument(skip(self), fields(case_id = %case_id))]
    async fn load_schedule(&self, case_id: CaseId) -> Result<InstallmentSchedule, PortError> {
        if !self
            .repository
            .case_exists(case_id.into())
            .await
            .map_err(db_to_port_error)?
        {
            return Err(PortError::not_found("Case", case_id));
        }

        let rows = self
            .repository
            .find_installments(case_id.into())
            .await
            .map_err(db_to_port_error)?;
        let installments: Vec<Installment> =
            rows.into_iter().map(row_to_installment).collect::<Result<_, _>>()?;
        Ok(InstallmentSchedule::from_rows(case_id, installments))
    }

    #[instrument(skip(self), fields(installment_id = %id))]
    async fn get_installment(&self, id: InstallmentId) -> Result<Installment, PortError> {
        let row = self
            .repository
            .find_installment(id.into())
            .await
            .map_err(db_to_port_error)?;
        row_to_installment(row)
    }

    #[instrument(skip(self, edit), fields(case_id = %case_id))]
    async fn edit_schedule(
        &self,
        case_id: CaseId,
        edit: ScheduleEdit,
    ) -> Result<EditedSchedule, BillingError> {
        let mut tx = self.repository.begin().await.map_err(db_to_port_error)?;

        // An error here drops the transaction, which rolls it back
        let edited = self.apply_schedule_edit(&mut tx, case_id, edit).await?;

        tx.commit()
            .await
            .map_err(|e| db_to_port_error(DatabaseError::from(e)))?;
        Ok(edited)
    }
}

#[async_trait]
impl InvoiceStore for PostgresBillingAdapter {
    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id, case_id = %invoice.case_id))]
    async fn insert_invoice(&self, mut invoice: Invoice) -> Result<Invoice, PortError> {
        if !self
            .repository
            .case_exists(invoice.case_id.into())
            .await
            .map_err(db_to_port_error)?
        {
            return Err(PortError::not_found("Case", invoice.case_id));
        }

        if let Some(installment_id) = invoice.installment_id {
            let installment = self
                .repository
                .find_installment(installment_id.into())
                .await
                .map_err(db_to_port_error)?;
            if installment.case_id != Uuid::from(invoice.case_id) {
                return Err(PortError::not_found("Installment", installment_id));
            }
        }

        let mut tx = self.repository.begin().await.map_err(db_to_port_error)?;
        self.number_if_sent(&mut tx, &mut invoice).await?;
        self.repository
            .insert_invoice(&mut tx, &invoice_to_row(&invoice))
            .await
            .map_err(db_to_port_error)?;
        tx.commit()
            .await
            .map_err(|e| db_to_port_error(DatabaseError::from(e)))?;
        Ok(invoice)
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError> {
        let row = self
            .repository
            .find_invoice(id.into())
            .await
            .map_err(db_to_port_error)?;
        row_to_invoice(row)
    }

    #[instrument(skip(self), fields(case_id = %case_id))]
    async fn list_invoices(&self, case_id: CaseId) -> Result<Vec<Invoice>, PortError> {
        if !self
            .repository
            .case_exists(case_id.into())
            .await
            .map_err(db_to_port_error)?
        {
            return Err(PortError::not_found("Case", case_id));
        }

        self.repository
            .find_invoices_by_case(case_id.into())
            .await
            .map_err(db_to_port_error)?
            .into_iter()
            .map(row_to_invoice)
            .collect()
    }

    #[instrument(skip(self, edit), fields(invoice_id = %id))]
    async fn edit_invoice(&self, id: InvoiceId, edit: InvoiceEdit) -> Result<Invoice, BillingError> {
        let mut tx = self.repository.begin().await.map_err(db_to_port_error)?;

        let row = self
            .repository
            .lock_invoice(&mut tx, id.into())
            .await
            .map_err(db_to_port_error)?;
        let mut invoice = row_to_invoice(row)?;

        let effect = edit(&mut invoice)?;
        self.number_if_sent(&mut tx, &mut invoice).await?;

        self.repository
            .update_invoice(&mut tx, &invoice_to_row(&invoice))
            .await
            .map_err(db_to_port_error)?;

        if let InvoiceEffect::SettleInstallment(installment_id) = effect {
            self.repository
                .mark_installment_paid(&mut tx, installment_id.into())
                .await
                .map_err(db_to_port_error)?;
            debug!(installment_id = %installment_id, "Installment settled");
        }

        tx.commit()
            .await
            .map_err(|e| db_to_port_error(DatabaseError::from(e)))?;
        Ok(invoice)
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn delete_invoice(&self, id: InvoiceId) -> Result<(), PortError> {
        self.repository
            .delete_invoice(id.into())
            .await
            .map_err(db_to_port_error)
    }
}

#[async_trait]
impl ServiceCatalog for PostgresBillingAdapter {
    #[instrument(skip(self), fields(service_id = %id))]
    async fn get_service(&self, id: ServiceId) -> Result<CatalogService, PortError> {
        let row = self
            .repository
            .find_service(id.into())
            .await
            .map_err(db_to_port_error)?;
        row_to_service(row)
    }

    #[instrument(skip(self))]
    async fn list_services(&self) -> Result<Vec<CatalogService>, PortError> {
        self.repository
            .find_services()
            .await
            .map_err(db_to_port_error)?
            .into_iter()
            .map(row_to_service)
            .collect()
    }

    #[instrument(skip(self, edit), fields(case_id = %case_id, service_id = %service_id))]
    async fn attach_service(
        &self,
        case_id: CaseId,
        service_id: ServiceId,
        edit: ScheduleEdit,
    ) -> Result<(ServiceAttachment, EditedSchedule), BillingError> {
        self.repository
            .find_service(service_id.into())
            .await
            .map_err(db_to_port_error)?;

        let mut tx = self.repository.begin().await.map_err(db_to_port_error)?;
        let edited = self.apply_schedule_edit(&mut tx, case_id, edit).await?;

        let attachment = ServiceAttachment::new(case_id, service_id);
        self.repository
            .insert_attachment(
                &mut tx,
                &AttachmentRow {
                    case_service_id: attachment.id.into(),
                    case_id: case_id.into(),
                    service_id: service_id.into(),
                    created_at: attachment.created_at,
                },
            )
            .await
            .map_err(db_to_port_error)?;

        tx.commit()
            .await
            .map_err(|e| db_to_port_error(DatabaseError::from(e)))?;
        Ok((attachment, edited))
    }

    #[instrument(skip(self), fields(attachment_id = %id))]
    async fn get_attachment(&self, id: AttachmentId) -> Result<AttachedService, PortError> {
        let row = self
            .repository
            .find_attachment(id.into())
            .await
            .map_err(db_to_port_error)?;
        row_to_attached(row)
    }

    #[instrument(skip(self, edit), fields(attachment_id = %id))]
    async fn remove_attachment(
        &self,
        id: AttachmentId,
        edit: ScheduleEdit,
    ) -> Result<EditedSchedule, BillingError> {
        let case_id = self
            .repository
            .find_attachment(id.into())
            .await
            .map_err(db_to_port_error)?
            .case_id;

        let mut tx = self.repository.begin().await.map_err(db_to_port_error)?;
        let edited = self.apply_schedule_edit(&mut tx, CaseId::from(case_id), edit).await?;
        // Fails with NotFound if a concurrent detach got there first
        self.repository
            .delete_attachment(&mut tx, id.into())
            .await
            .map_err(db_to_port_error)?;

        tx.commit()
            .await
            .map_err(|e| db_to_port_error(DatabaseError::from(e)))?;
        Ok(edited)
    }

    #[instrument(skip(self), fields(case_id = %case_id))]
    async fn attached_services(&self, case_id: CaseId) -> Result<Vec<AttachedService>, PortError> {
        if !self
            .repository
            .case_exists(case_id.into())
            .await
            .map_err(db_to_port_error)?
        {
            return Err(PortError::not_found("Case", case_id));
        }

        self.repository
            .find_attachments_by_case(case_id.into())
            .await
            .map_err(db_to_port_error)?
            .into_iter()
            .map(row_to_attached)
            .collect()
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Converts a database error to a port error
pub fn db_to_port_error(e: DatabaseError) -> PortError {
    match e {
        DatabaseError::NotFound { entity, id } => PortError::not_found(entity, id),
        DatabaseError::ForeignKeyViolation(message) => PortError::validation(message),
        DatabaseError::DuplicateEntry(message)
        | DatabaseError::ConstraintViolation(message)
        | DatabaseError::TransactionFailed(message) => PortError::conflict(message),
        e if e.is_connection_error() => PortError::Connection {
            message: e.to_string(),
            source: Some(Box::new(e)),
        },
        e => {
            error!(error = %e, "Unexpected database error");
            PortError::Internal {
                message: e.to_string(),
                source: Some(Box::new(e)),
            }
        }
    }
}

/// Formats a sequence value as an invoice number, e.g. `INV0000042`
pub fn format_invoice_number(value: i64) -> String {
    format!("INV{:07}", value)
}

fn corrupt(entity: &str, id: Uuid, detail: impl std::fmt::Display) -> PortError {
    db_to_port_error(DatabaseError::CorruptRow(format!("{} {}: {}", entity, id, detail)))
}

fn row_to_installment(row: InstallmentRow) -> Result<Installment, PortError> {
    let amount = Amount::new(row.amount).map_err(|e| corrupt("installment", row.installment_id, e))?;
    let position = u32::try_from(row.position).map_err(|e| corrupt("installment", row.installment_id, e))?;

    Ok(Installment {
        id: InstallmentId::from(row.installment_id),
        case_id: CaseId::from(row.case_id),
        amount,
        due_date: row.due_date,
        position,
        is_down_payment: row.is_down_payment,
        automatic_invoice: row.automatic_invoice,
        paid: row.paid,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn installment_to_row(installment: &Installment) -> InstallmentRow {
    InstallmentRow {
        installment_id: installment.id.into(),
        case_id: installment.case_id.into(),
        amount: installment.amount.value(),
        due_date: installment.due_date,
        // Positions are recompacted to 1..=N, far below i32::MAX
        position: installment.position as i32,
        is_down_payment: installment.is_down_payment,
        automatic_invoice: installment.automatic_invoice,
        paid: installment.paid,
        created_at: installment.created_at,
        updated_at: installment.updated_at,
    }
}

fn db_to_domain_status(status: DbInvoiceStatus) -> InvoiceStatus {
    match status {
        DbInvoiceStatus::Draft => InvoiceStatus::Draft,
        DbInvoiceStatus::Sent => InvoiceStatus::Sent,
        DbInvoiceStatus::Viewed => InvoiceStatus::Viewed,
        DbInvoiceStatus::Paid => InvoiceStatus::Paid,
        DbInvoiceStatus::Overdue => InvoiceStatus::Overdue,
        DbInvoiceStatus::Cancelled => InvoiceStatus::Cancelled,
    }
}

fn domain_to_db_status(status: InvoiceStatus) -> DbInvoiceStatus {
    match status {
        InvoiceStatus::Draft => DbInvoiceStatus::Draft,
        InvoiceStatus::Sent => DbInvoiceStatus::Sent,
        InvoiceStatus::Viewed => DbInvoiceStatus::Viewed,
        InvoiceStatus::Paid => DbInvoiceStatus::Paid,
        InvoiceStatus::Overdue => DbInvoiceStatus::Overdue,
        InvoiceStatus::Cancelled => DbInvoiceStatus::Cancelled,
    }
}

fn row_to_invoice(row: InvoiceRow) -> Result<Invoice, PortError> {
    let amount = Amount::new(row.amount).map_err(|e| corrupt("invoice", row.invoice_id, e))?;

    Ok(Invoice {
        id: InvoiceId::from(row.invoice_id),
        case_id: CaseId::from(row.case_id),
        installment_id: row.installment_id.map(InstallmentId::from),
        invoice_name: row.invoice_name,
        invoice_number: row.invoice_number,
        amount,
        due_date: row.due_date,
        status: db_to_domain_status(row.status),
        sent_at: row.sent_at,
        paid_at: row.paid_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn invoice_to_row(invoice: &Invoice) -> InvoiceRow {
    InvoiceRow {
        invoice_id: invoice.id.into(),
        case_id: invoice.case_id.into(),
        installment_id: invoice.installment_id.map(Uuid::from),
        invoice_name: invoice.invoice_name.clone(),
        invoice_number: invoice.invoice_number.clone(),
        amount: invoice.amount.value(),
        due_date: invoice.due_date,
        status: domain_to_db_status(invoice.status),
        sent_at: invoice.sent_at,
        paid_at: invoice.paid_at,
        created_at: invoice.created_at,
        updated_at: invoice.updated_at,
    }
}

fn row_to_service(row: ServiceRow) -> Result<CatalogService, PortError> {
    let gross_price = Amount::new(row.gross_price).map_err(|e| corrupt("service", row.service_id, e))?;
    Ok(CatalogService {
        id: ServiceId::from(row.service_id),
        name: row.name,
        gross_price,
    })
}

fn row_to_attached(row: AttachedServiceRow) -> Result<AttachedService, PortError> {
    let gross_price = Amount::new(row.gross_price).map_err(|e| corrupt("service", row.service_id, e))?;
    Ok(AttachedService {
        attachment: ServiceAttachment {
            id: AttachmentId::from(row.case_service_id),
            case_id: CaseId::from(row.case_id),
            service_id: ServiceId::from(row.service_id),
            created_at: row.created_at,
        },
        name: row.name,
        gross_price,
    })
}
