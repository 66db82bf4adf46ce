//! Billing Domain - Case Installments and Invoices
//!
//! This crate implements the billing engine of a case: the ordered list of
//! payment installments, the automatic down-payment adjustment driven by
//! attached services, and the invoice lifecycle.
//!
//! # Components
//!
//! - **InstallmentLedger**: creation, edits, deletion with position
//!   recompaction, and merging of installments
//! - **ServicePriceAggregator**: keeps the down payment in step with the
//!   gross prices of attached services
//! - **InvoiceLifecycle**: invoice creation and the status state machine,
//!   including the paid cascade onto the installment
//! - **CaseBillingFacade**: "send an invoice for this installment"
//!
//! # Invariants
//!
//! - Every case has exactly one down payment and it cannot be deleted
//! - Installment positions of a case are always `1..=N`
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::BillingEngine;
//!
//! let engine = BillingEngine::from_adapter(adapter);
//!
//! engine.ledger.initialize(case_id).await?;
//! engine.pricing.attach_service(case_id, service_id).await?;
//!
//! let down_payment = engine.ledger.list(case_id).await?.remove(0);
//! let invoice = engine
//!     .facade
//!     .send_invoice_for_installment(case_id, down_payment.id)
//!     .await?;
//! ```

pub mod error;
pub mod installment;
pub mod invoice;
pub mod service;
pub mod ports;
pub mod ledger;
pub mod pricing;
pub mod lifecycle;
pub mod facade;

pub use error::BillingError;
pub use installment::{Installment, InstallmentChanges, InstallmentSchedule, NewInstallment};
pub use invoice::{Invoice, InvoiceEffect, InvoiceStatus, NewInvoice};
pub use service::{AttachedService, CatalogService, ServiceAttachment};
pub use ports::{EditedSchedule, InstallmentStore, InvoiceStore, ServiceCatalog};
pub use ledger::InstallmentLedger;
pub use pricing::ServicePriceAggregator;
pub use lifecycle::InvoiceLifecycle;
pub use facade::{BillingEngine, CaseBillingFacade};
