//! Core Kernel - Foundational types shared by the billing engine crates
//!
//! This crate provides the building blocks used across the workspace:
//! - Strongly-typed identifiers for cases, installments, invoices and services
//! - A single-currency `Amount` with precise decimal arithmetic
//! - Port infrastructure for the hexagonal (ports and adapters) architecture

pub mod money;
pub mod identifiers;
pub mod ports;

pub use money::{Amount, MoneyError};
pub use identifiers::{CaseId, InstallmentId, InvoiceId, ServiceId, AttachmentId};
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
};
