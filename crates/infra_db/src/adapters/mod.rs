//! Domain Adapters
//!
//! This module provides adapter implementations for domain ports,
//! connecting domain interfaces to the PostgreSQL database layer.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresBillingAdapter;
//! use domain_billing::InstallmentStore;
//!
//! let adapter = PostgresBillingAdapter::new(pool);
//! let schedule = adapter.load_schedule(case_id).await?;
//! ```

pub mod billing;

pub use billing::PostgresBillingAdapter;
