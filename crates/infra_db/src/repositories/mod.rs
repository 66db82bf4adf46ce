//! Repository implementations
//!
//! Repositories encapsulate SQL queries and return plain row types. Methods
//! that must run inside a unit of work take `&mut PgConnection`, so callers
//! pass `&mut tx` from an open transaction.

pub mod billing;

pub use billing::BillingRepository;
