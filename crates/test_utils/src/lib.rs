//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! case billing test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built test data and seeded in-memory engines
//! - `builders`: Builder patterns for test data construction
//! - `database`: PostgreSQL container management for adapter tests
//! - `assertions`: Schedule invariant checks with readable failures
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
