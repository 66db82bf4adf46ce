//! Infrastructure Database Layer
//!
//! This crate provides the PostgreSQL persistence for the case billing
//! engine using SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: `repositories` holds the SQL and
//! the row types, `adapters` maps rows onto the billing domain and implements
//! its port traits. Schema migrations live in the workspace `migrations/`
//! directory and are embedded with `sqlx::migrate!`.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig};
//! use infra_db::adapters::PostgresBillingAdapter;
//!
//! let pool = create_pool(&DatabaseConfig::new("postgres://localhost/case_billing")).await?;
//! run_migrations(&pool).await?;
//! let adapter = PostgresBillingAdapter::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use adapters::PostgresBillingAdapter;
