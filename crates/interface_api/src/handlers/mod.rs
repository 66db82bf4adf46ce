//! Request handlers, one module per resource

pub mod health;
pub mod installments;
pub mod invoices;
pub mod services;
