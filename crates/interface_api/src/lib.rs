//! HTTP API Layer
//!
//! This crate provides the REST API for the case billing engine using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers for installments, services and invoices
//! - **Middleware**: Tracing and audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: Consistent `{ "error": ... }` responses, including
//!   rejected bodies and path segments (`extract`)
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let state = AppState::from_adapter(Arc::new(PostgresBillingAdapter::new(pool)), config);
//! axum::serve(listener, create_router(state)).await?;
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod handlers;
pub mod dto;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put, delete},
    middleware as axum_middleware,
};
use tower_http::trace::TraceLayer;
use tower_http::cors::{CorsLayer, Any};

use core_kernel::HealthCheckable;
use domain_billing::{BillingEngine, InstallmentStore, InvoiceStore, ServiceCatalog};

use crate::config::ApiConfig;
use crate::middleware::audit_middleware;
use crate::handlers::{health, installments, invoices, services};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: BillingEngine,
    pub health: Arc<dyn HealthCheckable>,
    pub config: ApiConfig,
}

impl AppState {
    /// Wires the engine and the readiness probe to one storage adapter
    pub fn from_adapter<A>(adapter: Arc<A>, config: ApiConfig) -> Self
    where
        A: InstallmentStore + InvoiceStore + ServiceCatalog + HealthCheckable,
    {
        Self {
            engine: BillingEngine::from_adapter(adapter.clone()),
            health: adapter,
            config,
        }
    }
}

/// Creates the main API router
///
/// # Arguments
///
/// * `state` - Billing engine, health probe and configuration
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    // Public routes
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    // Case-scoped routes
    let case_routes = Router::new()
        .route("/:case_id/installments", get(installments::list_installments))
        .route("/:case_id/installments", post(installments::add_installment))
        .route("/:case_id/installments/initialize", post(installments::initialize))
        .route(
            "/:case_id/installments/:installment_id/send-invoice",
            post(invoices::send_invoice_for_installment),
        )
        .route("/:case_id/services", get(services::list_attached_services))
        .route("/:case_id/services", post(services::attach_service))
        .route("/:case_id/services/:attachment_id", delete(services::detach_service))
        .route("/:case_id/invoices", get(invoices::list_invoices))
        .route("/:case_id/invoices", post(invoices::create_invoice));

    // Catalog routes
    let service_routes = Router::new()
        .route("/", get(services::list_services));

    // Installment routes
    let installment_routes = Router::new()
        .route("/:id", put(installments::update_installment))
        .route("/:id", delete(installments::delete_installment))
        .route("/:id/merge", post(installments::merge_installment));

    // Invoice routes
    let invoice_routes = Router::new()
        .route("/:id", delete(invoices::delete_invoice))
        .route("/:id/send", post(invoices::send_invoice))
        .route("/:id/status", put(invoices::update_status));

    let api_routes = Router::new()
        .nest("/cases", case_routes)
        .nest("/services", service_routes)
        .nest("/installments", installment_routes)
        .nest("/invoices", invoice_routes)
        .layer(axum_middleware::from_fn(audit_middleware));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
