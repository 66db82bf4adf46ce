//! Service catalog and attachment DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use domain_billing::{AttachedService, CatalogService};

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub service_id: Uuid,
    pub name: String,
    pub gross_price: Decimal,
}

impl From<CatalogService> for ServiceResponse {
    fn from(service: CatalogService) -> Self {
        Self {
            service_id: service.id.into(),
            name: service.name,
            gross_price: service.gross_price.value(),
        }
    }
}

/// A service attached to a case, priced at its current catalog price
#[derive(Debug, Serialize, Deserialize)]
pub struct AttachedServiceResponse {
    pub attachment_id: Uuid,
    pub service_id: Uuid,
    pub name: String,
    pub gross_price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<AttachedService> for AttachedServiceResponse {
    fn from(attached: AttachedService) -> Self {
        Self {
            attachment_id: attached.attachment.id.into(),
            service_id: attached.attachment.service_id.into(),
            name: attached.name,
            gross_price: attached.gross_price.value(),
            created_at: attached.attachment.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AttachServiceRequest {
    pub service_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttachmentResponse {
    pub attachment_id: Uuid,
    pub service_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Down payment amount after the change
    pub down_payment: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownPaymentResponse {
    pub down_payment: Decimal,
}
