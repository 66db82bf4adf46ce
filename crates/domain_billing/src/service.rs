//! Catalog services and their attachment to cases
//!
//! Attachments carry no amount of their own: the price that feeds the down
//! payment is always read live from the catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Amount, AttachmentId, CaseId, ServiceId};

/// A service offered in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogService {
    pub id: ServiceId,
    pub name: String,
    /// Fixed gross price
    pub gross_price: Amount,
}

/// Link between a case and a catalog service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAttachment {
    pub id: AttachmentId,
    pub case_id: CaseId,
    pub service_id: ServiceId,
    pub created_at: DateTime<Utc>,
}

impl ServiceAttachment {
    pub fn new(case_id: CaseId, service_id: ServiceId) -> Self {
        Self {
            id: AttachmentId::new_v7(),
            case_id,
            service_id,
            created_at: Utc::now(),
        }
    }
}

/// An attachment joined with the current catalog data of its service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedService {
    pub attachment: ServiceAttachment,
    pub name: String,
    pub gross_price: Amount,
}

impl AttachedService {
    pub fn join(attachment: ServiceAttachment, service: &CatalogService) -> Self {
        Self {
            attachment,
            name: service.name.clone(),
            gross_price: service.gross_price,
        }
    }
}
