//! Invoice DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use domain_billing::Invoice;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub installment_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255, message = "Invoice name must be 1 to 255 characters"))]
    pub invoice_name: String,
    pub amount: Decimal,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub case_id: Uuid,
    pub installment_id: Option<Uuid>,
    pub invoice_name: String,
    pub invoice_number: Option<String>,
    pub amount: Decimal,
    pub due_date: Option<NaiveDate>,
    pub status: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: invoice.id.into(),
            case_id: invoice.case_id.into(),
            installment_id: invoice.installment_id.map(Uuid::from),
            invoice_name: invoice.invoice_name,
            invoice_number: invoice.invoice_number,
            amount: invoice.amount.value(),
            due_date: invoice.due_date,
            status: invoice.status.to_string(),
            sent_at: invoice.sent_at,
            paid_at: invoice.paid_at,
            created_at: invoice.created_at,
        }
    }
}
