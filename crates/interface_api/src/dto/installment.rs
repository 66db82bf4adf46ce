//! Installment DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{Amount, MoneyError};
use domain_billing::{Installment, InstallmentChanges, NewInstallment};

#[derive(Debug, Deserialize)]
pub struct AddInstallmentRequest {
    pub amount: Decimal,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub automatic_invoice: bool,
}

impl TryFrom<AddInstallmentRequest> for NewInstallment {
    type Error = MoneyError;

    fn try_from(request: AddInstallmentRequest) -> Result<Self, Self::Error> {
        Ok(NewInstallment {
            amount: Amount::new(request.amount)?,
            due_date: request.due_date,
            automatic_invoice: request.automatic_invoice,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateInstallmentRequest {
    pub amount: Decimal,
    pub due_date: Option<NaiveDate>,
    pub automatic_invoice: bool,
}

impl TryFrom<UpdateInstallmentRequest> for InstallmentChanges {
    type Error = MoneyError;

    fn try_from(request: UpdateInstallmentRequest) -> Result<Self, Self::Error> {
        Ok(InstallmentChanges {
            amount: Amount::new(request.amount)?,
            due_date: request.due_date,
            automatic_invoice: request.automatic_invoice,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstallmentResponse {
    pub id: Uuid,
    pub case_id: Uuid,
    pub amount: Decimal,
    pub due_date: Option<NaiveDate>,
    pub position: u32,
    pub is_down_payment: bool,
    pub automatic_invoice: bool,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Installment> for InstallmentResponse {
    fn from(installment: Installment) -> Self {
        Self {
            id: installment.id.into(),
            case_id: installment.case_id.into(),
            amount: installment.amount.value(),
            due_date: installment.due_date,
            position: installment.position,
            is_down_payment: installment.is_down_payment,
            automatic_invoice: installment.automatic_invoice,
            paid: installment.paid,
            created_at: installment.created_at,
            updated_at: installment.updated_at,
        }
    }
}
