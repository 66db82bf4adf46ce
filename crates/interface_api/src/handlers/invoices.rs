//! Invoice handlers

use axum::{extract::State, http::StatusCode, Json};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{Amount, CaseId, InstallmentId, InvoiceId};
use domain_billing::{InvoiceStatus, NewInvoice};

use crate::{AppState, error::ApiError};
use crate::extract::{ApiJson, ApiPath};
use crate::dto::{DataResponse, SuccessResponse};
use crate::dto::invoice::*;

/// Lists a case's invoices, newest first
pub async fn list_invoices(
    State(state): State<AppState>,
    ApiPath(case_id): ApiPath<Uuid>,
) -> Result<Json<DataResponse<Vec<InvoiceResponse>>>, ApiError> {
    let invoices = state
        .engine
        .invoices
        .list_for_case(CaseId::from(case_id))
        .await
        .map_err(ApiError::failed("list invoices"))?;

    Ok(Json(DataResponse::new(
        invoices.into_iter().map(InvoiceResponse::from).collect(),
    )))
}

/// Creates a draft invoice
pub async fn create_invoice(
    State(state): State<AppState>,
    ApiPath(case_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<DataResponse<InvoiceResponse>>), ApiError> {
    request.validate()?;

    let invoice = state
        .engine
        .invoices
        .create(NewInvoice {
            case_id: CaseId::from(case_id),
            installment_id: request.installment_id.map(InstallmentId::from),
            invoice_name: request.invoice_name,
            amount: Amount::new(request.amount)?,
            due_date: request.due_date,
        })
        .await
        .map_err(ApiError::failed("create invoice"))?;

    Ok((StatusCode::CREATED, Json(DataResponse::new(invoice.into()))))
}

/// Creates and sends an invoice for one installment of the case
pub async fn send_invoice_for_installment(
    State(state): State<AppState>,
    ApiPath((case_id, installment_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<DataResponse<InvoiceResponse>>), ApiError> {
    let invoice = state
        .engine
        .facade
        .send_invoice_for_installment(CaseId::from(case_id), InstallmentId::from(installment_id))
        .await
        .map_err(ApiError::failed("send invoice"))?;

    Ok((StatusCode::CREATED, Json(DataResponse::new(invoice.into()))))
}

/// Sends a draft invoice
pub async fn send_invoice(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<DataResponse<InvoiceResponse>>, ApiError> {
    let invoice = state
        .engine
        .invoices
        .send(InvoiceId::from(id))
        .await
        .map_err(ApiError::failed("send invoice"))?;

    Ok(Json(DataResponse::new(invoice.into())))
}

/// Moves an invoice to another status
pub async fn update_status(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateStatusRequest>,
) -> Result<Json<DataResponse<InvoiceResponse>>, ApiError> {
    let status: InvoiceStatus = request
        .status
        .parse()
        .map_err(ApiError::failed("update invoice status"))?;

    let invoice = state
        .engine
        .invoices
        .update_status(InvoiceId::from(id), status)
        .await
        .map_err(ApiError::failed("update invoice status"))?;

    Ok(Json(DataResponse::new(invoice.into())))
}

/// Deletes an invoice
pub async fn delete_invoice(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .engine
        .invoices
        .delete(InvoiceId::from(id))
        .await
        .map_err(ApiError::failed("delete invoice"))?;

    Ok(Json(SuccessResponse::ok()))
}
