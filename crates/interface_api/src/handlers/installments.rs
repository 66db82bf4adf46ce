//! Installment handlers

use axum::{extract::State, http::StatusCode, Json};
use uuid::Uuid;

use core_kernel::{CaseId, InstallmentId};
use domain_billing::{InstallmentChanges, NewInstallment};

use crate::{AppState, error::ApiError};
use crate::extract::{ApiJson, ApiPath};
use crate::dto::{DataResponse, SuccessResponse};
use crate::dto::installment::*;

/// Creates the down payment of a new case
pub async fn initialize(
    State(state): State<AppState>,
    ApiPath(case_id): ApiPath<Uuid>,
) -> Result<(StatusCode, Json<DataResponse<InstallmentResponse>>), ApiError> {
    let down_payment = state
        .engine
        .ledger
        .initialize(CaseId::from(case_id))
        .await
        .map_err(ApiError::failed("initialize installments"))?;

    Ok((StatusCode::CREATED, Json(DataResponse::new(down_payment.into()))))
}

/// Lists a case's installments by position
pub async fn list_installments(
    State(state): State<AppState>,
    ApiPath(case_id): ApiPath<Uuid>,
) -> Result<Json<DataResponse<Vec<InstallmentResponse>>>, ApiError> {
    let installments = state
        .engine
        .ledger
        .list(CaseId::from(case_id))
        .await
        .map_err(ApiError::failed("list installments"))?;

    Ok(Json(DataResponse::new(
        installments.into_iter().map(InstallmentResponse::from).collect(),
    )))
}

/// Appends an installment
pub async fn add_installment(
    State(state): State<AppState>,
    ApiPath(case_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<AddInstallmentRequest>,
) -> Result<(StatusCode, Json<DataResponse<InstallmentResponse>>), ApiError> {
    let new = NewInstallment::try_from(request)?;
    let installment = state
        .engine
        .ledger
        .add(CaseId::from(case_id), new)
        .await
        .map_err(ApiError::failed("add installment"))?;

    Ok((StatusCode::CREATED, Json(DataResponse::new(installment.into()))))
}

/// Updates amount, due date and automatic-invoice flag
pub async fn update_installment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateInstallmentRequest>,
) -> Result<Json<DataResponse<InstallmentResponse>>, ApiError> {
    let changes = InstallmentChanges::try_from(request)?;
    let installment = state
        .engine
        .ledger
        .update(InstallmentId::from(id), changes)
        .await
        .map_err(ApiError::failed("update installment"))?;

    Ok(Json(DataResponse::new(installment.into())))
}

/// Deletes an installment and recompacts positions
pub async fn delete_installment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .engine
        .ledger
        .delete(InstallmentId::from(id))
        .await
        .map_err(ApiError::failed("delete installment"))?;

    Ok(Json(SuccessResponse::ok()))
}

/// Folds an installment into its predecessor
///
/// Responds with the predecessor after the merge.
pub async fn merge_installment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<DataResponse<InstallmentResponse>>, ApiError> {
    let predecessor = state
        .engine
        .ledger
        .merge(InstallmentId::from(id))
        .await
        .map_err(ApiError::failed("merge installment"))?;

    Ok(Json(DataResponse::new(predecessor.into())))
}
