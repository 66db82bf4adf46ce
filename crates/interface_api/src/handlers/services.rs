//! Service catalog and attachment handlers

use axum::{extract::State, http::StatusCode, Json};
use uuid::Uuid;

use core_kernel::{AttachmentId, CaseId, ServiceId};

use crate::{AppState, error::ApiError};
use crate::extract::{ApiJson, ApiPath};
use crate::dto::DataResponse;
use crate::dto::service::*;

/// Lists the service catalog ordered by name
pub async fn list_services(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<ServiceResponse>>>, ApiError> {
    let services = state
        .engine
        .pricing
        .list_services()
        .await
        .map_err(ApiError::failed("list services"))?;

    Ok(Json(DataResponse::new(
        services.into_iter().map(ServiceResponse::from).collect(),
    )))
}

/// Lists the services attached to a case
pub async fn list_attached_services(
    State(state): State<AppState>,
    ApiPath(case_id): ApiPath<Uuid>,
) -> Result<Json<DataResponse<Vec<AttachedServiceResponse>>>, ApiError> {
    let attached = state
        .engine
        .pricing
        .attached_services(CaseId::from(case_id))
        .await
        .map_err(ApiError::failed("list attached services"))?;

    Ok(Json(DataResponse::new(
        attached.into_iter().map(AttachedServiceResponse::from).collect(),
    )))
}

/// Attaches a catalog service and raises the down payment by its price
pub async fn attach_service(
    State(state): State<AppState>,
    ApiPath(case_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<AttachServiceRequest>,
) -> Result<(StatusCode, Json<DataResponse<AttachmentResponse>>), ApiError> {
    let (attachment, down_payment) = state
        .engine
        .pricing
        .attach_service(CaseId::from(case_id), ServiceId::from(request.service_id))
        .await
        .map_err(ApiError::failed("attach service"))?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(AttachmentResponse {
            attachment_id: attachment.id.into(),
            service_id: attachment.service_id.into(),
            created_at: attachment.created_at,
            down_payment: down_payment.value(),
        })),
    ))
}

/// Detaches a service and lowers the down payment, floored at zero
pub async fn detach_service(
    State(state): State<AppState>,
    ApiPath((case_id, attachment_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<DataResponse<DownPaymentResponse>>, ApiError> {
    let down_payment = state
        .engine
        .pricing
        .detach_service(CaseId::from(case_id), AttachmentId::from(attachment_id))
        .await
        .map_err(ApiError::failed("detach service"))?;

    Ok(Json(DataResponse::new(DownPaymentResponse {
        down_payment: down_payment.value(),
    })))
}
