//! Transport status endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::notification::ServiceType;
use crate::server::AppState;
use crate::transport::TransportStatusEntry;

#[derive(Debug, Serialize)]
pub struct TransportListResponse {
    pub transports: Vec<TransportStatusEntry>,
    pub total: usize,
}

/// GET /transports - status of every transport created so far
pub async fn list_transports(State(state): State<AppState>) -> Json<TransportListResponse> {
    let transports: Vec<TransportStatusEntry> = ServiceType::ALL
        .into_iter()
        .flat_map(|service_type| state.dispatcher.registry(service_type).statuses())
        .collect();

    Json(TransportListResponse {
        total: transports.len(),
        transports,
    })
}

/// GET /transports/{service}/{platform}
pub async fn get_transport(
    State(state): State<AppState>,
    Path((service, platform_id)): Path<(String, String)>,
) -> Result<Json<TransportStatusEntry>> {
    let service_type: ServiceType = service.parse().map_err(AppError::Validation)?;

    let status = state
        .dispatcher
        .registry(service_type)
        .status(&platform_id)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "no {} transport for platform '{}'",
                service_type, platform_id
            ))
        })?;

    Ok(Json(TransportStatusEntry {
        service_type,
        platform_id,
        status,
    }))
}
