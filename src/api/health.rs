//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::notification::{DispatcherStatsSnapshot, ServiceType};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub broker: ComponentHealth,
    pub store: ComponentHealth,
    pub workers: WorkerHealth,
    pub transports: TransportHealth,
    pub dispatcher: DispatcherStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub backend: String,
    pub ready: bool,
}

#[derive(Debug, Serialize)]
pub struct WorkerHealth {
    pub capacity: usize,
    pub in_flight: usize,
    pub draining: bool,
}

#[derive(Debug, Serialize)]
pub struct TransportHealth {
    pub mail: usize,
    pub push: usize,
    pub unavailable: usize,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let readiness = state.context.readiness().await;
    let mail = state.dispatcher.registry(ServiceType::Mail);
    let push = state.dispatcher.registry(ServiceType::Push);

    let status = if state.workers.is_drained() {
        "shutting_down"
    } else if readiness.is_ready() {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        broker: ComponentHealth {
            backend: state.context.broker().backend_name().to_string(),
            ready: readiness.broker,
        },
        store: ComponentHealth {
            backend: state.context.store().backend_name().to_string(),
            ready: readiness.store,
        },
        workers: WorkerHealth {
            capacity: state.workers.capacity(),
            in_flight: state.workers.in_flight(),
            draining: state.workers.is_drained(),
        },
        transports: TransportHealth {
            mail: mail.len(),
            push: push.len(),
            unavailable: mail.unavailable_count() + push.unavailable_count(),
        },
        dispatcher: state.dispatcher.stats(),
    })
}
