//! API layer - observability endpoints.

mod health;
mod metrics;
mod routes;
mod transports;

pub use health::health;
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
pub use transports::{get_transport, list_transports};
