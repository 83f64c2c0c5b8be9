//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    BROKER_ERRORS_TOTAL, DELIVERIES_TOTAL, DELIVERY_LATENCY, JOBS_COMPLETED_TOTAL, JOBS_IN_FLIGHT,
    JOBS_MALFORMED_TOTAL, JOBS_RECEIVED_TOTAL, TRANSPORTS_CREATED_TOTAL, TRANSPORTS_UNAVAILABLE,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording job metrics
pub struct JobMetrics;

impl JobMetrics {
    /// Record a job taken from a source
    pub fn record_received(source: &str) {
        JOBS_RECEIVED_TOTAL.with_label_values(&[source]).inc();
    }

    /// Record a payload that was not a valid job
    pub fn record_malformed() {
        JOBS_MALFORMED_TOTAL.inc();
    }

    /// Record a finished job by its outcome status
    pub fn record_completed(status: &str) {
        JOBS_COMPLETED_TOTAL.with_label_values(&[status]).inc();
    }

    /// Update the in-flight gauge (call on scrape)
    pub fn set_in_flight(count: usize) {
        JOBS_IN_FLIGHT.set(count as i64);
    }
}

/// Helper struct for recording delivery metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    /// Record a successful delivery and how long the transport took
    pub fn record_sent(channel: &str, latency_seconds: f64) {
        DELIVERIES_TOTAL.with_label_values(&[channel, "sent"]).inc();
        DELIVERY_LATENCY
            .with_label_values(&[channel])
            .observe(latency_seconds);
    }

    /// Record a failed delivery
    pub fn record_failed(channel: &str) {
        DELIVERIES_TOTAL.with_label_values(&[channel, "failed"]).inc();
    }
}

/// Helper struct for transport metrics
pub struct TransportMetrics;

impl TransportMetrics {
    /// Record a newly constructed transport
    pub fn record_created(channel: &str) {
        TRANSPORTS_CREATED_TOTAL.with_label_values(&[channel]).inc();
    }

    /// Update the unavailable gauge for a channel
    pub fn set_unavailable(channel: &str, count: usize) {
        TRANSPORTS_UNAVAILABLE
            .with_label_values(&[channel])
            .set(count as i64);
    }
}

/// Helper struct for broker metrics
pub struct BrokerMetrics;

impl BrokerMetrics {
    /// Record a failed broker operation
    pub fn record_error(operation: &str) {
        BROKER_ERRORS_TOTAL.with_label_values(&[operation]).inc();
    }
}
