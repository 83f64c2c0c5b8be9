//! Prometheus metrics for the notification service.
//!
//! - Job metrics (received, malformed, completed by status)
//! - Delivery metrics (by channel and result, latency)
//! - Transport metrics (created, currently unavailable)
//! - Worker and broker metrics

mod helpers;

pub use helpers::{encode_metrics, BrokerMetrics, DeliveryMetrics, JobMetrics, TransportMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "herald";

lazy_static! {
    // ============================================================================
    // Job Metrics
    // ============================================================================

    /// Jobs taken from the broker
    pub static ref JOBS_RECEIVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_jobs_received_total", METRIC_PREFIX),
        "Total delivery jobs received",
        &["source"]
    ).unwrap();

    /// Payloads that could not be parsed as a job
    pub static ref JOBS_MALFORMED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_jobs_malformed_total", METRIC_PREFIX),
        "Total queue payloads rejected as malformed"
    ).unwrap();

    /// Jobs finished, by outcome status
    pub static ref JOBS_COMPLETED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_jobs_completed_total", METRIC_PREFIX),
        "Total delivery jobs completed",
        &["status"]
    ).unwrap();

    /// Jobs currently held by workers
    pub static ref JOBS_IN_FLIGHT: IntGauge = register_int_gauge!(
        format!("{}_jobs_in_flight", METRIC_PREFIX),
        "Number of jobs currently being processed"
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Deliveries attempted, by channel and result
    pub static ref DELIVERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_deliveries_total", METRIC_PREFIX),
        "Total delivery attempts",
        &["channel", "result"]
    ).unwrap();

    /// Time spent inside a transport delivering one message
    pub static ref DELIVERY_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_delivery_latency_seconds", METRIC_PREFIX),
        "Message delivery latency in seconds",
        &["channel"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    // ============================================================================
    // Transport Metrics
    // ============================================================================

    /// Transports constructed, by channel
    pub static ref TRANSPORTS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_transports_created_total", METRIC_PREFIX),
        "Total transports constructed",
        &["channel"]
    ).unwrap();

    /// Cached transports currently inside an unavailability window
    pub static ref TRANSPORTS_UNAVAILABLE: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_transports_unavailable", METRIC_PREFIX),
        "Number of transports marked unavailable",
        &["channel"]
    ).unwrap();

    // ============================================================================
    // Broker Metrics
    // ============================================================================

    /// Broker operation failures
    pub static ref BROKER_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_broker_errors_total", METRIC_PREFIX),
        "Total job broker errors",
        &["operation"]
    ).unwrap();
}
