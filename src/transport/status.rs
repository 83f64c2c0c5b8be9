//! Transport health status

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::SendError;

/// Delivery health of one transport.
///
/// `unavailable_since` is a routing hint only; it never blocks a delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportStatus {
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub unavailable_since: Option<DateTime<Utc>>,
}

impl TransportStatus {
    pub fn is_unavailable(&self) -> bool {
        self.unavailable_since.is_some()
    }

    fn record_success(&mut self, at: DateTime<Utc>) {
        self.last_success_at = Some(at);
        self.unavailable_since = None;
    }

    fn record_failure(&mut self, at: DateTime<Utc>, error: &SendError, unavailable_codes: &[u16]) {
        self.last_error_at = Some(at);
        self.last_error = Some(error.to_string());
        if error.code.is_some_and(|code| unavailable_codes.contains(&code)) {
            self.unavailable_since = Some(at);
        }
    }
}

/// Status owned by a transport, updated after every delivery attempt
#[derive(Debug)]
pub(crate) struct StatusTracker {
    status: RwLock<TransportStatus>,
    unavailable_codes: Vec<u16>,
}

impl StatusTracker {
    pub(crate) fn new(unavailable_codes: Vec<u16>) -> Self {
        Self {
            status: RwLock::new(TransportStatus::default()),
            unavailable_codes,
        }
    }

    pub(crate) fn snapshot(&self) -> TransportStatus {
        match self.status.read() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn record<T>(&self, result: &Result<T, SendError>) {
        let now = Utc::now();
        let mut status = match self.status.write() {
            Ok(status) => status,
            Err(poisoned) => poisoned.into_inner(),
        };
        match result {
            Ok(_) => status.record_success(now),
            Err(error) => status.record_failure(now, error, &self.unavailable_codes),
        }
    }
}
