//! Transport result and error types

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::notification::ServiceType;

/// Failure reported by an underlying sender
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SendError {
    /// Provider response code (SMTP reply code or HTTP status)
    pub code: Option<u16>,
    pub message: String,
}

impl SendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: u16, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(format!("delivery timed out after {}ms", after.as_millis()))
    }
}

/// What a sender reports back for an accepted message
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Platform '{platform_id}' has no {service_type} configuration")]
    PlatformNotConfigured {
        service_type: ServiceType,
        platform_id: String,
    },

    #[error("Failed to set up {service_type} sender for platform '{platform_id}': {source}")]
    SenderSetup {
        service_type: ServiceType,
        platform_id: String,
        #[source]
        source: SendError,
    },

    #[error("{service_type} delivery via platform '{platform_id}' failed: {source}")]
    Transport {
        service_type: ServiceType,
        platform_id: String,
        #[source]
        source: SendError,
    },

    #[error("Cannot deliver a {actual} message through a {expected} transport")]
    ChannelMismatch {
        expected: ServiceType,
        actual: ServiceType,
    },
}

impl DeliveryError {
    /// Provider response code of a failed delivery, if any
    pub fn response_code(&self) -> Option<u16> {
        match self {
            DeliveryError::Transport { source, .. } => source.code,
            _ => None,
        }
    }
}
