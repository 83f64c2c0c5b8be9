//! Push transport

use std::sync::Arc;
use std::time::Duration;

use crate::config::PushPlatformConfig;
use crate::notification::PushMessage;

use super::sender::PushSender;
use super::status::{StatusTracker, TransportStatus};
use super::types::{SendError, SendReceipt};
use super::with_timeout;

pub struct PushTransport {
    platform_id: String,
    sender: Arc<dyn PushSender>,
    timeout: Duration,
    status: StatusTracker,
}

impl PushTransport {
    pub fn new(
        platform_id: &str,
        sender: Arc<dyn PushSender>,
        config: &PushPlatformConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            platform_id: platform_id.to_string(),
            sender,
            timeout,
            status: StatusTracker::new(config.unavailable_codes.clone()),
        }
    }

    pub fn platform_id(&self) -> &str {
        &self.platform_id
    }

    pub fn status(&self) -> TransportStatus {
        self.status.snapshot()
    }

    /// Deliver one push message. Status is updated before the result is returned.
    pub async fn deliver(&self, message: PushMessage) -> Result<SendReceipt, SendError> {
        let result = with_timeout(self.timeout, self.sender.send_push(&message)).await;
        self.status.record(&result);

        match &result {
            Ok(receipt) => tracing::debug!(
                service_type = "push",
                platform_id = %self.platform_id,
                message_id = ?receipt.message_id,
                "Push message delivered"
            ),
            Err(e) => tracing::warn!(
                service_type = "push",
                platform_id = %self.platform_id,
                code = ?e.code,
                error = %e,
                "Push delivery failed"
            ),
        }

        result
    }
}
