//! Mail transport

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::config::{MailDefaults, MailPlatformConfig};
use crate::notification::{Attachment, Envelope, Mail};

use super::sender::MailSender;
use super::status::{StatusTracker, TransportStatus};
use super::types::{SendError, SendReceipt};
use super::with_timeout;

pub struct MailTransport {
    platform_id: String,
    sender: Arc<dyn MailSender>,
    defaults: MailDefaults,
    timeout: Duration,
    status: StatusTracker,
}

impl MailTransport {
    pub fn new(
        platform_id: &str,
        sender: Arc<dyn MailSender>,
        config: &MailPlatformConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            platform_id: platform_id.to_string(),
            sender,
            defaults: config.defaults.clone(),
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

    /// Deliver one mail. Status is updated before the result is returned.
    pub async fn deliver(&self, mut mail: Mail) -> Result<SendReceipt, SendError> {
        let result = match prepare_attachments(&mut mail.attachments) {
            Ok(()) => {
                self.apply_defaults(&mut mail);
                with_timeout(self.timeout, self.sender.send_mail(&mail)).await
            }
            Err(e) => Err(e),
        };

        self.status.record(&result);

        match &result {
            Ok(receipt) => tracing::debug!(
                service_type = "mail",
                platform_id = %self.platform_id,
                message_id = ?receipt.message_id,
                "Mail delivered"
            ),
            Err(e) => tracing::warn!(
                service_type = "mail",
                platform_id = %self.platform_id,
                code = ?e.code,
                error = %e,
                "Mail delivery failed"
            ),
        }

        result
    }

    /// Fill `from` and envelope fields the message left unset.
    fn apply_defaults(&self, mail: &mut Mail) {
        if mail.from.trim().is_empty() {
            if let Some(from) = &self.defaults.from {
                mail.from = from.clone();
            }
        }

        let envelope = mail.envelope.get_or_insert_with(Envelope::default);
        if let Some(defaults) = &self.defaults.envelope {
            if is_blank(&envelope.from) {
                envelope.from = defaults.from.clone();
            }
            if is_blank(&envelope.to) {
                envelope.to = defaults.to.clone();
            }
        }
        // a blank address is never a valid envelope override
        if is_blank(&envelope.from) {
            envelope.from = None;
        }
        if is_blank(&envelope.to) {
            envelope.to = None;
        }
        if *envelope == Envelope::default() {
            mail.envelope = None;
        }
    }
}

fn is_blank(field: &Option<String>) -> bool {
    field.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Re-encode every attachment as base64.
///
/// Content declared `base64` is decoded first; anything else is taken as raw text.
pub(crate) fn prepare_attachments(attachments: &mut [Attachment]) -> Result<(), SendError> {
    for attachment in attachments.iter_mut() {
        let declared_base64 = attachment
            .encoding
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case("base64"));

        let bytes = if declared_base64 {
            let compact: String = attachment
                .content
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            BASE64.decode(compact.as_bytes()).map_err(|e| {
                SendError::new(format!(
                    "attachment '{}' is not valid base64: {}",
                    attachment.filename, e
                ))
            })?
        } else {
            attachment.content.as_bytes().to_vec()
        };

        attachment.content = BASE64.encode(bytes);
        attachment.encoding = Some("base64".to_string());
    }
    Ok(())
}
