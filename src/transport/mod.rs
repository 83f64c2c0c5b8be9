//! Message transports.
//!
//! A transport delivers rendered messages for one (service type, platform)
//! pair through an underlying sender and tracks its delivery health. The
//! variants form a closed set selected by [`ServiceType`].

mod http_push;
mod mail;
mod push;
mod registry;
mod sender;
mod smtp;
mod status;
mod types;

use std::future::Future;
use std::time::Duration;

pub use http_push::HttpPushSender;
pub use mail::MailTransport;
pub use push::PushTransport;
pub use registry::{PlatformConfigProvider, TransportRegistry, TransportStatusEntry};
pub use sender::{LiveSenderConnector, MailSender, PushSender, SenderConnector};
pub use smtp::SmtpMailSender;
pub use status::TransportStatus;
pub use types::{DeliveryError, SendError, SendReceipt};

use crate::notification::{OutboundMessage, ServiceType};

pub enum MessageTransport {
    Mail(MailTransport),
    Push(PushTransport),
}

impl MessageTransport {
    pub fn service_type(&self) -> ServiceType {
        match self {
            MessageTransport::Mail(_) => ServiceType::Mail,
            MessageTransport::Push(_) => ServiceType::Push,
        }
    }

    pub fn platform_id(&self) -> &str {
        match self {
            MessageTransport::Mail(t) => t.platform_id(),
            MessageTransport::Push(t) => t.platform_id(),
        }
    }

    pub fn status(&self) -> TransportStatus {
        match self {
            MessageTransport::Mail(t) => t.status(),
            MessageTransport::Push(t) => t.status(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.status().is_unavailable()
    }

    pub async fn deliver(&self, message: OutboundMessage) -> Result<SendReceipt, DeliveryError> {
        let result = match (self, message) {
            (MessageTransport::Mail(t), OutboundMessage::Mail(mail)) => t.deliver(mail).await,
            (MessageTransport::Push(t), OutboundMessage::Push(push)) => t.deliver(push).await,
            (transport, message) => {
                return Err(DeliveryError::ChannelMismatch {
                    expected: transport.service_type(),
                    actual: message.service_type(),
                })
            }
        };

        result.map_err(|source| DeliveryError::Transport {
            service_type: self.service_type(),
            platform_id: self.platform_id().to_string(),
            source,
        })
    }
}

/// Run a send under its own timeout; expiry is a failure without a response code.
pub(crate) async fn with_timeout<F>(timeout: Duration, send: F) -> Result<SendReceipt, SendError>
where
    F: Future<Output = Result<SendReceipt, SendError>>,
{
    match tokio::time::timeout(timeout, send).await {
        Ok(result) => result,
        Err(_) => Err(SendError::timeout(timeout)),
    }
}
