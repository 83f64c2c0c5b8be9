//! Underlying sender handles.
//!
//! A sender performs the actual network send for one platform. Transports own
//! one sender each and add status tracking, defaults and timeouts on top.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{MailPlatformConfig, PushPlatformConfig};
use crate::notification::{Mail, PushMessage};

use super::http_push::HttpPushSender;
use super::smtp::SmtpMailSender;
use super::types::{SendError, SendReceipt};

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send_mail(&self, mail: &Mail) -> Result<SendReceipt, SendError>;
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send_push(&self, message: &PushMessage) -> Result<SendReceipt, SendError>;
}

/// Creates sender handles from platform configuration
pub trait SenderConnector: Send + Sync {
    fn connect_mail(
        &self,
        platform_id: &str,
        config: &MailPlatformConfig,
    ) -> Result<Arc<dyn MailSender>, SendError>;

    fn connect_push(
        &self,
        platform_id: &str,
        config: &PushPlatformConfig,
    ) -> Result<Arc<dyn PushSender>, SendError>;
}

/// Connects real SMTP and HTTP push senders
pub struct LiveSenderConnector {
    http: reqwest::Client,
}

impl LiveSenderConnector {
    pub fn new() -> Result<Self, SendError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("herald-notification-service/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SendError::new(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

impl SenderConnector for LiveSenderConnector {
    fn connect_mail(
        &self,
        platform_id: &str,
        config: &MailPlatformConfig,
    ) -> Result<Arc<dyn MailSender>, SendError> {
        tracing::debug!(
            platform_id = %platform_id,
            host = %config.smtp.host,
            port = config.smtp.port,
            "Connecting SMTP sender"
        );
        Ok(Arc::new(SmtpMailSender::new(&config.smtp)?))
    }

    fn connect_push(
        &self,
        platform_id: &str,
        config: &PushPlatformConfig,
    ) -> Result<Arc<dyn PushSender>, SendError> {
        tracing::debug!(
            platform_id = %platform_id,
            project_id = %config.project_id,
            "Connecting push sender"
        );
        Ok(Arc::new(HttpPushSender::new(self.http.clone(), config)))
    }
}
