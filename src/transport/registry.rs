//! Transport registry: one lazily created transport per (service type, platform).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::config::PlatformConfig;
use crate::metrics::TransportMetrics;
use crate::notification::{OutboundMessage, ServiceType};

use super::mail::MailTransport;
use super::push::PushTransport;
use super::sender::SenderConnector;
use super::status::TransportStatus;
use super::types::{DeliveryError, SendReceipt};
use super::MessageTransport;

/// Source of per-platform transport configuration
pub trait PlatformConfigProvider: Send + Sync {
    fn platform(&self, platform_id: &str) -> Option<PlatformConfig>;
}

impl PlatformConfigProvider for HashMap<String, PlatformConfig> {
    fn platform(&self, platform_id: &str) -> Option<PlatformConfig> {
        self.get(platform_id).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TransportKey {
    service_type: ServiceType,
    platform_id: String,
}

/// Status snapshot of one cached transport
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportStatusEntry {
    pub service_type: ServiceType,
    pub platform_id: String,
    pub status: TransportStatus,
}

pub struct TransportRegistry {
    service_type: ServiceType,
    platforms: Arc<dyn PlatformConfigProvider>,
    connector: Arc<dyn SenderConnector>,
    delivery_timeout: Duration,
    /// Cells are created eagerly and initialised once; a failed init leaves the cell empty
    transports: DashMap<TransportKey, Arc<OnceCell<Arc<MessageTransport>>>>,
}

impl TransportRegistry {
    pub fn new(
        service_type: ServiceType,
        platforms: Arc<dyn PlatformConfigProvider>,
        connector: Arc<dyn SenderConnector>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            service_type,
            platforms,
            connector,
            delivery_timeout,
            transports: DashMap::new(),
        }
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    /// Deliver `message` through the transport of `platform_id`, creating it on first use.
    pub async fn send(
        &self,
        platform_id: &str,
        message: OutboundMessage,
    ) -> Result<SendReceipt, DeliveryError> {
        let transport = self.transport(platform_id).await?;
        transport.deliver(message).await
    }

    /// Resolve the cached transport, constructing it at most once per key.
    pub async fn transport(&self, platform_id: &str) -> Result<Arc<MessageTransport>, DeliveryError> {
        let key = TransportKey {
            service_type: self.service_type,
            platform_id: platform_id.to_string(),
        };
        // Clone the cell out so no map guard is held across the await
        let cell = self
            .transports
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();

        match cell
            .get_or_try_init(|| async { self.build(platform_id).map(Arc::new) })
            .await
        {
            Ok(transport) => Ok(transport.clone()),
            Err(e) => {
                // failed constructions leave no entry behind
                self.transports
                    .remove_if(&key, |_, c| Arc::ptr_eq(c, &cell) && !c.initialized());
                Err(e)
            }
        }
    }

    fn build(&self, platform_id: &str) -> Result<MessageTransport, DeliveryError> {
        let not_configured = || DeliveryError::PlatformNotConfigured {
            service_type: self.service_type,
            platform_id: platform_id.to_string(),
        };
        let setup_failed = |source| DeliveryError::SenderSetup {
            service_type: self.service_type,
            platform_id: platform_id.to_string(),
            source,
        };

        let platform = self.platforms.platform(platform_id).ok_or_else(not_configured)?;

        let transport = match self.service_type {
            ServiceType::Mail => {
                let config = platform.mail.as_ref().ok_or_else(not_configured)?;
                let sender = self
                    .connector
                    .connect_mail(platform_id, config)
                    .map_err(setup_failed)?;
                MessageTransport::Mail(MailTransport::new(
                    platform_id,
                    sender,
                    config,
                    self.delivery_timeout,
                ))
            }
            ServiceType::Push => {
                let config = platform.push.as_ref().ok_or_else(not_configured)?;
                let sender = self
                    .connector
                    .connect_push(platform_id, config)
                    .map_err(setup_failed)?;
                MessageTransport::Push(PushTransport::new(
                    platform_id,
                    sender,
                    config,
                    self.delivery_timeout,
                ))
            }
        };

        TransportMetrics::record_created(self.service_type.as_str());
        tracing::info!(
            service_type = %self.service_type,
            platform_id = %platform_id,
            "Transport created"
        );

        Ok(transport)
    }

    /// Status of a cached transport
    pub fn status(&self, platform_id: &str) -> Option<TransportStatus> {
        let key = TransportKey {
            service_type: self.service_type,
            platform_id: platform_id.to_string(),
        };
        self.transports
            .get(&key)
            .and_then(|cell| cell.get().map(|t| t.status()))
    }

    /// Status of every cached transport, ordered by platform id
    pub fn statuses(&self) -> Vec<TransportStatusEntry> {
        let mut entries: Vec<TransportStatusEntry> = self
            .transports
            .iter()
            .filter_map(|entry| {
                entry.value().get().map(|transport| TransportStatusEntry {
                    service_type: transport.service_type(),
                    platform_id: transport.platform_id().to_string(),
                    status: transport.status(),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.platform_id.cmp(&b.platform_id));
        entries
    }

    /// Number of constructed transports
    pub fn len(&self) -> usize {
        self.transports
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unavailable_count(&self) -> usize {
        self.statuses()
            .iter()
            .filter(|entry| entry.status.is_unavailable())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MailDefaults, MailPlatformConfig, SmtpConfig, SmtpTls};
    use crate::notification::Mail;
    use crate::transport::test_support::CountingConnector;

    fn mail_platform() -> PlatformConfig {
        PlatformConfig {
            mail: Some(MailPlatformConfig {
                smtp: SmtpConfig {
                    host: "localhost".to_string(),
                    port: 25,
                    username: None,
                    password: None,
                    tls: SmtpTls::None,
                },
                defaults: MailDefaults::default(),
                unavailable_codes: vec![450, 535],
            }),
            push: None,
        }
    }

    fn registry(
        service_type: ServiceType,
        connector: Arc<CountingConnector>,
    ) -> TransportRegistry {
        let mut platforms = HashMap::new();
        platforms.insert("acme".to_string(), mail_platform());
        TransportRegistry::new(
            service_type,
            Arc::new(platforms),
            connector,
            Duration::from_secs(1),
        )
    }

    fn mail() -> OutboundMessage {
        OutboundMessage::Mail(Mail {
            to: "ann@example.com".to_string(),
            ..Mail::default()
        })
    }

    #[tokio::test]
    async fn test_concurrent_first_use_constructs_once() {
        let connector = Arc::new(CountingConnector::default());
        let registry = Arc::new(registry(ServiceType::Mail, connector.clone()));

        let sends = (0..16).map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.send("acme", mail()).await })
        });
        for result in futures::future::join_all(sends).await {
            result.unwrap().unwrap();
        }

        assert_eq!(connector.connects(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(connector.mail.sent().len(), 16);
    }

    #[tokio::test]
    async fn test_unknown_platform_is_not_configured() {
        let connector = Arc::new(CountingConnector::default());
        let registry = registry(ServiceType::Mail, connector.clone());

        let err = registry.send("unknown", mail()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::PlatformNotConfigured { .. }));
        assert!(registry.is_empty());
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn test_unknown_platforms_leave_no_entries() {
        let connector = Arc::new(CountingConnector::default());
        let registry = registry(ServiceType::Mail, connector.clone());

        for i in 0..100 {
            let platform_id = format!("bogus-{}", i);
            assert!(registry.transport(&platform_id).await.is_err());
        }

        assert_eq!(registry.transports.len(), 0);
        assert_eq!(connector.connects(), 0);

        // a configured platform still resolves afterwards
        registry.transport("acme").await.unwrap();
        assert_eq!(registry.transports.len(), 1);
    }

    #[tokio::test]
    async fn test_platform_without_channel_section_is_not_configured() {
        let connector = Arc::new(CountingConnector::default());
        let registry = registry(ServiceType::Push, connector);

        let err = registry.transport("acme").await.err().unwrap();
        assert!(matches!(
            err,
            DeliveryError::PlatformNotConfigured {
                service_type: ServiceType::Push,
                ..
            }
        ));
        // a failed construction is not cached
        assert!(registry.status("acme").is_none());
        assert!(registry.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_statuses_after_delivery() {
        let connector = Arc::new(CountingConnector::default());
        let registry = registry(ServiceType::Mail, connector);

        assert!(registry.status("acme").is_none());
        registry.send("acme", mail()).await.unwrap();

        let status = registry.status("acme").unwrap();
        assert!(status.last_success_at.is_some());

        let entries = registry.statuses();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].service_type, ServiceType::Mail);
        assert_eq!(entries[0].platform_id, "acme");
        assert_eq!(registry.unavailable_count(), 0);
    }
}
