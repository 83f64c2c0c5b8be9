//! End-to-end delivery tests
//!
//! These tests wire the public components together (template loader,
//! transport registries, dispatcher, consumer, shutdown) with in-process
//! senders, without Redis, PostgreSQL or real mail/push providers.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_test::{assert_err, assert_ok};

use herald::config::{
    MailDefaults, MailPlatformConfig, PlatformConfig, PushPlatformConfig, SmtpConfig, SmtpTls,
};
use herald::notification::{
    DeliveryDispatcher, DeliveryJob, FailureKind, JobStatus, LanguagePayload, Mail, PushMessage,
    Recipient, ServiceType,
};
use herald::queue::MemoryJobSource;
use herald::server::AppContext;
use herald::shutdown::{GracefulShutdown, ShutdownConfig};
use herald::store::MemoryOutcomeStore;
use herald::template::{MemoryTemplateLoader, TemplateError, TemplatingEngine};
use herald::transport::{
    MailSender, PushSender, SendError, SendReceipt, SenderConnector, TransportRegistry,
};
use herald::triggers::{JobConsumer, WorkerPool};

/// In-process sender that rejects a fixed set of addresses
#[derive(Default)]
struct FakeSender {
    rejected: HashSet<String>,
    delay: Option<Duration>,
    mails: Mutex<Vec<Mail>>,
    pushes: Mutex<Vec<PushMessage>>,
}

impl FakeSender {
    fn rejecting(address: &str) -> Self {
        Self {
            rejected: HashSet::from([address.to_string()]),
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    async fn accept(&self, address: &str) -> Result<SendReceipt, SendError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.rejected.contains(address) {
            return Err(SendError::with_code(550, format!("mailbox {} rejected", address)));
        }
        Ok(SendReceipt {
            message_id: Some(format!("<{}>", address)),
            response: None,
        })
    }
}

#[async_trait]
impl MailSender for FakeSender {
    async fn send_mail(&self, mail: &Mail) -> Result<SendReceipt, SendError> {
        let receipt = self.accept(&mail.to).await?;
        self.mails.lock().unwrap().push(mail.clone());
        Ok(receipt)
    }
}

#[async_trait]
impl PushSender for FakeSender {
    async fn send_push(&self, message: &PushMessage) -> Result<SendReceipt, SendError> {
        let receipt = self.accept(&message.token).await?;
        self.pushes.lock().unwrap().push(message.clone());
        Ok(receipt)
    }
}

/// Hands out one shared fake sender and counts how often a sender is built
struct FakeConnector {
    sender: Arc<FakeSender>,
    connects: AtomicUsize,
}

impl FakeConnector {
    fn new(sender: FakeSender) -> Arc<Self> {
        Arc::new(Self {
            sender: Arc::new(sender),
            connects: AtomicUsize::new(0),
        })
    }
}

impl SenderConnector for FakeConnector {
    fn connect_mail(
        &self,
        _platform_id: &str,
        _config: &MailPlatformConfig,
    ) -> Result<Arc<dyn MailSender>, SendError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.sender.clone())
    }

    fn connect_push(
        &self,
        _platform_id: &str,
        _config: &PushPlatformConfig,
    ) -> Result<Arc<dyn PushSender>, SendError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.sender.clone())
    }
}

fn platforms() -> HashMap<String, PlatformConfig> {
    HashMap::from([(
        "acme".to_string(),
        PlatformConfig {
            mail: Some(MailPlatformConfig {
                smtp: SmtpConfig {
                    host: "localhost".to_string(),
                    port: 2525,
                    username: None,
                    password: None,
                    tls: SmtpTls::None,
                },
                defaults: MailDefaults {
                    from: Some("noreply@acme.test".to_string()),
                    envelope: None,
                },
                unavailable_codes: vec![450, 535],
            }),
            push: Some(PushPlatformConfig {
                endpoint: "http://localhost/{project_id}".to_string(),
                project_id: "acme".to_string(),
                access_token: "token".to_string(),
                unavailable_codes: vec![401, 403, 429],
            }),
        },
    )])
}

fn templates() -> MemoryTemplateLoader {
    let loader = MemoryTemplateLoader::new();
    loader.insert(
        "acme",
        "welcome",
        ServiceType::Mail,
        json!({ "subject": "Hi {{user.name}}", "text": "{{language.body}}" }),
    );
    loader.insert(
        "acme",
        "welcome",
        ServiceType::Push,
        json!({ "notification": { "title": "Hi {{user.name}}" } }),
    );
    loader.insert(
        "acme",
        "receipt",
        ServiceType::Mail,
        json!({ "subject": "Your receipt" }),
    );
    loader
}

fn dispatcher(connector: Arc<FakeConnector>) -> Arc<DeliveryDispatcher> {
    let platforms = Arc::new(platforms());
    let registry = |service_type| {
        Arc::new(TransportRegistry::new(
            service_type,
            platforms.clone(),
            connector.clone(),
            Duration::from_secs(2),
        ))
    };
    Arc::new(DeliveryDispatcher::new(
        Arc::new(templates()),
        registry(ServiceType::Mail),
        registry(ServiceType::Push),
        4,
    ))
}

fn welcome_job(job_id: &str, recipients: serde_json::Value) -> DeliveryJob {
    DeliveryJob::from_json(
        &json!({
            "jobId": job_id,
            "platformId": "acme",
            "templateId": "welcome",
            "channels": ["mail"],
            "recipients": recipients,
            "languagePayloads": [{ "languageId": "en", "payload": { "body": "Welcome aboard" } }]
        })
        .to_string(),
    )
    .unwrap()
}

fn english() -> Vec<LanguagePayload> {
    vec![LanguagePayload {
        language_id: "en".to_string(),
        payload: json!({}),
    }]
}

#[tokio::test]
async fn test_mail_message_is_rendered_for_recipient() {
    let loader = MemoryTemplateLoader::new();
    loader.insert("acme", "hello", ServiceType::Mail, json!({ "subject": "Hi {{user.name}}" }));

    let engine = assert_ok!(
        TemplatingEngine::load(&loader, "acme", "hello", json!({}), english()).await
    );
    let recipient = Recipient {
        mail: Some("a@b.com".to_string()),
        device_token: None,
        language_id: "en".to_string(),
        payload: json!({ "name": "Ann" }),
    };

    let mail = assert_ok!(engine.create_mail_message(&recipient));
    assert_eq!(mail.to, "a@b.com");
    assert_eq!(mail.subject, "Hi Ann");
}

#[tokio::test]
async fn test_one_rejected_recipient_does_not_affect_others() {
    let connector = FakeConnector::new(FakeSender::rejecting("bob@example.com"));
    let dispatcher = dispatcher(connector.clone());

    let outcome = dispatcher
        .process(&welcome_job(
            "job-b",
            json!([
                { "mail": "ann@example.com", "languageId": "en", "payload": { "name": "Ann" } },
                { "mail": "bob@example.com", "languageId": "en", "payload": { "name": "Bob" } },
                { "mail": "cid@example.com", "languageId": "en", "payload": { "name": "Cid" } }
            ]),
        ))
        .await;

    assert_eq!(outcome.status, JobStatus::PartiallyFailed);
    assert_eq!(outcome.sent_count, 2);
    assert_eq!(outcome.failed_count, 1);
    assert_eq!(outcome.failures.len(), 1);
    let failure = &outcome.failures[0];
    assert_eq!(failure.recipient_index, 1);
    assert_eq!(failure.kind, FailureKind::Delivery);
    assert_eq!(failure.address.as_deref(), Some("bob@example.com"));
    assert!(failure.reason.contains("rejected"));

    let mut delivered: Vec<String> = connector
        .sender
        .mails
        .lock()
        .unwrap()
        .iter()
        .map(|m| m.subject.clone())
        .collect();
    delivered.sort();
    assert_eq!(delivered, vec!["Hi Ann", "Hi Cid"]);

    let status = dispatcher
        .registry(ServiceType::Mail)
        .status("acme")
        .unwrap();
    assert!(status.last_error.as_ref().unwrap().contains("bob@example.com"));
    assert!(status.last_success_at.is_some());
    // 550 is not an unavailable code for this platform
    assert!(!status.is_unavailable());
}

#[tokio::test]
async fn test_push_without_push_template_is_not_found() {
    let loader = MemoryTemplateLoader::new();
    loader.insert("acme", "receipt", ServiceType::Mail, json!({ "subject": "Your receipt" }));

    let engine = assert_ok!(
        TemplatingEngine::load(&loader, "acme", "receipt", json!({}), english()).await
    );
    let recipient = Recipient {
        mail: None,
        device_token: Some("device-1".to_string()),
        language_id: "en".to_string(),
        payload: json!({}),
    };

    let err = assert_err!(engine.create_push_message(&recipient, "device-1"));
    assert!(matches!(err, TemplateError::NotFound { .. }));
}

#[tokio::test]
async fn test_push_channel_without_template_fails_per_delivery() {
    let connector = FakeConnector::new(FakeSender::default());
    let dispatcher = dispatcher(connector.clone());

    let job = DeliveryJob::from_json(
        &json!({
            "jobId": "job-c",
            "platformId": "acme",
            "templateId": "receipt",
            "recipients": [{ "mail": "ann@example.com", "deviceToken": "device-1", "languageId": "en" }],
            "languagePayloads": [{ "languageId": "en" }]
        })
        .to_string(),
    )
    .unwrap();

    let outcome = dispatcher.process(&job).await;

    assert_eq!(outcome.status, JobStatus::PartiallyFailed);
    assert_eq!(outcome.sent_count, 1);
    assert_eq!(outcome.failures[0].kind, FailureKind::TemplateNotFound);
    assert_eq!(outcome.failures[0].channel, Some(ServiceType::Push));
    assert!(connector.sender.pushes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_deliveries_build_one_sender_per_platform() {
    let connector = FakeConnector::new(FakeSender::slow(Duration::from_millis(10)));
    let dispatcher = dispatcher(connector.clone());

    let recipients: Vec<_> = (0..8)
        .map(|i| json!({ "mail": format!("user{}@example.com", i), "languageId": "en" }))
        .collect();
    let outcome = dispatcher
        .process(&welcome_job("job-many", json!(recipients)))
        .await;

    assert_eq!(outcome.status, JobStatus::Completed);
    assert_eq!(outcome.sent_count, 8);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.registry(ServiceType::Mail).len(), 1);
}

#[tokio::test]
async fn test_consumer_delivers_queued_jobs_and_shuts_down() {
    let connector = FakeConnector::new(FakeSender::default());
    let dispatcher = dispatcher(connector.clone());
    let source = Arc::new(MemoryJobSource::new());
    let store = Arc::new(MemoryOutcomeStore::new());
    let workers = Arc::new(WorkerPool::new(2));
    let context = Arc::new(AppContext::new(store.clone(), source.clone()));

    let consumer = JobConsumer::new(source.clone(), dispatcher.clone(), store.clone(), workers.clone())
        .with_poll_timeout(Duration::from_millis(20));
    let (shutdown_tx, _) = broadcast::channel(1);
    let consumer_rx = shutdown_tx.subscribe();
    let consumer_task = tokio::spawn(async move { consumer.run(consumer_rx).await });

    assert_ok!(source.push(&welcome_job(
        "job-queued",
        json!([{ "mail": "ann@example.com", "languageId": "en", "payload": { "name": "Ann" } }]),
    )));
    assert_ok!(source.push_raw("not json"));

    let outcome = source
        .wait_for_outcome("job-queued", Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(outcome.status, JobStatus::Completed);
    assert_eq!(outcome.sent_count, 1);
    assert_eq!(store.get("job-queued").unwrap().sent_count, 1);

    let shutdown = GracefulShutdown::with_config(
        context.clone(),
        workers,
        shutdown_tx,
        ShutdownConfig {
            drain_timeout: Duration::from_secs(1),
            release_timeout: Duration::from_secs(1),
        },
    );
    let result = shutdown.execute("test").await;

    assert!(result.success);
    assert!(context.is_released());
    assert_ok!(tokio::time::timeout(Duration::from_secs(1), consumer_task).await);
    assert_eq!(dispatcher.stats().jobs_processed, 1);
}
