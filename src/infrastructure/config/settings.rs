use std::collections::HashMap;
use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub otel: OtelConfig,
    /// Per-platform transport configuration, keyed by platform id
    #[serde(default)]
    pub platforms: HashMap<String, PlatformConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Job queues consumed round-robin
    #[serde(default = "default_queues")]
    pub queues: Vec<String>,
    /// Suffix of the per-queue processing list used for reliable consumption
    #[serde(default = "default_processing_suffix")]
    pub processing_suffix: String,
    /// Key prefix under which job outcomes are written
    #[serde(default = "default_outcome_prefix")]
    pub outcome_prefix: String,
    #[serde(default = "default_outcome_ttl")]
    pub outcome_ttl_seconds: u64,
    /// Blocking pop timeout for a single poll
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
    #[serde(default = "default_backoff_initial_delay")]
    pub backoff_initial_delay_ms: u64,
    #[serde(default = "default_backoff_max_delay")]
    pub backoff_max_delay_ms: u64,
    /// Return unacknowledged processing entries to their queues before consuming.
    /// Disable when several instances share one processing list.
    #[serde(default = "default_true")]
    pub recover_on_start: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL; without it outcomes are not persisted
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Job source backend: "redis" or "memory"
    #[serde(default = "default_job_source")]
    pub source: String,
    /// Jobs processed concurrently
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Deliveries in flight within a single job
    #[serde(default = "default_max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_ms: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    #[serde(default = "default_release_timeout")]
    pub release_timeout_seconds: u64,
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default = "default_templates_dir")]
    pub dir: String,
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    /// OTLP gRPC endpoint
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_otel_service_name")]
    pub service_name: String,
    /// Trace sampling ratio (0.0 - 1.0)
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

/// Transport configuration of a single platform.
///
/// A platform without a section for a channel cannot deliver on that channel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub mail: Option<MailPlatformConfig>,
    #[serde(default)]
    pub push: Option<PushPlatformConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailPlatformConfig {
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub defaults: MailDefaults,
    /// SMTP response codes that mark the sending account unavailable
    #[serde(default = "default_mail_unavailable_codes")]
    pub unavailable_codes: Vec<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: SmtpTls,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// Plain connection, for local relays only
    None,
    #[default]
    StartTls,
    /// Implicit TLS (SMTPS)
    Wrapper,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MailDefaults {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub envelope: Option<EnvelopeDefaults>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvelopeDefaults {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushPlatformConfig {
    /// Send endpoint; `{project_id}` is replaced with the configured project
    #[serde(default = "default_push_endpoint")]
    pub endpoint: String,
    pub project_id: String,
    pub access_token: String,
    /// HTTP status codes that mark the sender unavailable
    #[serde(default = "default_push_unavailable_codes")]
    pub unavailable_codes: Vec<u16>,
}

impl PushPlatformConfig {
    pub fn send_url(&self) -> String {
        self.endpoint.replace("{project_id}", &self.project_id)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_queues() -> Vec<String> {
    vec!["herald:jobs".to_string()]
}

fn default_processing_suffix() -> String {
    ":processing".to_string()
}

fn default_outcome_prefix() -> String {
    "herald:outcome".to_string()
}

fn default_outcome_ttl() -> u64 {
    86400 // 1 day
}

fn default_poll_timeout() -> u64 {
    5
}

fn default_backoff_initial_delay() -> u64 {
    100
}

fn default_backoff_max_delay() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_idle_timeout() -> u32 {
    300
}

fn default_max_concurrent_jobs() -> usize {
    8
}

fn default_max_concurrent_deliveries() -> usize {
    16
}

fn default_delivery_timeout() -> u64 {
    30_000
}

fn default_shutdown_grace() -> u64 {
    30
}

fn default_release_timeout() -> u64 {
    10
}

fn default_readiness_timeout() -> u64 {
    60
}

fn default_job_source() -> String {
    "redis".to_string()
}

fn default_templates_dir() -> String {
    "templates".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "herald-notification-service".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

fn default_smtp_port() -> u16 {
    587
}

pub(crate) fn default_mail_unavailable_codes() -> Vec<u16> {
    // 450: sending limit exceeded, 535: authentication rejected
    vec![450, 535]
}

pub(crate) fn default_push_unavailable_codes() -> Vec<u16> {
    vec![401, 403, 429]
}

fn default_push_endpoint() -> String {
    "https://fcm.googleapis.com/v1/projects/{project_id}/messages:send".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8090)?
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("templates.dir", "templates")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SERVER_HOST, SERVER_PORT, REDIS_URL, DATABASE_URL, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl WorkerConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_secs(self.release_timeout_seconds)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            queues: default_queues(),
            processing_suffix: default_processing_suffix(),
            outcome_prefix: default_outcome_prefix(),
            outcome_ttl_seconds: default_outcome_ttl(),
            poll_timeout_seconds: default_poll_timeout(),
            backoff_initial_delay_ms: default_backoff_initial_delay(),
            backoff_max_delay_ms: default_backoff_max_delay(),
            recover_on_start: true,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: default_pool_size(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            source: default_job_source(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_concurrent_deliveries: default_max_concurrent_deliveries(),
            delivery_timeout_ms: default_delivery_timeout(),
            shutdown_grace_seconds: default_shutdown_grace(),
            release_timeout_seconds: default_release_timeout(),
            readiness_timeout_seconds: default_readiness_timeout(),
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            dir: default_templates_dir(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_otel_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
