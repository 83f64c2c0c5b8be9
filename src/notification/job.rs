//! Delivery job and outcome types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::types::{Attachment, LanguagePayload, Recipient, ServiceType};

fn generate_job_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_channels() -> Vec<ServiceType> {
    ServiceType::ALL.to_vec()
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// A queued request to render one template for a set of recipients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryJob {
    #[serde(default = "generate_job_id")]
    pub job_id: String,
    pub platform_id: String,
    pub template_id: String,
    #[serde(default = "default_channels")]
    pub channels: Vec<ServiceType>,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default = "empty_object")]
    pub base_payload: Value,
    #[serde(default)]
    pub language_payloads: Vec<LanguagePayload>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl DeliveryJob {
    /// Parse a job from its queue representation
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Selected channels in canonical order, without duplicates
    pub fn selected_channels(&self) -> Vec<ServiceType> {
        ServiceType::ALL
            .into_iter()
            .filter(|s| self.channels.contains(s))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Every delivery succeeded (or there was nothing to deliver)
    Completed,
    PartiallyFailed,
    Failed,
    /// The job could not be processed at all
    Rejected,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Completed => "completed",
            JobStatus::PartiallyFailed => "partially_failed",
            JobStatus::Failed => "failed",
            JobStatus::Rejected => "rejected",
        }
    }
}

/// Why a single delivery failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingAddress,
    TemplateNotFound,
    PayloadNotFound,
    /// Any other template error raised while rendering
    Render,
    PlatformNotConfigured,
    Delivery,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientFailure {
    pub recipient_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<ServiceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub kind: FailureKind,
    pub reason: String,
}

/// Aggregate result of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub job_id: String,
    pub platform_id: String,
    pub template_id: String,
    pub status: JobStatus,
    pub sent_count: usize,
    pub failed_count: usize,
    pub failures: Vec<RecipientFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    pub fn delivered(job: &DeliveryJob, sent_count: usize, failures: Vec<RecipientFailure>) -> Self {
        let failed_count = failures.len();
        let status = match (sent_count, failed_count) {
            (_, 0) => JobStatus::Completed,
            (0, _) => JobStatus::Failed,
            _ => JobStatus::PartiallyFailed,
        };

        Self {
            job_id: job.job_id.clone(),
            platform_id: job.platform_id.clone(),
            template_id: job.template_id.clone(),
            status,
            sent_count,
            failed_count,
            failures,
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn rejected(job: &DeliveryJob, error: impl Into<String>) -> Self {
        Self {
            job_id: job.job_id.clone(),
            platform_id: job.platform_id.clone(),
            template_id: job.template_id.clone(),
            status: JobStatus::Rejected,
            sent_count: 0,
            failed_count: 0,
            failures: Vec::new(),
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }

    /// Outcome for a queue payload that could not be parsed into a job
    pub fn malformed(job_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            platform_id: String::new(),
            template_id: String::new(),
            status: JobStatus::Rejected,
            sent_count: 0,
            failed_count: 0,
            failures: Vec::new(),
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }
}
