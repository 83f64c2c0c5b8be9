use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::metrics::{DeliveryMetrics, JobMetrics, TransportMetrics};
use crate::template::{TemplateError, TemplateLoader, TemplatingEngine};
use crate::transport::{DeliveryError, TransportRegistry};

use super::job::{DeliveryJob, FailureKind, JobOutcome, JobStatus, RecipientFailure};
use super::types::{OutboundMessage, Recipient, ServiceType};

/// Statistics for the delivery dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Jobs processed to an outcome, rejected ones included
    pub jobs_processed: AtomicU64,
    pub jobs_rejected: AtomicU64,
    pub deliveries_sent: AtomicU64,
    pub deliveries_failed: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            jobs_processed: self.jobs_processed.load(Ordering::Relaxed),
            jobs_rejected: self.jobs_rejected.load(Ordering::Relaxed),
            deliveries_sent: self.deliveries_sent.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub jobs_processed: u64,
    pub jobs_rejected: u64,
    pub deliveries_sent: u64,
    pub deliveries_failed: u64,
}

/// One (recipient, channel) pair to render and send
struct PlannedDelivery<'a> {
    index: usize,
    recipient: &'a Recipient,
    channel: ServiceType,
    address: &'a str,
}

/// Renders jobs through a templating engine and fans deliveries out to the transports
pub struct DeliveryDispatcher {
    loader: Arc<dyn TemplateLoader>,
    mail: Arc<TransportRegistry>,
    push: Arc<TransportRegistry>,
    max_concurrent_deliveries: usize,
    stats: DispatcherStats,
}

impl DeliveryDispatcher {
    pub fn new(
        loader: Arc<dyn TemplateLoader>,
        mail: Arc<TransportRegistry>,
        push: Arc<TransportRegistry>,
        max_concurrent_deliveries: usize,
    ) -> Self {
        Self {
            loader,
            mail,
            push,
            max_concurrent_deliveries: max_concurrent_deliveries.max(1),
            stats: DispatcherStats::default(),
        }
    }

    /// Get dispatcher statistics
    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Transport registry of a service type
    pub fn registry(&self, service_type: ServiceType) -> &Arc<TransportRegistry> {
        match service_type {
            ServiceType::Mail => &self.mail,
            ServiceType::Push => &self.push,
        }
    }

    /// Process one job to its outcome.
    ///
    /// Engine construction errors reject the whole job. Everything after that is
    /// isolated per delivery and aggregated into the outcome.
    #[tracing::instrument(
        name = "dispatcher.process",
        skip(self, job),
        fields(
            job_id = %job.job_id,
            platform_id = %job.platform_id,
            template_id = %job.template_id
        )
    )]
    pub async fn process(&self, job: &DeliveryJob) -> JobOutcome {
        let engine = match TemplatingEngine::load(
            self.loader.as_ref(),
            &job.platform_id,
            &job.template_id,
            job.base_payload.clone(),
            job.language_payloads.clone(),
        )
        .await
        {
            Ok(engine) => engine,
            Err(e) => {
                tracing::warn!(error = %e, "Job rejected");
                return self.finish(JobOutcome::rejected(job, e.to_string()));
            }
        };

        let (planned, mut failures) = plan(job);
        for failure in &failures {
            let channel = failure.channel.map_or("none", |c| c.as_str());
            DeliveryMetrics::record_failed(channel);
            self.stats.deliveries_failed.fetch_add(1, Ordering::Relaxed);
        }

        tracing::debug!(
            recipients = job.recipients.len(),
            deliveries = planned.len(),
            "Job rendering started"
        );

        // futures are built up front so the stream holds no borrowing closure
        let deliveries: Vec<_> = planned
            .into_iter()
            .map(|delivery| self.deliver(&engine, job, delivery))
            .collect();
        let results: Vec<Result<(), RecipientFailure>> = stream::iter(deliveries)
            .buffer_unordered(self.max_concurrent_deliveries)
            .collect()
            .await;

        let mut sent_count = 0;
        for result in results {
            match result {
                Ok(()) => sent_count += 1,
                Err(failure) => failures.push(failure),
            }
        }
        failures.sort_by_key(|f| (f.recipient_index, f.channel.map(|c| c.as_str())));

        self.refresh_unavailable();
        self.finish(JobOutcome::delivered(job, sent_count, failures))
    }

    async fn deliver(
        &self,
        engine: &TemplatingEngine,
        job: &DeliveryJob,
        delivery: PlannedDelivery<'_>,
    ) -> Result<(), RecipientFailure> {
        let channel = delivery.channel;
        let fail = |kind: FailureKind, reason: String| RecipientFailure {
            recipient_index: delivery.index,
            channel: Some(channel),
            address: Some(delivery.address.to_string()),
            kind,
            reason,
        };

        let message = match render(engine, job, &delivery) {
            Ok(message) => message,
            Err(e) => {
                DeliveryMetrics::record_failed(channel.as_str());
                self.stats.deliveries_failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    recipient_index = delivery.index,
                    channel = %channel,
                    error = %e,
                    "Render failed"
                );
                return Err(fail(render_failure_kind(&e), e.to_string()));
            }
        };

        let started = Instant::now();
        match self.registry(channel).send(&job.platform_id, message).await {
            Ok(_) => {
                DeliveryMetrics::record_sent(channel.as_str(), started.elapsed().as_secs_f64());
                self.stats.deliveries_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                DeliveryMetrics::record_failed(channel.as_str());
                self.stats.deliveries_failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    recipient_index = delivery.index,
                    channel = %channel,
                    error = %e,
                    "Delivery failed"
                );
                let kind = match &e {
                    DeliveryError::PlatformNotConfigured { .. } => FailureKind::PlatformNotConfigured,
                    _ => FailureKind::Delivery,
                };
                Err(fail(kind, e.to_string()))
            }
        }
    }

    fn finish(&self, outcome: JobOutcome) -> JobOutcome {
        self.stats.jobs_processed.fetch_add(1, Ordering::Relaxed);
        if outcome.status == JobStatus::Rejected {
            self.stats.jobs_rejected.fetch_add(1, Ordering::Relaxed);
        }
        JobMetrics::record_completed(outcome.status.as_str());

        tracing::info!(
            job_id = %outcome.job_id,
            status = outcome.status.as_str(),
            sent = outcome.sent_count,
            failed = outcome.failed_count,
            "Job finished"
        );
        outcome
    }

    fn refresh_unavailable(&self) {
        for registry in [&self.mail, &self.push] {
            TransportMetrics::set_unavailable(
                registry.service_type().as_str(),
                registry.unavailable_count(),
            );
        }
    }
}

/// Expand a job into its deliveries. Recipients with no address for any
/// selected channel are reported as failures straight away.
fn plan(job: &DeliveryJob) -> (Vec<PlannedDelivery<'_>>, Vec<RecipientFailure>) {
    let channels = job.selected_channels();
    let mut planned = Vec::new();
    let mut failures = Vec::new();

    for (index, recipient) in job.recipients.iter().enumerate() {
        let before = planned.len();
        for &channel in &channels {
            if let Some(address) = recipient.address(channel) {
                planned.push(PlannedDelivery {
                    index,
                    recipient,
                    channel,
                    address,
                });
            }
        }

        if planned.len() == before {
            failures.push(RecipientFailure {
                recipient_index: index,
                channel: None,
                address: None,
                kind: FailureKind::MissingAddress,
                reason: format!(
                    "recipient has no address for channels [{}]",
                    channels
                        .iter()
                        .map(|c| c.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }
    }

    (planned, failures)
}

fn render(
    engine: &TemplatingEngine,
    job: &DeliveryJob,
    delivery: &PlannedDelivery<'_>,
) -> Result<OutboundMessage, TemplateError> {
    match delivery.channel {
        ServiceType::Mail => {
            let mut mail = engine.create_mail_message(delivery.recipient)?;
            mail.attachments.extend(job.attachments.iter().cloned());
            Ok(OutboundMessage::Mail(mail))
        }
        ServiceType::Push => engine
            .create_push_message(delivery.recipient, delivery.address)
            .map(OutboundMessage::Push),
    }
}

fn render_failure_kind(error: &TemplateError) -> FailureKind {
    match error {
        TemplateError::NotFound { .. } => FailureKind::TemplateNotFound,
        TemplateError::PayloadNotFound(_) => FailureKind::PayloadNotFound,
        TemplateError::MissingAddress(_) => FailureKind::MissingAddress,
        _ => FailureKind::Render,
    }
}
