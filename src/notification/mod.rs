//! Notification jobs and their dispatching.
//!
//! A [`DeliveryJob`] names one (platform, template) pair and a set of
//! recipients. The [`DeliveryDispatcher`] renders it per recipient and
//! channel and hands the messages to the transport registries, collecting a
//! [`JobOutcome`].

mod dispatcher;
mod job;
mod types;

pub use dispatcher::{DeliveryDispatcher, DispatcherStats, DispatcherStatsSnapshot};
pub use job::{DeliveryJob, FailureKind, JobOutcome, JobStatus, RecipientFailure};
pub use types::{
    Attachment, Envelope, LanguagePayload, Mail, OutboundMessage, PushMessage, Recipient,
    ServiceType,
};
