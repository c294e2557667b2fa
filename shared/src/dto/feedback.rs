//! Normalized feedback events, the output of the feedback ingestor and the
//! input of the analytics reducer.
//!
//! The ingestor's job is exactly to collapse whatever shape the provider's
//! webhook sent (SES/SNS notification JSON in this workspace's case) down
//! to this one enum, so the reducer never has to know which provider a
//! message came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum FeedbackEventKind {
    Delivery,
    Open,
    Click { url: String },
    Bounce { permanent: bool, reason: String },
    Complaint,
    Reject,
    Send,
    Unsubscribe { reason: Option<String> },
}

/// A single normalized provider notification.
///
/// `feedback_id` is the provider's own identity for the event (SES
/// `messageId` + event type, or an SNS `MessageId`) and is what the
/// reducer's idempotency check keys on — replays of the same
/// `(feedback_id, kind)` pair must not double-count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEvent {
    pub feedback_id: String,
    pub tracking_id: Option<Uuid>,
    pub message_id: Option<String>,
    pub email: String,
    pub kind: FeedbackEventKind,
    pub timestamp: DateTime<Utc>,
}
