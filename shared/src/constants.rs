//! Named constants shared across crates: queue names, tracking path
//! prefixes, tunables that aren't worth promoting to `AppConfig`.
//!
//! Mirrors the teacher's `constants/rabbitmq.rs` style of bare `pub static`
//! strings, just renamed away from the RabbitMQ-specific names since the
//! job queue backend here is Postgres rows keyed by these same strings.

/// Job queue for "dispatch this campaign" work items.
pub static QUEUE_CAMPAIGN: &str = "campaign";

/// Job queue for individual "send this email" work items.
pub static QUEUE_EMAIL: &str = "email";

/// Job queue for feedback events awaiting analytics aggregation.
pub static QUEUE_ANALYTICS: &str = "analytics";

/// Job queue for raw inbound SES/SNS webhook payloads awaiting parsing.
pub static QUEUE_WEBHOOK: &str = "webhook";

/// Job queue for expired EmailLog/FeedbackLog row cleanup sweeps.
pub static QUEUE_CLEANUP: &str = "cleanup";

/// Job queue for contact-list import jobs.
pub static QUEUE_IMPORT: &str = "import";

/// Job queue for analytics/report export jobs.
pub static QUEUE_EXPORT: &str = "export";

pub static ALL_QUEUES: &[&str] = &[
    QUEUE_CAMPAIGN,
    QUEUE_EMAIL,
    QUEUE_ANALYTICS,
    QUEUE_WEBHOOK,
    QUEUE_CLEANUP,
    QUEUE_IMPORT,
    QUEUE_EXPORT,
];

/// Public tracking route prefixes, relative to the API root.
pub static TRACKING_OPEN_PATH_PREFIX: &str = "/t/o";
pub static TRACKING_CLICK_PATH_PREFIX: &str = "/t/c";
pub static TRACKING_UNSUBSCRIBE_PATH_PREFIX: &str = "/t/u";
pub static TRACKING_VIEW_PATH_PREFIX: &str = "/t/v";

/// Base64 of the fixed 43-byte GIF-89a payload used as the open-tracking
/// pixel response body.
pub static TRACKING_PIXEL_GIF_BASE64: &str =
    "R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

/// Maximum number of template versions retained per template; oldest is
/// dropped once a save would exceed this.
pub static TEMPLATE_VERSION_HISTORY_CAP: usize = 20;

/// Maximum number of per-error entries retained on a campaign's `errors`
/// field.
pub static CAMPAIGN_ERROR_LOG_CAP: usize = 50;

/// TTL, in days, applied to EmailLog.expiresAt and FeedbackLog cleanup.
pub static EMAIL_LOG_TTL_DAYS: i64 = 90;
pub static FEEDBACK_LOG_TTL_DAYS: i64 = 90;
