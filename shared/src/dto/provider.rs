//! DTOs for the email-provider driver contract.
//!
//! Shape follows the teacher's `SendEmailIn`/`EmailRecipient` pair in
//! `shared/src/dto/mailer.rs`, trimmed to what a single already-rendered
//! message needs (recipient templating happens upstream in the renderer,
//! not here).

use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEmail {
    /// Correlates this send back to its `EmailLog` row; tagged onto the
    /// provider message where the provider supports custom tags so inbound
    /// feedback events can round-trip even if the provider's own message id
    /// gets lost.
    pub tracking_id: Uuid,
    pub sender: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum ProviderErrorKind {
    RateLimited,
    ConnectionError,
    AuthError,
    InvalidRecipient,
    Bounced,
    Unknown,
}

impl ProviderErrorKind {
    /// Whether a send worker should schedule a retry for an error of this
    /// kind, per the classification rules.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderErrorKind::RateLimited
                | ProviderErrorKind::ConnectionError
                | ProviderErrorKind::Unknown
        )
    }
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message_id: String,
}

#[derive(Debug, Clone)]
pub struct SendFailure {
    pub kind: ProviderErrorKind,
    pub message: String,
}

pub type SendResult = Result<SendOutcome, SendFailure>;

/// Deterministic, case-insensitive substring classification of a raw
/// provider error string into a `ProviderErrorKind`.
///
/// Order matters: more specific categories (auth, invalid recipient) are
/// checked before the broader `Bounced`/`Unknown` catch-alls so that, e.g.,
/// an SMTP `550 invalid recipient` doesn't get swallowed by a looser
/// "reject" rule.
pub fn classify_provider_error(raw: &str) -> ProviderErrorKind {
    let lower = raw.to_lowercase();

    let contains_any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if contains_any(&["rate", "throttl", "too many"]) {
        ProviderErrorKind::RateLimited
    } else if contains_any(&["connect", "timeout", "refused"]) {
        ProviderErrorKind::ConnectionError
    } else if contains_any(&["auth", "credential", "535"]) {
        ProviderErrorKind::AuthError
    } else if contains_any(&["invalid recipient", "550"]) {
        ProviderErrorKind::InvalidRecipient
    } else if contains_any(&["bounce", "reject", "blocked"]) {
        ProviderErrorKind::Bounced
    } else {
        ProviderErrorKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_case_insensitively() {
        assert_eq!(
            classify_provider_error("Throttling: Maximum sending rate exceeded"),
            ProviderErrorKind::RateLimited
        );
    }

    #[test]
    fn classifies_smtp_auth_failure() {
        assert_eq!(
            classify_provider_error("535 5.7.8 Authentication credentials invalid"),
            ProviderErrorKind::AuthError
        );
        assert!(!ProviderErrorKind::AuthError.is_retryable());
    }

    #[test]
    fn classifies_invalid_recipient_before_bounce_rule() {
        assert_eq!(
            classify_provider_error("550 Invalid recipient <foo@bar>"),
            ProviderErrorKind::InvalidRecipient
        );
    }

    #[test]
    fn unknown_errors_are_retryable() {
        let kind = classify_provider_error("mailbox gremlins ate the packet");
        assert_eq!(kind, ProviderErrorKind::Unknown);
        assert!(kind.is_retryable());
    }
}
