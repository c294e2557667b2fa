//! Email-provider driver abstraction. The teacher's mailer service talked to
//! SES directly; this generalizes that into a trait with two backends so an
//! organization can be configured for either SES or plain SMTP per
//! `shared::config::EmailProviderKind`.

pub mod ses;
pub mod smtp;

use async_trait::async_trait;
use shared::dto::provider::{OutboundEmail, SendResult};

/// A single outbound send or verification backend. Implementations own their
/// own connection pool/client and are expected to be cheap to clone (an
/// `Arc` inside) since one instance is shared across send-worker tasks.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Sends one message, returning the provider's message id on success or
    /// a classified failure reason on error.
    async fn send(&self, email: &OutboundEmail) -> SendResult;

    /// Best-effort check that the provider is reachable and authorized;
    /// used at worker startup and in the health endpoint.
    async fn verify(&self) -> anyhow::Result<()>;

    /// A short label for logs and metrics (`"ses"`, `"smtp"`).
    fn name(&self) -> &'static str;
}
