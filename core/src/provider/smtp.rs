//! Plain SMTP backend via `lettre`, for organizations configured with
//! `EMAIL_PROVIDER=smtp` instead of SES. Not something the teacher's mailer
//! ever did (it was SES-only); grounded on `lettre`'s own async transport
//! builder pattern since that's the crate the expanded configuration pulls
//! in for this path.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};
use shared::dto::provider::{
    classify_provider_error, OutboundEmail, SendFailure, SendOutcome, SendResult,
};

pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    default_sender: String,
}

impl SmtpProvider {
    /// `smtp_secure` selects implicit TLS (`relay`, the crate's encrypted
    /// default) over `builder_dangerous`'s plaintext connection; callers set
    /// it from `SMTP_SECURE` and should leave it on outside local dev.
    pub fn new(
        host: &str,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        default_sender: String,
        smtp_secure: bool,
    ) -> anyhow::Result<Self> {
        let mut builder = if smtp_secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)?.port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port)
        };

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        Ok(SmtpProvider {
            transport: builder.build(),
            default_sender,
        })
    }
}

#[async_trait]
impl crate::provider::EmailProvider for SmtpProvider {
    async fn send(&self, email: &OutboundEmail) -> SendResult {
        let from = if email.sender.is_empty() {
            self.default_sender.clone()
        } else {
            email.sender.clone()
        };

        let build = || -> anyhow::Result<LettreMessage> {
            let mut builder = LettreMessage::builder()
                .from(from.parse::<Mailbox>()?)
                .to(email.to.parse::<Mailbox>()?)
                .subject(&email.subject);

            if let Some(reply_to) = &email.reply_to {
                builder = builder.reply_to(reply_to.parse::<Mailbox>()?);
            }

            let text_part = SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(email.text.clone().unwrap_or_default());
            let html_part = SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(email.html.clone());

            Ok(builder.multipart(MultiPart::alternative().singlepart(text_part).singlepart(html_part))?)
        };

        let message = match build() {
            Ok(m) => m,
            Err(e) => {
                return Err(SendFailure {
                    kind: classify_provider_error(&e.to_string()),
                    message: e.to_string(),
                })
            }
        };

        match self.transport.send(message).await {
            Ok(_) => Ok(SendOutcome {
                message_id: email.tracking_id.to_string(),
            }),
            Err(err) => {
                let raw = err.to_string();
                Err(SendFailure {
                    kind: classify_provider_error(&raw),
                    message: raw,
                })
            }
        }
    }

    async fn verify(&self) -> anyhow::Result<()> {
        if self.transport.test_connection().await? {
            Ok(())
        } else {
            anyhow::bail!("smtp connection test failed")
        }
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
