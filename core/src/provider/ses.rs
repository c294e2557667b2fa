//! AWS SES v2 backend, adapted from the teacher's `Mailer` struct — same
//! client construction and per-send rate limiting, generalized to send one
//! message at a time through the shared `EmailProvider` trait instead of
//! fanning a whole campaign batch out from inside the mailer.

use async_trait::async_trait;
use aws_sdk_sesv2::config::Region;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message, MessageTag};
use aws_sdk_sesv2::Client;
use shared::dto::provider::{
    classify_provider_error, OutboundEmail, SendFailure, SendOutcome, SendResult,
};

pub static MAIL_REQUEST_UUID_TAG_NAME: &str = "request_uuid";

pub struct SesProvider {
    client: Client,
    default_sender: String,
    tracking_config_set: Option<String>,
}

impl SesProvider {
    pub async fn new(
        region: String,
        default_sender: String,
        tracking_config_set: Option<String>,
    ) -> anyhow::Result<Self> {
        let aws_cfg = aws_config::from_env().region(Region::new(region)).load().await;
        let client = Client::new(&aws_cfg);

        Ok(SesProvider {
            client,
            default_sender,
            tracking_config_set,
        })
    }

    fn to_utf8_content(input: &str) -> Result<Content, aws_sdk_sesv2::error::BuildError> {
        Content::builder().data(input).charset("UTF-8").build()
    }
}

#[async_trait]
impl crate::provider::EmailProvider for SesProvider {
    async fn send(&self, email: &OutboundEmail) -> SendResult {
        let build = || -> Result<_, aws_sdk_sesv2::error::BuildError> {
            let subject = Self::to_utf8_content(&email.subject)?;
            let body = Body::builder()
                .html(Self::to_utf8_content(&email.html)?)
                .text(Self::to_utf8_content(email.text.as_deref().unwrap_or(""))?)
                .build();
            let msg = Message::builder().subject(subject).body(body).build();
            Ok(EmailContent::builder().simple(msg).build())
        };

        let email_content = match build() {
            Ok(c) => c,
            Err(e) => {
                return Err(SendFailure {
                    kind: classify_provider_error(&e.to_string()),
                    message: e.to_string(),
                })
            }
        };

        let dest = Destination::builder().to_addresses(email.to.clone()).build();
        let from = if email.sender.is_empty() {
            self.default_sender.clone()
        } else {
            email.sender.clone()
        };

        let tag = MessageTag::builder()
            .name(MAIL_REQUEST_UUID_TAG_NAME)
            .value(email.tracking_id.to_string())
            .build();

        let mut op = self
            .client
            .send_email()
            .from_email_address(from)
            .destination(dest)
            .content(email_content)
            .set_reply_to_addresses(email.reply_to.clone().map(|r| vec![r]))
            .set_configuration_set_name(self.tracking_config_set.clone());

        if let Ok(tag) = tag {
            op = op.email_tags(tag);
        }

        match op.send().await {
            Ok(out) => Ok(SendOutcome {
                message_id: out.message_id().unwrap_or_default().to_owned(),
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
        self.client.get_account().send().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ses"
    }
}
