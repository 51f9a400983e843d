use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{Attachment, Channel, ChannelError, ChannelKind, Delivery};
use crate::config::SmtpConfig;
use crate::roster::{Recipient, SenderCredential};
use crate::rotator::SenderRotator;

pub const DEFAULT_SUBJECT: &str = "Test Email";

/// SMTP delivery, one fresh connection per message, sender rotated per attempt.
pub struct EmailChannel {
    smtp: SmtpConfig,
    subject: String,
    rotator: SenderRotator,
}

impl EmailChannel {
    pub fn new(smtp: SmtpConfig, subject: String, rotator: SenderRotator) -> Self {
        Self {
            smtp,
            subject,
            rotator,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[async_trait]
impl Channel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn deliver(
        &mut self,
        recipient: &Recipient,
        message: &str,
        attachment: Option<&Attachment>,
    ) -> Delivery {
        // Rotate first: the cursor moves once per attempt even if the row is unusable.
        let sender = self.rotator.next_sender().clone();

        let result = match recipient.email.as_deref() {
            Some(to) => send(&self.smtp, &sender, to, &self.subject, message, attachment).await,
            None => Err(ChannelError::from("recipient has no email address")),
        };

        Delivery {
            sender: sender.email,
            receiver: recipient.email.clone(),
            outcome: result.into(),
        }
    }
}

async fn send(
    smtp: &SmtpConfig,
    sender: &SenderCredential,
    to: &str,
    subject: &str,
    body: &str,
    attachment: Option<&Attachment>,
) -> Result<(), ChannelError> {
    let message = build_message(&sender.email, to, subject, body, attachment)?;

    let transport = build_smtp_transport(smtp, sender)
        .map_err(|e| ChannelError::from(format!("Failed to build SMTP transport: {e}")))?;

    transport
        .send(message)
        .await
        .map_err(|e| ChannelError::from(format!("Failed to send email: {e}")))?;

    Ok(())
}

/// Plain-text body plus an optional binary attachment, always multipart/mixed.
pub fn build_message(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
    attachment: Option<&Attachment>,
) -> Result<Message, ChannelError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| ChannelError::from(format!("Invalid from address: {e}")))?;
    let to: Mailbox = to
        .parse()
        .map_err(|e| ChannelError::from(format!("Invalid to address: {e}")))?;

    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(body.to_string()));

    if let Some(attachment) = attachment {
        let content_type = ContentType::parse("application/octet-stream")
            .map_err(|e| ChannelError::from(format!("Invalid attachment type: {e}")))?;
        parts = parts.singlepart(
            MailAttachment::new(attachment.file_name.clone())
                .body(attachment.bytes.to_vec(), content_type),
        );
    }

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .multipart(parts)
        .map_err(|e| ChannelError::from(format!("Failed to build email: {e}")))
}

pub fn build_smtp_transport(
    smtp: &SmtpConfig,
    sender: &SenderCredential,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, String> {
    let creds = Credentials::new(sender.email.clone(), sender.app_password.clone());

    let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        .map_err(|e| format!("SMTP starttls error: {e}"))?
        .port(smtp.port)
        .credentials(creds)
        .build();

    Ok(transport)
}
