pub mod email;
pub mod whatsapp;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::roster::Recipient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    #[serde(alias = "email")]
    Email,
    #[serde(alias = "whatsapp")]
    WhatsApp,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "Email",
            ChannelKind::WhatsApp => "WhatsApp",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(ChannelKind::Email),
            "whatsapp" => Ok(ChannelKind::WhatsApp),
            other => Err(format!("Unknown channel: {other}")),
        }
    }
}

/// Gateway media tag for WhatsApp attachments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Image,
    Document,
    Audio,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Document => "document",
            MediaType::Audio => "audio",
        }
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(MediaType::Image),
            "document" => Ok(MediaType::Document),
            "audio" => Ok(MediaType::Audio),
            other => Err(format!("Unknown media type: {other}")),
        }
    }
}

/// An uploaded file sent along with every message of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Success,
    Failed { detail: String },
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success)
    }

    /// Audit log status: `Success` or `Failed: <detail>`.
    pub fn status_text(&self) -> String {
        match self {
            DeliveryOutcome::Success => "Success".to_string(),
            DeliveryOutcome::Failed { detail } => format!("Failed: {detail}"),
        }
    }
}

impl From<Result<(), ChannelError>> for DeliveryOutcome {
    fn from(result: Result<(), ChannelError>) -> Self {
        match result {
            Ok(()) => DeliveryOutcome::Success,
            Err(e) if e.message.trim().is_empty() => DeliveryOutcome::Failed {
                detail: "unknown error".to_string(),
            },
            Err(e) => DeliveryOutcome::Failed { detail: e.message },
        }
    }
}

/// What happened for one recipient, and on whose behalf.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub sender: String,
    pub receiver: Option<String>,
    pub outcome: DeliveryOutcome,
}

#[derive(Debug)]
pub struct ChannelError {
    pub message: String,
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ChannelError {}

impl From<String> for ChannelError {
    fn from(s: String) -> Self {
        ChannelError { message: s }
    }
}

impl From<&str> for ChannelError {
    fn from(s: &str) -> Self {
        ChannelError {
            message: s.to_string(),
        }
    }
}

/// A transport able to deliver one rendered message to one recipient.
///
/// `deliver` never fails: every error is folded into the returned
/// [`DeliveryOutcome`] so a single bad recipient cannot stop a run.
#[async_trait]
pub trait Channel: Send {
    fn kind(&self) -> ChannelKind;

    async fn deliver(
        &mut self,
        recipient: &Recipient,
        message: &str,
        attachment: Option<&Attachment>,
    ) -> Delivery;
}
