use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use super::{Attachment, Channel, ChannelError, ChannelKind, Delivery, MediaType};
use crate::config::GatewayConfig;
use crate::roster::Recipient;

/// Delay the gateway waits before sending a text message, in milliseconds.
const TEXT_DELAY_MS: u64 = 3000;

/// WhatsApp delivery through an Evolution API gateway instance.
pub struct WhatsAppChannel {
    client: reqwest::Client,
    gateway: GatewayConfig,
    media_type: MediaType,
}

impl WhatsAppChannel {
    pub fn new(gateway: GatewayConfig, media_type: MediaType) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ChannelError::from(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            gateway,
            media_type,
        })
    }

    pub async fn send_text(&self, number: &str, text: &str) -> Result<Value, ChannelError> {
        let payload = json!({
            "number": number,
            "options": { "delay": TEXT_DELAY_MS },
            "linkPreview": true,
            "text": text,
        });
        self.post("sendText", &payload).await
    }

    pub async fn send_media(
        &self,
        number: &str,
        media_type: MediaType,
        file_name: &str,
        caption: &str,
        bytes: &[u8],
    ) -> Result<Value, ChannelError> {
        let payload = json!({
            "number": number,
            "mediatype": media_type.as_str(),
            "fileName": file_name,
            "caption": caption,
            "media": STANDARD.encode(bytes),
        });
        self.post("sendMedia", &payload).await
    }

    async fn post(&self, operation: &str, payload: &Value) -> Result<Value, ChannelError> {
        let url = format!(
            "{}/message/{operation}/{}",
            self.gateway.base_url, self.gateway.instance_name
        );

        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.gateway.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| ChannelError::from(format!("Gateway request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ChannelError::from(format!("Failed to read gateway response: {e}")))?;

        if !status.is_success() {
            let snippet: String = body.chars().take(512).collect();
            return Err(ChannelError::from(format!(
                "Gateway returned HTTP {}: {snippet}",
                status.as_u16()
            )));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ChannelError::from(format!("Invalid gateway response: {e}")))?;

        if let Some(detail) = payload_error(&value) {
            return Err(ChannelError::from(format!("Gateway error: {detail}")));
        }

        Ok(value)
    }
}

#[async_trait]
impl Channel for WhatsAppChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::WhatsApp
    }

    async fn deliver(
        &mut self,
        recipient: &Recipient,
        message: &str,
        attachment: Option<&Attachment>,
    ) -> Delivery {
        let result = match (recipient.number.as_deref(), attachment) {
            (None, _) => Err(ChannelError::from("recipient has no number")),
            (Some(number), Some(media)) => self
                .send_media(number, self.media_type, &media.file_name, message, &media.bytes)
                .await
                .map(|_| ()),
            (Some(number), None) => self.send_text(number, message).await.map(|_| ()),
        };

        Delivery {
            sender: self.gateway.instance_name.clone(),
            receiver: recipient.number.clone(),
            outcome: result.into(),
        }
    }
}

/// Extract an application-level error from a gateway response body.
///
/// The gateway may answer HTTP 200 and still report a failure in the payload,
/// e.g. `{"status": 400, "error": "Bad Request", "response": {"message": [...]}}`.
pub fn payload_error(value: &Value) -> Option<String> {
    let error = match value.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };

    let status_failed = value
        .get("status")
        .and_then(Value::as_u64)
        .is_some_and(|code| code >= 400);

    if error.is_none() && !status_failed {
        return None;
    }

    let mut detail = error.unwrap_or_else(|| {
        format!(
            "status {}",
            value.get("status").map(Value::to_string).unwrap_or_default()
        )
    });

    if let Some(message) = value.get("response").and_then(|r| r.get("message")) {
        let text = match message {
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        };
        if !text.is_empty() {
            detail = format!("{detail} ({text})");
        }
    }

    Some(detail)
}
