use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::channel::email::{DEFAULT_SUBJECT, EmailChannel};
use crate::channel::whatsapp::WhatsAppChannel;
use crate::channel::{Attachment, Channel, ChannelKind, MediaType};
use crate::dispatch::{self, RunProgress, RunReport};
use crate::error::AppError;
use crate::roster::Recipient;
use crate::rotator::SenderRotator;
use crate::state::{AppState, SharedState};
use crate::template::MessageTemplate;

pub const DEFAULT_EMAIL_TEMPLATE: &str = "Hello {name},\nThis is a test email.";
pub const DEFAULT_WHATSAPP_TEMPLATE: &str = "Hi {name}, this is a test message!";

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub method: ChannelKind,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub media_type: MediaType,
    #[serde(default)]
    pub departments: Vec<String>,
}

pub fn default_template(kind: ChannelKind) -> &'static str {
    match kind {
        ChannelKind::Email => DEFAULT_EMAIL_TEMPLATE,
        ChannelKind::WhatsApp => DEFAULT_WHATSAPP_TEMPLATE,
    }
}

/// Run a dispatch to completion and return its report.
///
/// Everything that can be checked up front (template, channel settings, audit
/// log) is checked before the first message goes out.
pub async fn start(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RunReport>, AppError> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

    let (req, attachment) = if content_type.is_some_and(|ct| ct.contains("multipart/form-data")) {
        parse_multipart(&headers, body)
            .await
            .map_err(AppError::BadRequest)?
    } else {
        let req: RunRequest = serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON: {e}")))?;
        (req, None)
    };

    let template = MessageTemplate::parse(
        req.template
            .as_deref()
            .unwrap_or_else(|| default_template(req.method)),
    )?;

    let mut channel = build_channel(&state, &req)?;

    let guard = state.run_lock.clone().try_lock_owned().map_err(|_| {
        AppError::Conflict("A dispatch run is already in progress".to_string())
    })?;

    state
        .audit
        .check()
        .await
        .map_err(|e| AppError::Unavailable(format!("Audit log is not usable: {e}")))?;

    let recipients: Vec<Recipient> = state
        .roster
        .filter_by_departments(&req.departments)
        .into_iter()
        .cloned()
        .collect();

    // The run owns everything it touches, so a dropped request cannot cut it short.
    let task_state = state.clone();
    let run = tokio::spawn(async move {
        let _guard = guard;
        let recipients: Vec<&Recipient> = recipients.iter().collect();
        dispatch::run(
            channel.as_mut(),
            task_state.audit.as_ref(),
            &recipients,
            &template,
            attachment.as_ref(),
            &task_state.progress,
        )
        .await
    });

    let report = run
        .await
        .map_err(|e| AppError::Internal(format!("Dispatch task failed: {e}")))?;

    Ok(Json(report))
}

#[derive(Serialize)]
pub struct ProgressView {
    #[serde(flatten)]
    pub progress: RunProgress,
    pub readout: String,
}

pub async fn current(State(state): State<SharedState>) -> Json<ProgressView> {
    let progress = state.progress.borrow().clone();
    let readout = progress.readout();
    Json(ProgressView { progress, readout })
}

fn build_channel(state: &AppState, req: &RunRequest) -> Result<Box<dyn Channel>, AppError> {
    match req.method {
        ChannelKind::Email => {
            let subject = req
                .subject
                .clone()
                .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
            if subject.trim().is_empty() {
                return Err(AppError::BadRequest("Email subject is required".to_string()));
            }

            let rotator = SenderRotator::new(state.roster.senders.clone()).ok_or_else(|| {
                AppError::Unavailable("No sender credentials loaded".to_string())
            })?;

            Ok(Box::new(EmailChannel::new(
                state.config.smtp.clone(),
                subject,
                rotator,
            )))
        }
        ChannelKind::WhatsApp => {
            let gateway = state.config.gateway.clone().ok_or_else(|| {
                AppError::Unavailable("WhatsApp gateway is not configured".to_string())
            })?;

            let channel = WhatsAppChannel::new(gateway, req.media_type)
                .map_err(|e| AppError::Internal(e.message))?;

            Ok(Box::new(channel))
        }
    }
}

/// Parse a multipart run request. The optional file goes in the `attachment`
/// part; `departments` may repeat.
async fn parse_multipart(
    headers: &HeaderMap,
    body: Bytes,
) -> Result<(RunRequest, Option<Attachment>), String> {
    let boundary = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or_else(|| "Missing multipart boundary".to_string())?;

    let stream = futures_util::stream::once(async { Ok::<_, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut method = None;
    let mut template = None;
    let mut subject = None;
    let mut media_type = MediaType::default();
    let mut departments = Vec::new();
    let mut attachment = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Multipart error: {e}"))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "attachment" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| format!("Attachment read error: {e}"))?;

            // Browsers send an empty part when no file was chosen.
            if !file_name.is_empty() || !bytes.is_empty() {
                attachment = Some(Attachment {
                    file_name: if file_name.is_empty() {
                        "attachment".to_string()
                    } else {
                        file_name
                    },
                    bytes,
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| format!("Field read error: {e}"))?;

        match name.as_str() {
            "method" => method = Some(value.parse::<ChannelKind>()?),
            "template" => template = Some(value),
            "subject" => subject = Some(value),
            "media_type" => media_type = value.parse::<MediaType>()?,
            "departments" if !value.trim().is_empty() => departments.push(value),
            _ => {}
        }
    }

    let method = method.ok_or_else(|| "method is required".to_string())?;

    Ok((
        RunRequest {
            method,
            template,
            subject,
            media_type,
            departments,
        },
        attachment,
    ))
}
