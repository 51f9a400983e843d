use askama::Template;
use axum::extract::State;
use axum::response::{Html, IntoResponse};

use crate::channel::email::DEFAULT_SUBJECT;
use crate::error::AppError;
use crate::routes::runs::{DEFAULT_EMAIL_TEMPLATE, DEFAULT_WHATSAPP_TEMPLATE};
use crate::state::SharedState;

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    recipient_count: usize,
    sender_count: usize,
    departments: Vec<String>,
    whatsapp_configured: bool,
    default_subject: &'static str,
    email_template: &'static str,
    whatsapp_template: &'static str,
    readout: String,
}

pub async fn index(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    let template = IndexTemplate {
        recipient_count: state.roster.recipients.len(),
        sender_count: state.roster.senders.len(),
        departments: state.roster.departments(),
        whatsapp_configured: state.config.gateway.is_some(),
        default_subject: DEFAULT_SUBJECT,
        email_template: DEFAULT_EMAIL_TEMPLATE,
        whatsapp_template: DEFAULT_WHATSAPP_TEMPLATE,
        readout: state.progress.borrow().readout(),
    };

    let html = template
        .render()
        .map_err(|e| AppError::Internal(format!("Failed to render page: {e}")))?;
    Ok(Html(html))
}
