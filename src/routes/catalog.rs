use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::channel::ChannelKind;
use crate::state::SharedState;

pub async fn list_departments(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(json!({ "departments": state.roster.departments() }))
}

pub async fn list_channels(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let channels = vec![
        json!({
            "id": ChannelKind::Email,
            "configured": !state.roster.senders.is_empty(),
            "senders": state.roster.senders.len(),
        }),
        json!({
            "id": ChannelKind::WhatsApp,
            "configured": state.config.gateway.is_some(),
            "media_types": ["image", "document", "audio"],
        }),
    ];

    Json(json!({ "channels": channels }))
}
