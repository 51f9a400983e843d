pub mod catalog;
pub mod runs;

use axum::routing::{get, post};
use axum::Router;

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/api/v1/departments", get(catalog::list_departments))
        .route("/api/v1/channels", get(catalog::list_channels))
        .route("/api/v1/runs", post(runs::start))
        .route("/api/v1/runs/current", get(runs::current))
}
