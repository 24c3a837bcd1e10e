use axum::{extract::State, response::Json};
use serde_json::{Value, json};

use super::AppState;

/// `GET /health`
///
/// Also lists the plan providers that have credentials, so a deployment
/// that would only ever answer `NoProviderConfigured` is visible here.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "planners": state.planner.configured(),
    }))
}
