use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::state::SharedState;

pub async fn live() -> &'static str {
    "ok"
}

/// 200 only while the listener is serving; load balancers stop routing
/// here as soon as shutdown begins.
pub async fn ready(State(state): State<SharedState>) -> (StatusCode, Json<Value>) {
    let current = state.readiness.state();
    if state.readiness.is_ready() {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": current.as_str() })),
        )
    }
}
