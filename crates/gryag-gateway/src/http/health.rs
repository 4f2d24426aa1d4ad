//! GET /health (spec.md §6): liveness probe.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

pub async fn health_handler(State(_state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
