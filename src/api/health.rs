use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub terminal_configured: bool,
}

pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let public = state.gateway.public_config();
    let terminal_configured = !public.terminal_key.is_empty() && !public.base_url.is_empty();

    let response = HealthResponse {
        status: "healthy".to_string(),
        version,
        environment: state.environment.clone(),
        terminal_configured,
    };

    Ok(Json(response))
}
