use crate::api::{ApiError, AppState};
use crate::payments::types::{Amount, PaymentForm, PaymentStatusRecord, PublicConfig};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    pub success: bool,
    pub payment_url: Option<String>,
    pub order_id: String,
    pub payment_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmBody {
    /// Amount to capture, in kopecks
    pub amount: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

/// First address of `X-Forwarded-For`, falling back to `X-Real-IP`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    header("x-forwarded-for").or_else(|| header("x-real-ip"))
}

pub async fn initiate(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<PaymentForm>, JsonRejection>,
) -> Result<Json<InitiateResponse>, ApiError> {
    let Json(form) = payload?;

    let request = state
        .gateway
        .build_payment_request(form, client_ip(&headers));
    let result = state.gateway.initiate_payment(request).await?;

    Ok(Json(InitiateResponse {
        success: result.success,
        payment_url: result.payment_url,
        order_id: result.order_id,
        payment_id: result.payment_id,
        status: result.status,
    }))
}

pub async fn notification(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    match state.gateway.handle_notification(&body).await {
        Ok(notification) => {
            info!(
                "Payment notification: order={} status={} payment_id={}",
                notification.order_id, notification.status, notification.payment_id
            );
            Ok("OK")
        }
        Err(err) => {
            warn!(error = %err, "Rejected payment notification");
            Err(ApiError::notification_rejected(&err))
        }
    }
}

pub async fn status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<PaymentStatusRecord>, ApiError> {
    let record = state.gateway.get_payment_status(&order_id).await?;
    Ok(Json(record))
}

pub async fn confirm(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    payload: Result<Json<ConfirmBody>, JsonRejection>,
) -> Result<Json<AckResponse>, ApiError> {
    let Json(body) = payload?;
    state
        .gateway
        .confirm_payment(&payment_id, body.amount)
        .await?;
    Ok(Json(AckResponse { success: true }))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<AckResponse>, ApiError> {
    state.gateway.cancel_payment(&payment_id).await?;
    Ok(Json(AckResponse { success: true }))
}

pub async fn public_config(State(state): State<AppState>) -> Json<PublicConfig> {
    Json(state.gateway.public_config())
}
