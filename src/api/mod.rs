//! HTTP adapters over the payment gateway

pub mod error;
pub mod health;
pub mod payments;

use crate::payments::traits::PaymentGateway;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn PaymentGateway>,
    pub environment: String,
}

impl AppState {
    pub fn new(gateway: Arc<dyn PaymentGateway>, environment: impl Into<String>) -> Self {
        Self {
            gateway,
            environment: environment.into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/payment/initiate", post(payments::initiate))
        .route("/api/payment/callback", post(payments::notification))
        .route("/api/payment/config", get(payments::public_config))
        .route("/api/payment/status/:order_id", get(payments::status))
        .route("/api/payment/confirm/:payment_id", post(payments::confirm))
        .route("/api/payment/cancel/:payment_id", post(payments::cancel))
        .with_state(state)
}
