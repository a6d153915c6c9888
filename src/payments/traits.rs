//! Payment gateway trait definitions
//!
//! Defines the interface the HTTP layer uses to talk to the acquiring gateway.

use crate::error::GatewayResult;
use crate::payments::types::{
    Amount, Notification, PaymentForm, PaymentRequest, PaymentResult, PaymentStatusRecord,
    PublicConfig,
};
use async_trait::async_trait;

/// Trait for payment gateway implementations
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initialize a payment session
    ///
    /// Registers the order with the gateway and returns the hosted payment page URL.
    /// The resulting status is remembered for later [`get_payment_status`] calls.
    ///
    /// # Arguments
    /// * `request` - Order id, amount in minor units, description and optional receipt
    ///
    /// # Returns
    /// * `PaymentResult` - Gateway payment id, status and payment page URL
    ///
    /// [`get_payment_status`]: PaymentGateway::get_payment_status
    async fn initiate_payment(&self, request: PaymentRequest) -> GatewayResult<PaymentResult>;

    /// Current status of an order
    ///
    /// Served from the status cache when the order is known; the gateway is only
    /// asked when nothing is cached.
    async fn get_payment_status(&self, order_id: &str) -> GatewayResult<PaymentStatusRecord>;

    /// Capture funds of a two-step payment
    async fn confirm_payment(&self, payment_id: &str, amount: Amount) -> GatewayResult<()>;

    /// Cancel a payment
    async fn cancel_payment(&self, payment_id: &str) -> GatewayResult<()>;

    /// Process a webhook notification body
    ///
    /// Returns the decoded notification once it is accepted, whether or not a
    /// cached record was updated.
    async fn handle_notification(&self, body: &[u8]) -> GatewayResult<Notification>;

    /// Turn a payment page submission into a request, assigning an order id if missing
    fn build_payment_request(&self, form: PaymentForm, client_ip: Option<String>)
        -> PaymentRequest;

    /// Configuration without secrets
    fn public_config(&self) -> PublicConfig;
}
