//! T-Bank acquiring provider implementation
//!
//! This module talks to the T-Bank internet acquiring API (v2): Init, GetState,
//! Confirm and Cancel, plus processing of the gateway's webhook notifications.

use crate::cache::{InMemoryStatusCache, StatusStore, StatusUpdate};
use crate::error::{GatewayError, GatewayResult};
use crate::payments::signer::TokenFields;
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{
    string_or_number, Amount, CustomerInfo, Notification, PaymentForm, PaymentRequest,
    PaymentResult, PaymentStatusRecord, PublicConfig, Receipt, ReceiptItem,
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "https://securepayments.tbank.ru/eacq/v2";

/// T-Bank terminal configuration
#[derive(Clone)]
pub struct TBankConfig {
    /// Terminal key from the merchant cabinet
    pub terminal_key: String,
    /// Terminal password, used only for token computation
    pub password: String,
    /// API base URL, without the method name
    pub base_url: String,
    /// Redirect after a successful payment
    pub success_url: Option<String>,
    /// Redirect after a failed payment
    pub fail_url: Option<String>,
    /// Webhook URL for status notifications
    pub notification_url: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Recompute and compare the token of inbound notifications
    pub verify_notification_token: bool,
}

impl Default for TBankConfig {
    fn default() -> Self {
        Self {
            terminal_key: String::new(),
            password: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            success_url: None,
            fail_url: None,
            notification_url: None,
            timeout_secs: 30,
            verify_notification_token: false,
        }
    }
}

impl fmt::Debug for TBankConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TBankConfig")
            .field("terminal_key", &self.terminal_key)
            .field("password", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("success_url", &self.success_url)
            .field("fail_url", &self.fail_url)
            .field("notification_url", &self.notification_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("verify_notification_token", &self.verify_notification_token)
            .finish()
    }
}

impl TBankConfig {
    pub fn new(terminal_key: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            terminal_key: terminal_key.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Create config from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let optional = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let terminal_key =
            std::env::var("TBANK_TERMINAL_KEY").context("TBANK_TERMINAL_KEY not set")?;
        let password = std::env::var("TBANK_PASSWORD").context("TBANK_PASSWORD not set")?;

        let base_url =
            std::env::var("TBANK_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let timeout_secs = match std::env::var("TBANK_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .context("TBANK_TIMEOUT_SECS must be a valid number")?,
            Err(_) => 30,
        };

        let verify_notification_token = match std::env::var("TBANK_VERIFY_NOTIFICATION_TOKEN") {
            Ok(raw) => raw
                .parse::<bool>()
                .context("TBANK_VERIFY_NOTIFICATION_TOKEN must be true or false")?,
            Err(_) => false,
        };

        Ok(Self {
            terminal_key,
            password,
            base_url,
            success_url: optional("TBANK_SUCCESS_URL"),
            fail_url: optional("TBANK_FAIL_URL"),
            notification_url: optional("TBANK_NOTIFICATION_URL"),
            timeout_secs,
            verify_notification_token,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.terminal_key.trim().is_empty() {
            return Err(anyhow!("TBANK_TERMINAL_KEY cannot be empty"));
        }

        if self.password.trim().is_empty() {
            return Err(anyhow!("TBANK_PASSWORD cannot be empty"));
        }

        if self.base_url.trim().is_empty() {
            return Err(anyhow!("TBANK_BASE_URL cannot be empty"));
        }

        if self.timeout_secs == 0 {
            return Err(anyhow!("TBANK_TIMEOUT_SECS must be greater than 0"));
        }

        Ok(())
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), method)
    }

    pub fn public_view(&self) -> PublicConfig {
        PublicConfig {
            terminal_key: self.terminal_key.clone(),
            base_url: self.base_url.clone(),
            callback_url: self.notification_url.clone(),
            success_url: self.success_url.clone(),
            fail_url: self.fail_url.clone(),
        }
    }
}

/// T-Bank payment gateway client
pub struct TBankClient {
    config: TBankConfig,
    client: Client,
    cache: Arc<dyn StatusStore>,
}

impl TBankClient {
    /// Create a client with its own in-memory status cache
    pub fn new(config: TBankConfig) -> GatewayResult<Self> {
        Self::with_store(config, Arc::new(InMemoryStatusCache::new()))
    }

    /// Create a client backed by the given status store
    pub fn with_store(config: TBankConfig, cache: Arc<dyn StatusStore>) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::network(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "T-Bank client initialized for terminal {} with URL: {}",
            config.terminal_key, config.base_url
        );

        Ok(Self {
            config,
            client,
            cache,
        })
    }

    pub fn config(&self) -> &TBankConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn StatusStore> {
        &self.cache
    }

    /// Forget every cached status
    pub async fn clear_cache(&self) -> usize {
        let removed = self.cache.clear().await;
        info!("T-Bank status cache cleared: {} records", removed);
        removed
    }

    /// Sign and send one API call
    async fn call<R>(&self, method: &str, request: &R) -> GatewayResult<TBankResponse>
    where
        R: SignedRequest,
    {
        let token = request
            .token_fields()
            .with("TerminalKey", &self.config.terminal_key)
            .sign(&self.config.password);

        let envelope = SignedEnvelope {
            terminal_key: &self.config.terminal_key,
            request,
            token,
        };

        let url = self.config.endpoint(method);
        debug!("Calling T-Bank {}: {}", method, url);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&envelope)
            .send()
            .await
            .map_err(|e| self.transport_error(method, e))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| self.transport_error(method, e))?;

        match serde_json::from_str::<TBankResponse>(&response_text) {
            Ok(body) if !body.success => {
                warn!(
                    "T-Bank {} rejected: code={}, message={:?}, details={:?}",
                    method, body.error_code, body.message, body.details
                );
                Err(GatewayError::rejected(
                    body.error_code,
                    body.message.unwrap_or_default(),
                    body.details.unwrap_or_default(),
                ))
            }
            _ if !status.is_success() => {
                error!("T-Bank {} returned HTTP {}: {}", method, status, response_text);
                Err(GatewayError::HttpStatus {
                    status: status.as_u16(),
                    body: response_text,
                })
            }
            Ok(body) => Ok(body),
            Err(e) => {
                error!("Failed to parse T-Bank {} response: {}", method, e);
                Err(GatewayError::serialization(format!(
                    "Invalid response format: {}",
                    e
                )))
            }
        }
    }

    fn transport_error(&self, method: &str, err: reqwest::Error) -> GatewayError {
        error!("T-Bank {} request failed: {}", method, err);
        if err.is_timeout() {
            GatewayError::timeout(self.config.timeout_secs)
        } else {
            err.into()
        }
    }

    fn validate_payment_request(request: &PaymentRequest) -> GatewayResult<()> {
        if request.order_id.trim().is_empty() {
            return Err(GatewayError::validation("orderId is required"));
        }
        if !request.amount.is_positive() {
            return Err(GatewayError::validation("amount must be greater than 0"));
        }
        Ok(())
    }

    fn require_payment_id(payment_id: &str) -> GatewayResult<()> {
        if payment_id.trim().is_empty() {
            return Err(GatewayError::validation("paymentId is required"));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for TBankClient {
    async fn initiate_payment(&self, request: PaymentRequest) -> GatewayResult<PaymentResult> {
        Self::validate_payment_request(&request)?;

        info!(
            "Initiating T-Bank payment: order={} amount={}",
            request.order_id, request.amount
        );

        if let Some(receipt) = &request.receipt {
            if !receipt.items.is_empty() && receipt.items_total() != request.amount.minor() {
                warn!(
                    "Receipt total {} differs from amount {} for order {}",
                    receipt.items_total(),
                    request.amount,
                    request.order_id
                );
            }
        }

        let body = InitRequest::new(&request, &self.config);
        let response = self.call("Init", &body).await?;

        info!(
            "T-Bank payment initiated: order={} payment_id={} status={}",
            request.order_id, response.payment_id, response.status
        );

        let now = Utc::now();
        self.cache
            .set(PaymentStatusRecord {
                order_id: request.order_id.clone(),
                payment_id: response.payment_id.clone(),
                status: response.status.clone(),
                amount: Some(request.amount),
                created_at: now,
                updated_at: now,
            })
            .await;

        Ok(PaymentResult {
            success: response.success,
            order_id: request.order_id,
            payment_id: response.payment_id,
            status: response.status,
            payment_url: response.payment_url,
            amount: request.amount,
            error_code: response.error_code,
            message: response.message,
            details: response.details,
        })
    }

    async fn get_payment_status(&self, order_id: &str) -> GatewayResult<PaymentStatusRecord> {
        if order_id.trim().is_empty() {
            return Err(GatewayError::validation("orderId is required"));
        }

        // Cached records are never refreshed from the gateway.
        if let Some(record) = self.cache.get(order_id).await {
            return Ok(record);
        }

        info!("Requesting T-Bank state: order={}", order_id);

        let response = self.call("GetState", &GetStateRequest { order_id }).await?;

        let now = Utc::now();
        let record = PaymentStatusRecord {
            order_id: order_id.to_string(),
            payment_id: response.payment_id,
            status: response.status,
            amount: response.amount.map(Amount::from_minor),
            created_at: now,
            updated_at: now,
        };
        self.cache.set(record.clone()).await;

        info!(
            "T-Bank state received: order={} status={}",
            order_id, record.status
        );
        Ok(record)
    }

    async fn confirm_payment(&self, payment_id: &str, amount: Amount) -> GatewayResult<()> {
        Self::require_payment_id(payment_id)?;
        if !amount.is_positive() {
            return Err(GatewayError::validation("amount must be greater than 0"));
        }

        info!(
            "Confirming T-Bank payment: payment_id={} amount={}",
            payment_id, amount
        );

        let response = self
            .call(
                "Confirm",
                &ConfirmRequest {
                    payment_id,
                    amount: amount.minor(),
                },
            )
            .await?;

        info!(
            "T-Bank payment confirmed: payment_id={} status={}",
            payment_id, response.status
        );
        Ok(())
    }

    async fn cancel_payment(&self, payment_id: &str) -> GatewayResult<()> {
        Self::require_payment_id(payment_id)?;

        info!("Cancelling T-Bank payment: payment_id={}", payment_id);

        let response = self.call("Cancel", &CancelRequest { payment_id }).await?;

        info!(
            "T-Bank payment cancelled: payment_id={} status={}",
            payment_id, response.status
        );
        Ok(())
    }

    async fn handle_notification(&self, body: &[u8]) -> GatewayResult<Notification> {
        let raw: serde_json::Value = serde_json::from_slice(body)?;
        let notification = Notification::deserialize(&raw)?;

        if notification.terminal_key != self.config.terminal_key {
            warn!(
                "Notification for order {} has unknown terminal key {}",
                notification.order_id, notification.terminal_key
            );
            return Err(GatewayError::authenticity(
                "invalid terminal key in notification",
            ));
        }

        if self.config.verify_notification_token {
            let object = raw
                .as_object()
                .ok_or_else(|| GatewayError::serialization("notification is not a JSON object"))?;
            let fields = TokenFields::from_json_object(object)?;
            if !fields.verify(&self.config.password, &notification.token) {
                warn!(
                    "Notification for order {} has an invalid token",
                    notification.order_id
                );
                return Err(GatewayError::authenticity("invalid notification token"));
            }
        }

        match self
            .cache
            .update_status(&notification.order_id, &notification.status, Utc::now())
            .await
        {
            StatusUpdate::Applied => info!(
                "Notification applied: order={} status={}",
                notification.order_id, notification.status
            ),
            StatusUpdate::Unchanged => debug!(
                "Notification repeats current status: order={} status={}",
                notification.order_id, notification.status
            ),
            StatusUpdate::Missing => debug!(
                "Notification for uncached order {} accepted without update",
                notification.order_id
            ),
        }

        Ok(notification)
    }

    fn build_payment_request(
        &self,
        form: PaymentForm,
        client_ip: Option<String>,
    ) -> PaymentRequest {
        let order_id = form
            .order_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(generate_order_id);

        let description = form
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Payment for order {}", order_id));

        PaymentRequest {
            order_id,
            amount: form.amount,
            description,
            receipt: form.receipt,
            customer: CustomerInfo {
                customer_key: form.customer_key,
                email: form.email,
                phone: form.phone,
                ip: client_ip,
                payment_type: form.payment_type,
            },
        }
    }

    fn public_config(&self) -> PublicConfig {
        self.config.public_view()
    }
}

/// 32 hex characters, within the gateway's 36 character OrderId limit
fn generate_order_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Request body that knows which of its fields take part in the token.
trait SignedRequest: Serialize + Sync {
    /// Root-level scalar fields, excluding `TerminalKey` and `Token`
    fn token_fields(&self) -> TokenFields;
}

#[derive(Serialize)]
struct SignedEnvelope<'a, R: Serialize> {
    #[serde(rename = "TerminalKey")]
    terminal_key: &'a str,
    #[serde(flatten)]
    request: &'a R,
    #[serde(rename = "Token")]
    token: String,
}

#[derive(Debug, Serialize)]
struct InitRequest<'a> {
    #[serde(rename = "Amount")]
    amount: i64,
    #[serde(rename = "OrderId")]
    order_id: &'a str,
    #[serde(rename = "Description")]
    description: &'a str,
    #[serde(rename = "CustomerKey", skip_serializing_if = "Option::is_none")]
    customer_key: Option<&'a str>,
    #[serde(rename = "Email", skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(rename = "Phone", skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
    #[serde(rename = "IP", skip_serializing_if = "Option::is_none")]
    ip: Option<&'a str>,
    #[serde(rename = "SuccessURL", skip_serializing_if = "Option::is_none")]
    success_url: Option<&'a str>,
    #[serde(rename = "FailURL", skip_serializing_if = "Option::is_none")]
    fail_url: Option<&'a str>,
    #[serde(rename = "NotificationURL", skip_serializing_if = "Option::is_none")]
    notification_url: Option<&'a str>,
    #[serde(rename = "Receipt", skip_serializing_if = "Option::is_none")]
    receipt: Option<ReceiptBody<'a>>,
    #[serde(rename = "DATA", skip_serializing_if = "Option::is_none")]
    data: Option<BTreeMap<&'static str, &'a str>>,
}

impl<'a> InitRequest<'a> {
    fn new(request: &'a PaymentRequest, config: &'a TBankConfig) -> Self {
        let customer = &request.customer;
        let non_empty = |v: &'a Option<String>| v.as_deref().filter(|s| !s.trim().is_empty());

        Self {
            amount: request.amount.minor(),
            order_id: &request.order_id,
            description: &request.description,
            customer_key: non_empty(&customer.customer_key),
            email: non_empty(&customer.email),
            phone: non_empty(&customer.phone),
            ip: non_empty(&customer.ip),
            success_url: config.success_url.as_deref(),
            fail_url: config.fail_url.as_deref(),
            notification_url: config.notification_url.as_deref(),
            receipt: request
                .receipt
                .as_ref()
                .filter(|r| r.has_contact())
                .map(ReceiptBody::from),
            data: non_empty(&customer.payment_type).map(|payment_type| {
                BTreeMap::from([("connection_type", "Widget"), ("PaymentType", payment_type)])
            }),
        }
    }
}

impl SignedRequest for InitRequest<'_> {
    fn token_fields(&self) -> TokenFields {
        TokenFields::new()
            .with("Amount", self.amount)
            .with("OrderId", self.order_id)
            .with("Description", self.description)
            .with_opt("CustomerKey", self.customer_key)
            .with_opt("Email", self.email)
            .with_opt("Phone", self.phone)
            .with_opt("IP", self.ip)
            .with_opt("SuccessURL", self.success_url)
            .with_opt("FailURL", self.fail_url)
            .with_opt("NotificationURL", self.notification_url)
    }
}

#[derive(Debug, Serialize)]
struct ReceiptBody<'a> {
    #[serde(rename = "Email", skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(rename = "Phone", skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
    #[serde(rename = "Taxation")]
    taxation: &'a str,
    #[serde(rename = "Items")]
    items: Vec<ReceiptItemBody<'a>>,
}

impl<'a> From<&'a Receipt> for ReceiptBody<'a> {
    fn from(receipt: &'a Receipt) -> Self {
        Self {
            email: receipt.email.as_deref(),
            phone: receipt.phone.as_deref(),
            taxation: &receipt.taxation,
            items: receipt.items.iter().map(ReceiptItemBody::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReceiptItemBody<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Price")]
    price: i64,
    #[serde(rename = "Quantity")]
    quantity: u32,
    #[serde(rename = "Amount")]
    amount: i64,
    #[serde(rename = "Tax")]
    tax: &'a str,
    #[serde(rename = "Ean13", skip_serializing_if = "Option::is_none")]
    ean13: Option<&'a str>,
}

impl<'a> From<&'a ReceiptItem> for ReceiptItemBody<'a> {
    fn from(item: &'a ReceiptItem) -> Self {
        Self {
            name: &item.name,
            price: item.price.minor(),
            quantity: item.quantity,
            amount: item.amount.minor(),
            tax: &item.tax,
            ean13: item.ean13.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GetStateRequest<'a> {
    #[serde(rename = "OrderId")]
    order_id: &'a str,
}

impl SignedRequest for GetStateRequest<'_> {
    fn token_fields(&self) -> TokenFields {
        TokenFields::new().with("OrderId", self.order_id)
    }
}

#[derive(Debug, Serialize)]
struct ConfirmRequest<'a> {
    #[serde(rename = "PaymentId")]
    payment_id: &'a str,
    #[serde(rename = "Amount")]
    amount: i64,
}

impl SignedRequest for ConfirmRequest<'_> {
    fn token_fields(&self) -> TokenFields {
        TokenFields::new()
            .with("PaymentId", self.payment_id)
            .with("Amount", self.amount)
    }
}

#[derive(Debug, Serialize)]
struct CancelRequest<'a> {
    #[serde(rename = "PaymentId")]
    payment_id: &'a str,
}

impl SignedRequest for CancelRequest<'_> {
    fn token_fields(&self) -> TokenFields {
        TokenFields::new().with("PaymentId", self.payment_id)
    }
}

// Common response envelope of every API method. `Success` is what marks a
// body as coming from the gateway rather than from a proxy in front of it.
#[derive(Debug, Deserialize)]
struct TBankResponse {
    #[serde(rename = "Success")]
    success: bool,
    #[serde(rename = "ErrorCode", default)]
    error_code: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "PaymentId", default, deserialize_with = "string_or_number")]
    payment_id: String,
    #[serde(rename = "Amount", default)]
    amount: Option<i64>,
    #[serde(rename = "PaymentURL", default)]
    payment_url: Option<String>,
    #[serde(rename = "Message", default)]
    message: Option<String>,
    #[serde(rename = "Details", default)]
    details: Option<String>,
}
