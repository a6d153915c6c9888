//! Payment types and data structures
//!
//! Domain-level requests, results and records exchanged between the HTTP layer,
//! the gateway client and the status cache.

use crate::error::{GatewayError, GatewayResult};
use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Amount in minor currency units (kopecks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Converts a major-unit value (rubles) to kopecks, rounding half away from zero.
    pub fn from_major(major: &BigDecimal) -> GatewayResult<Self> {
        let minor = (major.with_scale_round(2, RoundingMode::HalfUp) * BigDecimal::from(100))
            .to_i64()
            .ok_or_else(|| GatewayError::validation(format!("amount {} is out of range", major)))?;
        Ok(Self(minor))
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fiscal receipt attached to an Init request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Tax regime, e.g. `osn`, `usn_income`
    pub taxation: String,
    #[serde(default)]
    pub items: Vec<ReceiptItem>,
}

impl Receipt {
    /// The gateway only accepts a receipt that names a buyer contact.
    pub fn has_contact(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.email) || present(&self.phone)
    }

    pub fn items_total(&self) -> i64 {
        self.items.iter().map(|item| item.amount.minor()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptItem {
    pub name: String,
    /// Unit price
    pub price: Amount,
    pub quantity: u32,
    /// Line total
    pub amount: Amount,
    /// VAT rate, e.g. `none`, `vat20`
    pub tax: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ean13: Option<String>,
}

/// Optional buyer metadata forwarded with Init
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub customer_key: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub ip: Option<String>,
    /// Widget payment method, e.g. `sbp`, `tpay`
    pub payment_type: Option<String>,
}

/// Payment initiation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Merchant order id, unique per terminal
    pub order_id: String,
    pub amount: Amount,
    pub description: String,
    pub receipt: Option<Receipt>,
    #[serde(default)]
    pub customer: CustomerInfo,
}

impl PaymentRequest {
    pub fn new(order_id: impl Into<String>, amount: Amount, description: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            amount,
            description: description.into(),
            receipt: None,
            customer: CustomerInfo::default(),
        }
    }

    pub fn with_receipt(mut self, receipt: Receipt) -> Self {
        self.receipt = Some(receipt);
        self
    }

    pub fn with_customer(mut self, customer: CustomerInfo) -> Self {
        self.customer = customer;
        self
    }
}

/// Minimal form submitted by the payment page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentForm {
    pub order_id: Option<String>,
    pub amount: Amount,
    pub description: Option<String>,
    pub payment_type: Option<String>,
    pub customer_key: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub receipt: Option<Receipt>,
}

/// Outcome of a successful Init call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub success: bool,
    pub order_id: String,
    pub payment_id: String,
    /// Gateway status, e.g. `NEW`
    pub status: String,
    pub payment_url: Option<String>,
    pub amount: Amount,
    pub error_code: String,
    pub message: Option<String>,
    pub details: Option<String>,
}

/// Last known state of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusRecord {
    pub order_id: String,
    pub payment_id: String,
    pub status: String,
    pub amount: Option<Amount>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Webhook payload sent by the gateway on every status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "TerminalKey")]
    pub terminal_key: String,
    #[serde(rename = "OrderId")]
    pub order_id: String,
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "PaymentId", deserialize_with = "string_or_number")]
    pub payment_id: String,
    #[serde(rename = "ErrorCode", default)]
    pub error_code: String,
    #[serde(rename = "Amount", default)]
    pub amount: i64,
    #[serde(rename = "CardId", default)]
    pub card_id: Option<i64>,
    #[serde(rename = "Pan", default)]
    pub pan: Option<String>,
    #[serde(rename = "ExpDate", default)]
    pub exp_date: Option<String>,
    #[serde(rename = "RebillId", default, deserialize_with = "opt_string_or_number")]
    pub rebill_id: Option<String>,
    #[serde(rename = "Token", default)]
    pub token: String,
}

/// Non-secret view of the terminal configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfig {
    pub terminal_key: String,
    #[serde(rename = "baseURL")]
    pub base_url: String,
    #[serde(rename = "callbackURL")]
    pub callback_url: Option<String>,
    #[serde(rename = "successURL")]
    pub success_url: Option<String>,
    #[serde(rename = "failURL")]
    pub fail_url: Option<String>,
}

/// The gateway sends identifiers as strings in responses and as numbers in notifications.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_string_or_number(deserializer)?.unwrap_or_default())
}

pub(crate) fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        serde_json::Value::Null => Ok(None),
        other => Err(D::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}
