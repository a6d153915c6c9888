//! Request token computation for the T-Bank acquiring API
//!
//! Every request carries a `Token`: the SHA-256 of the concatenated values of
//! the root-level fields plus the terminal password, ordered by field name.
//! Nested blocks (`Receipt`, `DATA`) never take part in the token.

use crate::error::{GatewayError, GatewayResult};
use bigdecimal::{BigDecimal, RoundingMode};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::str::FromStr;
use subtle::ConstantTimeEq;

/// Reserved key under which the terminal password joins the field-set.
pub const PASSWORD_KEY: &str = "Password";

/// Field holding the digest in requests and notifications.
pub const TOKEN_KEY: &str = "Token";

/// A value that may take part in a token.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Decimal(BigDecimal),
    Bool(bool),
}

impl FieldValue {
    /// Canonical text form used in the signed buffer.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Str(s) => s.clone(),
            FieldValue::Int(i) => i.to_string(),
            // Amounts are whole minor units; drop any fractional digits.
            FieldValue::Decimal(d) => d.with_scale_round(0, RoundingMode::HalfEven).to_string(),
            FieldValue::Bool(b) => b.to_string(),
        }
    }

    /// Converts a JSON scalar. Objects, arrays and nulls have no canonical form.
    pub fn from_json(field: &str, value: &Value) -> GatewayResult<Self> {
        match value {
            Value::String(s) => Ok(FieldValue::Str(s.clone())),
            Value::Bool(b) => Ok(FieldValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(FieldValue::Int(i)),
                None => BigDecimal::from_str(&n.to_string())
                    .map(FieldValue::Decimal)
                    .map_err(|_| GatewayError::UnsupportedField {
                        field: field.to_string(),
                        kind: "number",
                    }),
            },
            Value::Null => Err(GatewayError::UnsupportedField {
                field: field.to_string(),
                kind: "null",
            }),
            Value::Array(_) => Err(GatewayError::UnsupportedField {
                field: field.to_string(),
                kind: "array",
            }),
            Value::Object(_) => Err(GatewayError::UnsupportedField {
                field: field.to_string(),
                kind: "object",
            }),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        FieldValue::Str(value.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Computes the token for `fields` with `password`.
///
/// The caller's map is never modified: the password is added to a private copy,
/// replacing any `Password` entry the caller may have supplied.
pub fn sign(fields: &BTreeMap<String, FieldValue>, password: &str) -> String {
    let mut canonical = fields.clone();
    canonical.insert(
        PASSWORD_KEY.to_string(),
        FieldValue::Str(password.to_string()),
    );

    // BTreeMap<String, _> iterates in byte-wise key order.
    let buffer: String = canonical.values().map(FieldValue::render).collect();

    hex::encode(Sha256::digest(buffer.as_bytes()))
}

/// Constant-time comparison of a received token with the expected one.
pub fn verify(fields: &BTreeMap<String, FieldValue>, password: &str, token: &str) -> bool {
    let expected = sign(fields, password);
    let provided = token.trim().to_ascii_lowercase();
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Ordered builder for the fields of one signed request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenFields {
    fields: BTreeMap<String, FieldValue>,
}

impl TokenFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Adds the field only when a value is present.
    pub fn with_opt<V: Into<FieldValue>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    /// Collects the root-level scalar fields of an inbound JSON object.
    ///
    /// `Token` itself is excluded, as are nested objects and arrays, which the
    /// gateway never signs. Nulls are skipped the same way.
    pub fn from_json_object(object: &serde_json::Map<String, Value>) -> GatewayResult<Self> {
        let mut fields = BTreeMap::new();
        for (key, value) in object {
            if key == TOKEN_KEY {
                continue;
            }
            if matches!(value, Value::Object(_) | Value::Array(_) | Value::Null) {
                continue;
            }
            fields.insert(key.clone(), FieldValue::from_json(key, value)?);
        }
        Ok(Self { fields })
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn sign(&self, password: &str) -> String {
        sign(&self.fields, password)
    }

    pub fn verify(&self, password: &str, token: &str) -> bool {
        verify(&self.fields, password, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, FieldValue)]) -> BTreeMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_sign_known_vector() {
        let token = TokenFields::new()
            .with("TerminalKey", "TinkoffBankTest")
            .with("Amount", 19200i64)
            .with("OrderId", "21090")
            .with("Description", "Подарочная карта на 1000 рублей")
            .sign("usaf8fw8fsw21g");
        assert_eq!(
            token,
            "44a2c8230d1154e7e67c36eceb381690a6c5ee4e969353d79e319fceca64285f"
        );
    }

    #[test]
    fn test_sign_is_independent_of_insertion_order() {
        let a = TokenFields::new()
            .with("OrderId", "A1")
            .with("Amount", 100i64)
            .sign("pw");
        let b = TokenFields::new()
            .with("Amount", 100i64)
            .with("OrderId", "A1")
            .sign("pw");
        assert_eq!(a, b);
        assert_eq!(
            a,
            "52f772bb2359a8551c12e1efdf66dcebc30277e0366f098dadcec991ec399e82"
        );
    }

    #[test]
    fn test_changed_amount_changes_digest() {
        let a = TokenFields::new()
            .with("OrderId", "A1")
            .with("Amount", 100i64)
            .sign("pw");
        let b = TokenFields::new()
            .with("OrderId", "A1")
            .with("Amount", 101i64)
            .sign("pw");
        assert_ne!(a, b);
    }

    #[test]
    fn test_changed_secret_changes_digest() {
        let fields = TokenFields::new().with("OrderId", "A1").with("Amount", 100i64);
        assert_ne!(fields.sign("pw"), fields.sign("pw2"));
    }

    #[test]
    fn test_string_int_and_decimal_render_identically() {
        let as_str = sign(&fields(&[("Amount", FieldValue::from("100"))]), "pw");
        let as_int = sign(&fields(&[("Amount", FieldValue::Int(100))]), "pw");
        let as_dec = sign(
            &fields(&[(
                "Amount",
                FieldValue::Decimal(BigDecimal::from_str("100.0").unwrap()),
            )]),
            "pw",
        );
        assert_eq!(as_str, as_int);
        assert_eq!(as_int, as_dec);
    }

    #[test]
    fn test_sign_does_not_mutate_caller_fields() {
        let original = fields(&[("OrderId", FieldValue::from("A1"))]);
        let before = original.clone();
        let _ = sign(&original, "pw");
        assert_eq!(original, before);
        assert!(!original.contains_key(PASSWORD_KEY));
    }

    #[test]
    fn test_caller_password_entry_is_replaced_by_secret() {
        let with_fake = fields(&[
            ("OrderId", FieldValue::from("A1")),
            (PASSWORD_KEY, FieldValue::from("forged")),
        ]);
        let clean = fields(&[("OrderId", FieldValue::from("A1"))]);
        assert_eq!(sign(&with_fake, "pw"), sign(&clean, "pw"));
    }

    #[test]
    fn test_keys_sort_bytewise() {
        // Uppercase sorts before lowercase byte-wise: "Zeta" < "alpha".
        let token = sign(
            &fields(&[("alpha", FieldValue::from("1")), ("Zeta", FieldValue::from("2"))]),
            "P",
        );
        // Sorted: Password("P"), Zeta("2"), alpha("1") -> "P21"
        assert_eq!(token, hex::encode(Sha256::digest(b"P21")));
    }

    #[test]
    fn test_verify_accepts_uppercase_and_rejects_wrong_token() {
        let fields = TokenFields::new().with("OrderId", "A1").with("Amount", 100i64);
        let token = fields.sign("pw");
        assert!(fields.verify("pw", &token));
        assert!(fields.verify("pw", &token.to_uppercase()));
        assert!(!fields.verify("pw", "deadbeef"));
        assert!(!fields.verify("other", &token));
    }

    #[test]
    fn test_from_json_object_skips_token_and_nested_blocks() {
        let value = serde_json::json!({
            "TerminalKey": "T",
            "Success": true,
            "Amount": 1000,
            "Token": "abc",
            "Data": {"x": 1},
            "Items": [1, 2],
            "RebillId": null
        });
        let fields = TokenFields::from_json_object(value.as_object().unwrap()).unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields.get("Success"), Some(&FieldValue::Bool(true)));
        assert_eq!(fields.get("Amount"), Some(&FieldValue::Int(1000)));
        assert!(fields.get(TOKEN_KEY).is_none());
    }

    #[test]
    fn test_from_json_rejects_nested_values() {
        let err = FieldValue::from_json("Receipt", &serde_json::json!({"Email": "a"})).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::UnsupportedField { kind: "object", .. }
        ));
        assert!(FieldValue::from_json("X", &Value::Null).is_err());
    }

    #[test]
    fn test_bool_renders_lowercase() {
        assert_eq!(FieldValue::Bool(true).render(), "true");
        assert_eq!(FieldValue::Bool(false).render(), "false");
    }
}
