use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Timeout error: gateway did not answer within {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Gateway returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Gateway rejected request: code={error_code}; message={message}; details={details}")]
    Rejected {
        error_code: String,
        message: String,
        details: String,
    },

    #[error("Notification rejected: {message}")]
    Authenticity { message: String },

    #[error("Unsupported value for signed field '{field}': {kind}")]
    UnsupportedField { field: String, kind: &'static str },
}

/// Coarse classification used by the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Transport,
    Rejected,
    Authenticity,
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn rejected(
        error_code: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::Rejected {
            error_code: error_code.into(),
            message: message.into(),
            details: details.into(),
        }
    }

    pub fn authenticity(message: impl Into<String>) -> Self {
        Self::Authenticity {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::UnsupportedField { .. } => ErrorKind::Validation,
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::HttpStatus { .. }
            | Self::Serialization { .. } => ErrorKind::Transport,
            Self::Rejected { .. } => ErrorKind::Rejected,
            Self::Authenticity { .. } => ErrorKind::Authenticity,
        }
    }

    /// Gateway error code, when the gateway supplied one.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Rejected { error_code, .. } => Some(error_code.as_str()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::serialization(format!("Response body error: {}", err))
        } else {
            GatewayError::network(format!("Request error: {}", err))
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::serialization(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(GatewayError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(GatewayError::timeout(30).kind(), ErrorKind::Transport);
        assert_eq!(
            GatewayError::HttpStatus {
                status: 500,
                body: String::new()
            }
            .kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            GatewayError::rejected("9", "m", "d").kind(),
            ErrorKind::Rejected
        );
        assert_eq!(
            GatewayError::authenticity("bad terminal").kind(),
            ErrorKind::Authenticity
        );
    }

    #[test]
    fn test_rejected_keeps_gateway_fields_verbatim() {
        let err = GatewayError::rejected("204", "Неверный токен", "Проверьте пароль");
        assert_eq!(err.error_code(), Some("204"));
        let text = err.to_string();
        assert!(text.contains("Неверный токен"));
        assert!(text.contains("Проверьте пароль"));
    }

    #[test]
    fn test_serde_error_maps_to_serialization() {
        let err: GatewayError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, GatewayError::Serialization { .. }));
    }
}
