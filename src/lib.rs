//! T-Bank internet acquiring integration
//!
//! Creates payment sessions, tracks their status and processes the gateway's
//! webhook notifications.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod payments;

pub use error::{GatewayError, GatewayResult};
pub use payments::providers::{TBankClient, TBankConfig};
pub use payments::traits::PaymentGateway;
