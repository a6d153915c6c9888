//! Payment gateway implementations
//!
//! Concrete implementations of the PaymentGateway trait.

pub mod tbank;

pub use tbank::{TBankClient, TBankConfig};
