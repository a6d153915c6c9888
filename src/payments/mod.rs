//! Payment gateway integration module
//!
//! Request signing, the gateway client and the types shared with the HTTP layer.

pub mod providers;
pub mod signer;
pub mod traits;
pub mod types;
