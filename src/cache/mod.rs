//! In-process payment status cache

pub mod cache;

// Re-export commonly used items
pub use cache::{InMemoryStatusCache, StatusStore, StatusUpdate};
