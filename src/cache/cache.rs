//! Payment status store trait and in-process implementation
//!
//! Every read-modify-write happens under one write guard, so a notification
//! and a concurrent Init for the same order serialize instead of interleaving.

use crate::payments::types::PaymentStatusRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Result of merging a status into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Status changed and the updated timestamp moved forward
    Applied,
    /// Record already had this status; nothing was touched
    Unchanged,
    /// No record for the order
    Missing,
}

/// Store for the last known status of each order
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Get a record by order id
    async fn get(&self, order_id: &str) -> Option<PaymentStatusRecord>;

    /// Insert or overwrite the record for its order id
    async fn set(&self, record: PaymentStatusRecord);

    /// Change the status of an existing record in place
    async fn update_status(&self, order_id: &str, status: &str, at: DateTime<Utc>)
        -> StatusUpdate;

    /// Drop every record, returning how many were removed
    async fn clear(&self) -> usize;

    async fn len(&self) -> usize;
}

/// In-memory store scoped to one gateway client
#[derive(Debug, Default)]
pub struct InMemoryStatusCache {
    entries: RwLock<HashMap<String, PaymentStatusRecord>>,
}

impl InMemoryStatusCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusCache {
    async fn get(&self, order_id: &str) -> Option<PaymentStatusRecord> {
        let entries = self.entries.read().await;
        match entries.get(order_id) {
            Some(record) => {
                debug!("Status cache hit for order: {}", order_id);
                Some(record.clone())
            }
            None => {
                debug!("Status cache miss for order: {}", order_id);
                None
            }
        }
    }

    async fn set(&self, record: PaymentStatusRecord) {
        let mut entries = self.entries.write().await;
        debug!(
            "Status cache set for order: {} (status: {})",
            record.order_id, record.status
        );
        entries.insert(record.order_id.clone(), record);
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: &str,
        at: DateTime<Utc>,
    ) -> StatusUpdate {
        let mut entries = self.entries.write().await;
        let Some(record) = entries.get_mut(order_id) else {
            return StatusUpdate::Missing;
        };

        if record.status == status {
            return StatusUpdate::Unchanged;
        }

        record.status = status.to_string();
        record.updated_at = record.updated_at.max(at);
        debug!("Status cache update for order: {} -> {}", order_id, status);
        StatusUpdate::Applied
    }

    async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        debug!("Status cache cleared ({} records)", removed);
        removed
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
