//! Batch dispatch: publish to the message bus, mark SUBMITTED.
//!
//! Dispatch is at-least-once; the status store's batch-id field is the dedup
//! point for everything downstream.

use crate::error::BulkResult;
use crate::io::traits::{MessageBus, StatusStore};
use crate::model::{BatchEvent, BatchId, InputRecord};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Topic the enrichment process consumes batch events from.
pub const BATCH_TOPIC: &str = "bulk-enrich-requests";

pub const STATUS_SUBMITTED: &str = "SUBMITTED";
pub const STATUS_COMPLETED: &str = "COMPLETED";

/// Publishes batches and records their submission state.
#[derive(Clone)]
pub struct EventDispatcher {
    bus: Arc<dyn MessageBus>,
    status: Arc<dyn StatusStore>,
    status_ttl: Duration,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>, status: Arc<dyn StatusStore>, status_ttl: Duration) -> Self {
        Self { bus, status, status_ttl }
    }

    /// Publish one batch and mark it SUBMITTED under its query id.
    ///
    /// # Errors
    ///
    /// Returns `Processing` if the event cannot be encoded, `TransientIo` if
    /// the publish or status write fails.
    pub fn dispatch(
        &self,
        query_id: &str,
        batch_id: BatchId,
        records: Vec<InputRecord>,
    ) -> BulkResult<()> {
        let event = BatchEvent {
            query_id: query_id.to_string(),
            batch_id,
            payload_length: records.len(),
            records,
        };
        let payload = serde_json::to_vec(&event)?;
        let message_id = Uuid::new_v4().to_string();
        let headers = HashMap::from([
            ("type".to_string(), "batchEvent".to_string()),
            ("schemaVersion".to_string(), "1".to_string()),
            ("messageId".to_string(), message_id.clone()),
        ]);
        self.bus.publish(BATCH_TOPIC, &message_id, &payload, headers)?;
        self.status.hash_set(
            query_id,
            &batch_id.to_string(),
            STATUS_SUBMITTED,
            self.status_ttl,
        )
    }
}
