//! Core traits for the external collaborators.
//!
//! These are synchronous interfaces; adapters over async SDKs are expected to
//! block internally. Every method returns [`BulkResult`] so the retry layer
//! can classify failures by [`ErrorKind`](crate::error::ErrorKind).

use crate::error::BulkResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::time::Duration;

// ============================================================================
// Object Storage
// ============================================================================

/// One completed part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Object storage operations used by the pipeline.
///
/// Byte ranges follow the storage convention: `start` and `end` are both
/// inclusive offsets.
pub trait ObjectStore: Send + Sync {
    /// Size of an object in bytes without fetching its content.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the object doesn't exist, `TransientIo` on any
    /// other failure.
    fn head_size(&self, bucket: &str, key: &str) -> BulkResult<u64>;

    /// Download a whole object.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the object doesn't exist, `TransientIo` on any
    /// other failure.
    fn get_object(&self, bucket: &str, key: &str) -> BulkResult<Vec<u8>>;

    /// Stream an inclusive byte range of an object.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the object doesn't exist, `TransientIo` on any
    /// other failure.
    fn get_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> BulkResult<Box<dyn Read + Send>>;

    /// Upload a whole object.
    ///
    /// # Errors
    ///
    /// Returns `TransientIo` if the upload fails.
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> BulkResult<()>;

    /// Delete an object. Deleting a missing object is not an error.
    ///
    /// # Errors
    ///
    /// Returns `TransientIo` if the deletion fails.
    fn delete_object(&self, bucket: &str, key: &str) -> BulkResult<()>;

    /// Start a multipart upload and return its upload id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the bucket doesn't exist, `TransientIo` on any
    /// other failure.
    fn create_multipart_upload(&self, bucket: &str, key: &str) -> BulkResult<String>;

    /// Upload one part, returning its eTag.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the upload id is unknown, `TransientIo` on any
    /// other failure.
    fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> BulkResult<String>;

    /// Copy an existing object in as one part of a multipart upload,
    /// returning the part's eTag.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the source object or upload id is unknown,
    /// `TransientIo` on any other failure.
    fn upload_part_copy(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        source_key: &str,
    ) -> BulkResult<String>;

    /// Complete a multipart upload. `parts` must be sorted ascending by part
    /// number.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the part list violates the ordering
    /// contract, `NotFound` if the upload id is unknown, `TransientIo` on
    /// any other failure.
    fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BulkResult<()>;

    /// Abort a multipart upload, discarding its parts.
    ///
    /// # Errors
    ///
    /// Returns `TransientIo` if the abort fails.
    fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> BulkResult<()>;
}

// ============================================================================
// Message Bus
// ============================================================================

/// Publish transport handing batches to the external enrichment process.
pub trait MessageBus: Send + Sync {
    /// Publish one message, returning the broker-assigned message id.
    ///
    /// # Errors
    ///
    /// Returns `TransientIo` if publishing fails.
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: HashMap<String, String>,
    ) -> BulkResult<String>;
}

// ============================================================================
// Status Store
// ============================================================================

/// Key-value store recording per-batch submission/completion state.
pub trait StatusStore: Send + Sync {
    /// Set one field of a hash and (re)apply the expiry to the whole key.
    ///
    /// # Errors
    ///
    /// Returns `TransientIo` if the write fails.
    fn hash_set(&self, key: &str, field: &str, value: &str, ttl: Duration) -> BulkResult<()>;

    /// All `(field, value)` entries under a key. Missing keys scan empty.
    ///
    /// # Errors
    ///
    /// Returns `TransientIo` if the scan fails.
    fn hash_scan_all(&self, key: &str) -> BulkResult<Vec<(String, String)>>;
}

// ============================================================================
// Durable Engine
// ============================================================================

/// Liveness channel back to the durable execution engine supervising a
/// long-running activity.
pub trait EngineContext: Send + Sync {
    /// Signal that the activity is still making progress.
    fn heartbeat(&self, detail: &str);
}
