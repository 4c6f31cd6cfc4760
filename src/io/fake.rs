//! Fake implementations for testing.
//!
//! In-memory stand-ins for object storage, the message bus, the status
//! store, and the engine liveness channel. They mirror the real services
//! closely enough to drive the full pipeline in unit and integration tests.

use crate::error::{BulkError, BulkResult, ErrorKind};
use crate::io::traits::{CompletedPart, EngineContext, MessageBus, ObjectStore, StatusStore};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Type aliases for complex nested types
type BucketStorage = Arc<Mutex<HashMap<String, HashMap<String, Vec<u8>>>>>;
type UploadStorage = Arc<Mutex<HashMap<String, MultipartSession>>>;
type HashStorage = Arc<Mutex<HashMap<String, HashMap<String, String>>>>;

// ============================================================================
// FakeObjectStore
// ============================================================================

#[derive(Debug, Default)]
struct MultipartSession {
    bucket: String,
    key: String,
    parts: HashMap<u32, (String, Vec<u8>)>,
}

#[derive(Clone, Default)]
pub struct FakeObjectStore {
    storage: BucketStorage,
    uploads: UploadStorage,
    upload_counter: Arc<Mutex<u64>>,
}

impl FakeObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without going through the trait.
    ///
    /// # Panics
    ///
    /// Panics if the storage mutex is poisoned.
    pub fn seed(&self, bucket: &str, key: &str, data: &[u8]) {
        self.storage
            .lock()
            .expect("storage mutex poisoned")
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
    }

    /// Whether any multipart session is still open.
    ///
    /// # Panics
    ///
    /// Panics if the uploads mutex is poisoned.
    #[must_use]
    pub fn has_open_uploads(&self) -> bool {
        !self.uploads.lock().expect("uploads mutex poisoned").is_empty()
    }

    fn next_upload_id(&self) -> String {
        let mut counter = self
            .upload_counter
            .lock()
            .expect("upload_counter mutex poisoned");
        *counter += 1;
        let id = *counter;
        drop(counter);
        format!("upload-{id}")
    }

    fn read_object(&self, bucket: &str, key: &str) -> BulkResult<Vec<u8>> {
        self.storage
            .lock()
            .expect("storage mutex poisoned")
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
            .ok_or_else(|| {
                BulkError::new(ErrorKind::NotFound, format!("object {bucket}/{key} not found"))
            })
    }
}

impl ObjectStore for FakeObjectStore {
    fn head_size(&self, bucket: &str, key: &str) -> BulkResult<u64> {
        self.read_object(bucket, key).map(|data| data.len() as u64)
    }

    fn get_object(&self, bucket: &str, key: &str) -> BulkResult<Vec<u8>> {
        self.read_object(bucket, key)
    }

    fn get_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> BulkResult<Box<dyn Read + Send>> {
        let data = self.read_object(bucket, key)?;
        let len = data.len() as u64;
        let start = start.min(len) as usize;
        // Inclusive range, clamped like a storage ranged GET.
        let end = end.saturating_add(1).min(len) as usize;
        Ok(Box::new(Cursor::new(data[start..end.max(start)].to_vec())))
    }

    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> BulkResult<()> {
        self.seed(bucket, key, data);
        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> BulkResult<()> {
        if let Some(bucket_map) = self
            .storage
            .lock()
            .expect("storage mutex poisoned")
            .get_mut(bucket)
        {
            bucket_map.remove(key);
        }
        Ok(())
    }

    fn create_multipart_upload(&self, bucket: &str, key: &str) -> BulkResult<String> {
        let upload_id = self.next_upload_id();
        self.uploads.lock().expect("uploads mutex poisoned").insert(
            upload_id.clone(),
            MultipartSession {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: HashMap::new(),
            },
        );
        Ok(upload_id)
    }

    fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> BulkResult<String> {
        let mut uploads = self.uploads.lock().expect("uploads mutex poisoned");
        let session = uploads.get_mut(upload_id).ok_or_else(|| {
            BulkError::new(ErrorKind::NotFound, format!("upload {upload_id} not found"))
        })?;
        let etag = format!("etag-{upload_id}-{part_number}");
        session.parts.insert(part_number, (etag.clone(), data.to_vec()));
        Ok(etag)
    }

    fn upload_part_copy(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        source_key: &str,
    ) -> BulkResult<String> {
        let data = self.read_object(bucket, source_key)?;
        self.upload_part(bucket, key, upload_id, part_number, &data)
    }

    fn complete_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BulkResult<()> {
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(BulkError::new(
                ErrorKind::InvalidInput,
                format!("parts for upload {upload_id} not strictly ascending"),
            ));
        }
        let mut uploads = self.uploads.lock().expect("uploads mutex poisoned");
        let session = uploads.remove(upload_id).ok_or_else(|| {
            BulkError::new(ErrorKind::NotFound, format!("upload {upload_id} not found"))
        })?;
        let mut assembled = Vec::new();
        for part in parts {
            let (etag, data) = session.parts.get(&part.part_number).ok_or_else(|| {
                BulkError::new(
                    ErrorKind::InvalidInput,
                    format!("upload {upload_id} has no part {}", part.part_number),
                )
            })?;
            if *etag != part.etag {
                return Err(BulkError::new(
                    ErrorKind::InvalidInput,
                    format!("etag mismatch on part {}", part.part_number),
                ));
            }
            assembled.extend_from_slice(data);
        }
        drop(uploads);
        self.seed(&session.bucket, &session.key, &assembled);
        Ok(())
    }

    fn abort_multipart_upload(&self, _bucket: &str, _key: &str, upload_id: &str) -> BulkResult<()> {
        self.uploads
            .lock()
            .expect("uploads mutex poisoned")
            .remove(upload_id);
        Ok(())
    }
}

// ============================================================================
// FakeMessageBus
// ============================================================================

/// One captured publish call.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct FakeMessageBus {
    messages: Arc<Mutex<Vec<PublishedMessage>>>,
    message_counter: Arc<Mutex<u64>>,
}

impl FakeMessageBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far.
    ///
    /// # Panics
    ///
    /// Panics if the messages mutex is poisoned.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.messages.lock().expect("messages mutex poisoned").clone()
    }
}

impl MessageBus for FakeMessageBus {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: HashMap<String, String>,
    ) -> BulkResult<String> {
        self.messages
            .lock()
            .expect("messages mutex poisoned")
            .push(PublishedMessage {
                topic: topic.to_string(),
                key: key.to_string(),
                payload: payload.to_vec(),
                headers,
            });
        let mut counter = self
            .message_counter
            .lock()
            .expect("message_counter mutex poisoned");
        *counter += 1;
        let id = *counter;
        drop(counter);
        Ok(format!("msg-{id}"))
    }
}

// ============================================================================
// FakeStatusStore
// ============================================================================

#[derive(Clone, Default)]
pub struct FakeStatusStore {
    hashes: HashStorage,
    ttls: Arc<Mutex<HashMap<String, Duration>>>,
}

impl FakeStatusStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last TTL applied to a key, if any.
    ///
    /// # Panics
    ///
    /// Panics if the ttls mutex is poisoned.
    #[must_use]
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.ttls.lock().expect("ttls mutex poisoned").get(key).copied()
    }
}

impl StatusStore for FakeStatusStore {
    fn hash_set(&self, key: &str, field: &str, value: &str, ttl: Duration) -> BulkResult<()> {
        self.hashes
            .lock()
            .expect("hashes mutex poisoned")
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        self.ttls
            .lock()
            .expect("ttls mutex poisoned")
            .insert(key.to_string(), ttl);
        Ok(())
    }

    fn hash_scan_all(&self, key: &str) -> BulkResult<Vec<(String, String)>> {
        let hashes = self.hashes.lock().expect("hashes mutex poisoned");
        let mut entries: Vec<(String, String)> = hashes
            .get(key)
            .map(|fields| fields.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default();
        drop(hashes);
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

// ============================================================================
// FakeEngineContext
// ============================================================================

#[derive(Clone, Default)]
pub struct FakeEngineContext {
    heartbeats: Arc<Mutex<Vec<String>>>,
}

impl FakeEngineContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of liveness signals received.
    ///
    /// # Panics
    ///
    /// Panics if the heartbeats mutex is poisoned.
    #[must_use]
    pub fn heartbeat_count(&self) -> usize {
        self.heartbeats.lock().expect("heartbeats mutex poisoned").len()
    }
}

impl EngineContext for FakeEngineContext {
    fn heartbeat(&self, detail: &str) {
        self.heartbeats
            .lock()
            .expect("heartbeats mutex poisoned")
            .push(detail.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_assembles_in_listed_order() {
        let store = FakeObjectStore::new();
        let upload_id = store.create_multipart_upload("b", "k").unwrap();
        let e1 = store.upload_part("b", "k", &upload_id, 1, b"aa").unwrap();
        let e2 = store.upload_part("b", "k", &upload_id, 2, b"bb").unwrap();
        store
            .complete_multipart_upload(
                "b",
                "k",
                &upload_id,
                &[
                    CompletedPart { part_number: 1, etag: e1 },
                    CompletedPart { part_number: 2, etag: e2 },
                ],
            )
            .unwrap();
        assert_eq!(store.get_object("b", "k").unwrap(), b"aabb");
        assert!(!store.has_open_uploads());
    }

    #[test]
    fn multipart_rejects_unsorted_parts() {
        let store = FakeObjectStore::new();
        let upload_id = store.create_multipart_upload("b", "k").unwrap();
        let e1 = store.upload_part("b", "k", &upload_id, 1, b"aa").unwrap();
        let e2 = store.upload_part("b", "k", &upload_id, 2, b"bb").unwrap();
        let result = store.complete_multipart_upload(
            "b",
            "k",
            &upload_id,
            &[
                CompletedPart { part_number: 2, etag: e2 },
                CompletedPart { part_number: 1, etag: e1 },
            ],
        );
        assert_eq!(result.unwrap_err().kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn ranged_get_is_inclusive_and_clamped() {
        let store = FakeObjectStore::new();
        store.seed("b", "k", b"0123456789");
        let mut out = Vec::new();
        store.get_range("b", "k", 2, 5).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"2345");
        out.clear();
        store.get_range("b", "k", 8, 100).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"89");
    }

    #[test]
    fn status_store_scan_is_sorted() {
        let store = FakeStatusStore::new();
        store.hash_set("q", "2_1", "COMPLETED", Duration::from_secs(60)).unwrap();
        store.hash_set("q", "1_1", "SUBMITTED", Duration::from_secs(60)).unwrap();
        let entries = store.hash_scan_all("q").unwrap();
        assert_eq!(entries[0].0, "1_1");
        assert_eq!(store.ttl_of("q"), Some(Duration::from_secs(60)));
        assert!(store.hash_scan_all("missing").unwrap().is_empty());
    }
}
