//! Per-chunk multipart assembly: the shared row buffer and finalization.
//!
//! Converted rows from many worker threads funnel into one growable buffer
//! per chunk. The buffer's lock covers only CPU work (append, threshold
//! check, snapshot-and-clear, part-number allocation) so no appender ever
//! blocks on network I/O; the snapshot is uploaded after the lock is
//! released. Part numbers are allocated under the lock, which is what makes
//! part uploads strictly increasing within a chunk.

use crate::error::BulkResult;
use crate::io::traits::{CompletedPart, ObjectStore};
use crate::report::ReportData;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

struct BufferInner {
    buffer: String,
    next_part: u32,
}

/// Growable row buffer flushed to successive multipart parts once it crosses
/// a size threshold.
pub struct PartBuffer {
    inner: Mutex<BufferInner>,
    threshold: usize,
}

/// A snapshot taken off the buffer, to be uploaded as `part_number` outside
/// the buffer lock.
pub struct PendingPart {
    pub part_number: u32,
    pub data: String,
}

impl PartBuffer {
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            inner: Mutex::new(BufferInner {
                buffer: String::new(),
                next_part: 1,
            }),
            threshold,
        }
    }

    /// Append without a threshold check. Used to seed the header row.
    pub fn seed(&self, text: &str) {
        self.inner
            .lock()
            .expect("buffer mutex poisoned")
            .buffer
            .push_str(text);
    }

    /// Append text; if the buffer now exceeds the threshold, snapshot and
    /// clear it and allocate the next part number, all under the lock.
    /// The returned snapshot must be uploaded by the caller.
    pub fn append(&self, text: &str) -> Option<PendingPart> {
        let mut inner = self.inner.lock().expect("buffer mutex poisoned");
        inner.buffer.push_str(text);
        if inner.buffer.len() <= self.threshold {
            return None;
        }
        let data = std::mem::take(&mut inner.buffer);
        let part_number = inner.next_part;
        inner.next_part += 1;
        Some(PendingPart { part_number, data })
    }

    /// Drain whatever is left as one final part.
    pub fn take_remainder(&self) -> Option<PendingPart> {
        let mut inner = self.inner.lock().expect("buffer mutex poisoned");
        if inner.buffer.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut inner.buffer);
        let part_number = inner.next_part;
        inner.next_part += 1;
        Some(PendingPart { part_number, data })
    }
}

/// Mutable aggregation state owned by one chunk's lifetime.
pub struct ChunkUploadState {
    pub temp_key: String,
    pub temp_upload_id: String,
    pub final_key: String,
    pub final_upload_id: String,
    pub buffer: PartBuffer,
    parts: Mutex<Vec<CompletedPart>>,
    total_records: AtomicU64,
    report: Mutex<ReportData>,
}

impl ChunkUploadState {
    #[must_use]
    pub fn new(
        temp_key: String,
        temp_upload_id: String,
        final_key: String,
        final_upload_id: String,
        part_size_threshold: usize,
    ) -> Self {
        Self {
            temp_key,
            temp_upload_id,
            final_key,
            final_upload_id,
            buffer: PartBuffer::new(part_size_threshold),
            parts: Mutex::new(Vec::new()),
            total_records: AtomicU64::new(0),
            report: Mutex::new(ReportData::default()),
        }
    }

    pub fn add_records(&self, count: u64) {
        self.total_records.fetch_add(count, Ordering::Relaxed);
    }

    #[must_use]
    pub fn total_records(&self) -> u64 {
        self.total_records.load(Ordering::Relaxed)
    }

    pub fn update_report(&self, update: impl FnOnce(&mut ReportData)) {
        update(&mut self.report.lock().expect("report mutex poisoned"));
    }

    #[must_use]
    pub fn report_snapshot(&self) -> ReportData {
        *self.report.lock().expect("report mutex poisoned")
    }

    fn record_part(&self, part: CompletedPart) {
        self.parts.lock().expect("parts mutex poisoned").push(part);
    }

    /// Completed parts sorted ascending by part number, regardless of the
    /// order uploads finished in.
    #[must_use]
    pub fn sorted_parts(&self) -> Vec<CompletedPart> {
        let mut parts = self.parts.lock().expect("parts mutex poisoned").clone();
        parts.sort_by_key(|p| p.part_number);
        parts
    }

    /// Upload a pending snapshot as the next part of the chunk's temporary
    /// object and record its eTag.
    ///
    /// # Errors
    ///
    /// Returns `TransientIo` if the part upload fails.
    pub fn upload_pending(
        &self,
        store: &dyn ObjectStore,
        bucket: &str,
        pending: PendingPart,
    ) -> BulkResult<()> {
        let etag = store.upload_part(
            bucket,
            &self.temp_key,
            &self.temp_upload_id,
            pending.part_number,
            pending.data.as_bytes(),
        )?;
        self.record_part(CompletedPart {
            part_number: pending.part_number,
            etag,
        });
        Ok(())
    }
}

/// Finish a chunk: flush the buffer remainder, complete the temporary
/// multipart object, copy it as exactly one part (numbered by the chunk)
/// into the job's final object, and delete the temporary object. Returns the
/// eTag of the copied part.
///
/// # Errors
///
/// Returns `TransientIo` on any storage failure; the chunk is then aborted
/// without contributing to the final object.
pub fn finalize_chunk(
    store: &dyn ObjectStore,
    bucket: &str,
    state: &ChunkUploadState,
    chunk_number: u32,
) -> BulkResult<String> {
    if let Some(pending) = state.buffer.take_remainder() {
        state.upload_pending(store, bucket, pending)?;
    }
    let parts = state.sorted_parts();
    store.complete_multipart_upload(bucket, &state.temp_key, &state.temp_upload_id, &parts)?;
    let etag = store.upload_part_copy(
        bucket,
        &state.final_key,
        &state.final_upload_id,
        chunk_number,
        &state.temp_key,
    )?;
    store.delete_object(bucket, &state.temp_key)?;
    info!(chunk = chunk_number, parts = parts.len(), "chunk object finalized");
    Ok(etag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fake::FakeObjectStore;

    #[test]
    fn append_below_threshold_never_flushes() {
        let buffer = PartBuffer::new(64);
        assert!(buffer.append("small\n").is_none());
        assert!(buffer.append("still small\n").is_none());
    }

    #[test]
    fn crossing_threshold_flushes_exactly_once_and_resets() {
        let buffer = PartBuffer::new(10);
        let pending = buffer.append("0123456789AB\n").expect("should flush");
        assert_eq!(pending.part_number, 1);
        assert_eq!(pending.data, "0123456789AB\n");
        // Buffer was cleared by the snapshot.
        assert!(buffer.append("x\n").is_none());
        let tail = buffer.take_remainder().unwrap();
        assert_eq!(tail.part_number, 2);
        assert_eq!(tail.data, "x\n");
        assert!(buffer.take_remainder().is_none());
    }

    #[test]
    fn parts_sort_regardless_of_completion_order() {
        let state = ChunkUploadState::new(
            "t".into(), "u".into(), "f".into(), "fu".into(), 1024,
        );
        state.record_part(CompletedPart { part_number: 3, etag: "c".into() });
        state.record_part(CompletedPart { part_number: 1, etag: "a".into() });
        state.record_part(CompletedPart { part_number: 2, etag: "b".into() });
        let numbers: Vec<u32> = state.sorted_parts().iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn finalize_assembles_copies_and_deletes_temp() {
        let store = FakeObjectStore::new();
        let temp_upload = store.create_multipart_upload("b", "final.csvtemp2").unwrap();
        let final_upload = store.create_multipart_upload("b", "final.csv").unwrap();
        let state = ChunkUploadState::new(
            "final.csvtemp2".into(),
            temp_upload,
            "final.csv".into(),
            final_upload.clone(),
            1024,
        );
        state.buffer.seed("row1\nrow2\n");

        let etag = finalize_chunk(&store, "b", &state, 2).unwrap();
        // Temp object is gone, its content awaits completion of the final
        // upload as part 2.
        assert!(store.get_object("b", "final.csvtemp2").is_err());
        store
            .complete_multipart_upload(
                "b",
                "final.csv",
                &final_upload,
                &[CompletedPart { part_number: 2, etag }],
            )
            .unwrap();
        assert_eq!(store.get_object("b", "final.csv").unwrap(), b"row1\nrow2\n");
    }
}
