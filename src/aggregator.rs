//! Chunk aggregation: poll for completed batches, convert results, build the
//! chunk's multipart object.
//!
//! Per chunk the state machine is DISCOVER → CONVERT → DRAIN → FINALIZE.
//! Discovery is a blocking poll over the status store — the store offers no
//! push notification, so latency is traded for simplicity. Conversions run
//! on a worker pool shared across all concurrently aggregating chunks, while
//! the row buffer and part counter belong to exactly one chunk's lifetime.
//! Any long wait re-emits a liveness signal so the supervising engine never
//! mistakes a slow enrichment round-trip for a stalled activity.

use crate::config::ProcessorConfig;
use crate::dispatch::STATUS_COMPLETED;
use crate::error::{BulkError, BulkResult, ErrorKind};
use crate::io::traits::{EngineContext, ObjectStore, StatusStore};
use crate::keys;
use crate::model::{BatchId, BatchResult, ChunkProcessingResult, JobRequest};
use crate::multipart::{ChunkUploadState, finalize_chunk};
use crate::record::{output_csv_header, render_output_row};
use crate::report::ReportData;
use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Rate-limits liveness signals to the engine.
pub struct Heartbeater {
    engine: Arc<dyn EngineContext>,
    interval: Duration,
    last: Option<Instant>,
}

impl Heartbeater {
    #[must_use]
    pub fn new(engine: Arc<dyn EngineContext>, interval: Duration) -> Self {
        Self { engine, interval, last: None }
    }

    /// Emit a heartbeat if none has been sent within the interval. The first
    /// call always emits.
    pub fn maybe_beat(&mut self, detail: &str) {
        if self.last.is_none_or(|at| at.elapsed() >= self.interval) {
            self.engine.heartbeat(detail);
            self.last = Some(Instant::now());
        }
    }
}

struct GroupState {
    in_flight: usize,
    error: Option<BulkError>,
}

/// Tracks a set of spawned conversion tasks: how many are still running and
/// the first error any of them hit.
#[derive(Clone)]
pub struct TaskGroup {
    inner: Arc<(Mutex<GroupState>, Condvar)>,
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGroup {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new((
                Mutex::new(GroupState { in_flight: 0, error: None }),
                Condvar::new(),
            )),
        }
    }

    /// Run a task on the pool, counting it until it completes.
    pub fn spawn<F>(&self, pool: &rayon::ThreadPool, task: F)
    where
        F: FnOnce() -> BulkResult<()> + Send + 'static,
    {
        let (lock, _) = &*self.inner;
        lock.lock().expect("task group mutex poisoned").in_flight += 1;
        let inner = Arc::clone(&self.inner);
        pool.spawn(move || {
            let result = task();
            let (lock, cvar) = &*inner;
            let mut state = lock.lock().expect("task group mutex poisoned");
            state.in_flight -= 1;
            if let Err(err) = result
                && state.error.is_none()
            {
                state.error = Some(err);
            }
            drop(state);
            cvar.notify_all();
        });
    }

    /// Wait for every spawned task to complete, up to `timeout`. Returns
    /// whether the group is drained.
    #[must_use]
    pub fn wait_all(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut state = lock.lock().expect("task group mutex poisoned");
        while state.in_flight > 0 {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (next, timed_out) = cvar
                .wait_timeout(state, remaining)
                .expect("task group mutex poisoned");
            state = next;
            if timed_out.timed_out() && state.in_flight > 0 {
                return false;
            }
        }
        true
    }

    /// First error any task reported, if any.
    #[must_use]
    pub fn take_error(&self) -> Option<BulkError> {
        let (lock, _) = &*self.inner;
        lock.lock().expect("task group mutex poisoned").error.take()
    }
}

/// Aggregates completed batches into per-chunk output objects.
pub struct ChunkAggregator {
    store: Arc<dyn ObjectStore>,
    status: Arc<dyn StatusStore>,
    engine: Arc<dyn EngineContext>,
    pool: rayon::ThreadPool,
    config: ProcessorConfig,
}

impl ChunkAggregator {
    /// Build an aggregator with its own converter pool.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the worker pool cannot be constructed.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        status: Arc<dyn StatusStore>,
        engine: Arc<dyn EngineContext>,
        config: ProcessorConfig,
    ) -> BulkResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.converter_pool_size)
            .build()
            .map_err(|e| BulkError::new(ErrorKind::InvalidInput, e.to_string()))?;
        Ok(Self { store, status, engine, pool, config })
    }

    /// Aggregate one chunk: discover its completed batches, convert each
    /// result object into output rows, and assemble the chunk's object.
    ///
    /// # Errors
    ///
    /// Returns `Processing` (non-retryable) if any conversion fails, or the
    /// underlying storage error from finalization.
    pub fn aggregate(
        &self,
        chunk_number: u32,
        query_id: &str,
        total_batches: u32,
        job: &JobRequest,
        final_upload_id: &str,
    ) -> BulkResult<ChunkProcessingResult> {
        info!(chunk = chunk_number, total_batches, "start aggregating chunk");
        let dest_bucket =
            keys::bucket_name(&self.config.env, &self.config.region, keys::BULK_API_BUCKET);
        let source_bucket =
            keys::bucket_name(&self.config.env, &self.config.region, keys::BULK_RESULT_BUCKET);
        let final_key = keys::output_object_key(
            &keys::file_name_with_id(&job.file_name, &job.file_id),
            &job.output_file_id,
            &job.workspace_id,
            &job.user_id,
        );
        let result_folder = keys::result_folder(&job.workspace_id, &job.api_type, query_id);

        let temp_key = keys::temp_chunk_key(&final_key, chunk_number);
        let temp_upload_id = self.store.create_multipart_upload(&dest_bucket, &temp_key)?;
        let state = Arc::new(ChunkUploadState::new(
            temp_key,
            temp_upload_id,
            final_key,
            final_upload_id.to_string(),
            self.config.part_size_threshold,
        ));
        if chunk_number == 1 {
            state.buffer.seed(&format!("{}\n", output_csv_header(&job.delimiter)));
        }

        let mut heartbeater =
            Heartbeater::new(Arc::clone(&self.engine), self.config.heartbeat_interval);
        let tasks = TaskGroup::new();
        let mut seen: HashSet<BatchId> = HashSet::new();

        // DISCOVER: scan until every batch of this chunk has been picked up.
        while (seen.len() as u32) < total_batches {
            let fresh = self.scan_completed(query_id, chunk_number, &seen)?;
            heartbeater.maybe_beat("uploading");
            if fresh.is_empty() {
                std::thread::sleep(self.config.poll_interval);
                continue;
            }
            for batch_id in fresh {
                seen.insert(batch_id);
                self.spawn_convert(&tasks, batch_id, &state, &source_bucket, &dest_bucket,
                    &result_folder, &job.delimiter);
            }
        }

        // DRAIN: bounded waits, re-signaling liveness on each expiry.
        while !tasks.wait_all(self.config.drain_wait) {
            heartbeater.maybe_beat("uploading");
        }
        if let Some(err) = tasks.take_error() {
            return Err(BulkError::new(
                ErrorKind::Processing,
                format!("error aggregating output rows for chunk {chunk_number}: {err}"),
            ));
        }

        let upload_tag_id = finalize_chunk(&*self.store, &dest_bucket, &state, chunk_number)?;
        info!(
            chunk = chunk_number,
            records = state.total_records(),
            batches = seen.len(),
            "chunk aggregation complete"
        );
        Ok(ChunkProcessingResult {
            chunk_number,
            total_record_count: state.total_records(),
            total_batch_count: seen.len() as u32,
            report_data: state.report_snapshot(),
            upload_tag_id,
        })
    }

    /// Completed batch ids belonging to this chunk that have not been seen
    /// yet. Fields that don't parse as batch ids are skipped.
    fn scan_completed(
        &self,
        query_id: &str,
        chunk_number: u32,
        seen: &HashSet<BatchId>,
    ) -> BulkResult<Vec<BatchId>> {
        let entries = self.status.hash_scan_all(query_id)?;
        Ok(entries
            .into_iter()
            .filter(|(_, value)| value == STATUS_COMPLETED)
            .filter_map(|(field, _)| match field.parse::<BatchId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(%query_id, %field, "ignoring unparseable status field");
                    None
                }
            })
            .filter(|id| id.chunk == chunk_number && !seen.contains(id))
            .collect())
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_convert(
        &self,
        tasks: &TaskGroup,
        batch_id: BatchId,
        state: &Arc<ChunkUploadState>,
        source_bucket: &str,
        dest_bucket: &str,
        result_folder: &str,
        delimiter: &str,
    ) {
        let store = Arc::clone(&self.store);
        let state = Arc::clone(state);
        let source_bucket = source_bucket.to_string();
        let dest_bucket = dest_bucket.to_string();
        let result_folder = result_folder.to_string();
        let delimiter = delimiter.to_string();
        tasks.spawn(&self.pool, move || {
            convert_batch(
                &*store, &source_bucket, &dest_bucket, &result_folder, batch_id, &state,
                &delimiter,
            )
        });
    }
}

/// Fetch one batch's result object, render its records as output rows, and
/// append them to the chunk's shared buffer; upload a part if the append
/// crossed the size threshold.
fn convert_batch(
    store: &dyn ObjectStore,
    source_bucket: &str,
    dest_bucket: &str,
    result_folder: &str,
    batch_id: BatchId,
    state: &ChunkUploadState,
    delimiter: &str,
) -> BulkResult<()> {
    let key = keys::result_object_key(result_folder, &batch_id.to_string());
    let bytes = store.get_object(source_bucket, &key)?;
    if bytes.is_empty() {
        warn!(%batch_id, "empty result object, skipping batch");
        return Ok(());
    }
    let result: BatchResult = serde_json::from_slice(&bytes)?;
    if result.responses.is_empty() {
        warn!(%batch_id, "result object has no responses, skipping batch");
        return Ok(());
    }

    state.add_records(result.responses.len() as u64);
    let mut report = ReportData::default();
    let mut text = String::new();
    for response in &result.responses {
        text.push_str(&render_output_row(response, delimiter, &mut report));
        text.push('\n');
    }
    state.update_report(|total| total.merge(&report, true));

    // The append itself is the only work done under the buffer lock; the
    // part upload happens here, outside it.
    if let Some(pending) = state.buffer.append(&text) {
        state.upload_pending(store, dest_bucket, pending)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fake::FakeEngineContext;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(width: usize) -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(width).build().unwrap()
    }

    #[test]
    fn task_group_drains_and_keeps_first_error() {
        let pool = pool(4);
        let tasks = TaskGroup::new();
        let ran = Arc::new(AtomicUsize::new(0));
        for i in 0..8 {
            let ran = Arc::clone(&ran);
            tasks.spawn(&pool, move || {
                ran.fetch_add(1, Ordering::SeqCst);
                if i == 3 {
                    Err(BulkError::new(ErrorKind::Processing, "task 3 failed"))
                } else {
                    Ok(())
                }
            });
        }
        assert!(tasks.wait_all(Duration::from_secs(5)));
        assert_eq!(ran.load(Ordering::SeqCst), 8);
        assert!(tasks.take_error().is_some());
        assert!(tasks.take_error().is_none());
    }

    #[test]
    fn task_group_wait_times_out_while_tasks_run() {
        let pool = pool(1);
        let tasks = TaskGroup::new();
        tasks.spawn(&pool, || {
            std::thread::sleep(Duration::from_millis(100));
            Ok(())
        });
        assert!(!tasks.wait_all(Duration::from_millis(5)));
        assert!(tasks.wait_all(Duration::from_secs(5)));
    }

    #[test]
    fn heartbeater_respects_cadence() {
        let engine = Arc::new(FakeEngineContext::new());
        let mut heartbeater =
            Heartbeater::new(engine.clone(), Duration::from_secs(3600));
        heartbeater.maybe_beat("uploading");
        heartbeater.maybe_beat("uploading");
        heartbeater.maybe_beat("uploading");
        // First call fires, the rest are inside the interval.
        assert_eq!(engine.heartbeat_count(), 1);
    }

    #[test]
    fn heartbeater_fires_again_after_interval() {
        let engine = Arc::new(FakeEngineContext::new());
        let mut heartbeater = Heartbeater::new(engine.clone(), Duration::from_millis(0));
        heartbeater.maybe_beat("uploading");
        heartbeater.maybe_beat("uploading");
        assert_eq!(engine.heartbeat_count(), 2);
    }
}
