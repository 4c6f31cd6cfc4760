//! The activity boundary between the orchestrator and the worker.
//!
//! [`BulkActivities`] is the narrow contract the durable engine schedules and
//! retries; [`WorkerActivities`] is the production implementation wired over
//! the external-service traits. [`RetryingActivities`] decorates any
//! implementation with the bounded-backoff policy, retrying only failures
//! classified retryable.

use crate::aggregator::ChunkAggregator;
use crate::chunker::{FileChunk, compute_chunks, estimate_metadata};
use crate::config::{ProcessorConfig, ReportConfig};
use crate::dispatch::EventDispatcher;
use crate::error::BulkResult;
use crate::io::traits::{CompletedPart, EngineContext, MessageBus, ObjectStore, StatusStore};
use crate::keys;
use crate::model::{ChunkProcessingResult, ChunkSubmitResult, JobRequest, ReportDetail};
use crate::record::validate_headers;
use crate::report::{ReportData, render_report};
use crate::retry::{RetryConfig, retry_with_backoff};
use crate::submit::ChunkSubmitter;
use std::io::Read;
use std::sync::Arc;
use tracing::{error, info};

const SAMPLE_WINDOW: u64 = 1024 * 1024;

/// Activity-style boundary consumed by the orchestrator. Each call is
/// independently retryable per its error classification.
pub trait BulkActivities: Send + Sync {
    /// Configured bound on concurrently aggregating chunks.
    ///
    /// # Errors
    ///
    /// Infallible in the worker implementation; adapters may fail.
    fn get_max_parallel_chunks(&self) -> BulkResult<u32>;

    /// Open the job's final multipart upload.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` (non-retryable) if the output bucket is missing,
    /// `TransientIo` otherwise.
    fn generate_upload_id(&self, output_key: &str) -> BulkResult<String>;

    /// Sample the source object and carve it into byte-range chunks.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` (non-retryable) if the source object is missing,
    /// `MalformedInput` if mandatory headers are absent, `TransientIo`
    /// otherwise.
    fn split_file_into_chunks(&self, input_key: &str, delimiter: &str)
    -> BulkResult<Vec<FileChunk>>;

    /// Stream one chunk's records and dispatch them in batches.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` (non-retryable) if the source object is missing,
    /// `TransientIo` otherwise.
    fn upload_chunk(&self, chunk: &FileChunk, job: &JobRequest) -> BulkResult<ChunkSubmitResult>;

    /// Aggregate one chunk's completed batches into its part of the final
    /// object.
    ///
    /// # Errors
    ///
    /// Returns `Processing` (non-retryable) on conversion failure,
    /// `TransientIo` on storage failure.
    fn process_chunk(
        &self,
        chunk_number: u32,
        upload_id: &str,
        total_batches: u32,
        job: &JobRequest,
    ) -> BulkResult<ChunkProcessingResult>;

    /// Complete the job's final multipart object.
    ///
    /// # Errors
    ///
    /// Returns `TransientIo` if completion fails.
    fn finalize_file_upload(
        &self,
        file_key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BulkResult<()>;

    /// Render and upload the summary document.
    ///
    /// # Errors
    ///
    /// Returns `TransientIo` if the upload fails.
    fn create_and_upload_report(
        &self,
        output_key: &str,
        report_data: &ReportData,
        report_detail: Option<&ReportDetail>,
        report_type: &str,
    ) -> BulkResult<()>;
}

/// Production implementation over the external-service traits.
pub struct WorkerActivities {
    store: Arc<dyn ObjectStore>,
    submitter: ChunkSubmitter,
    aggregator: ChunkAggregator,
    config: ProcessorConfig,
    report_config: ReportConfig,
}

impl WorkerActivities {
    /// Wire up the worker from its external collaborators.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the aggregator's worker pool cannot be
    /// constructed.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bus: Arc<dyn MessageBus>,
        status: Arc<dyn StatusStore>,
        engine: Arc<dyn EngineContext>,
        config: ProcessorConfig,
        report_config: ReportConfig,
    ) -> BulkResult<Self> {
        let dispatcher = EventDispatcher::new(bus, Arc::clone(&status), config.status_ttl);
        let submitter =
            ChunkSubmitter::new(Arc::clone(&store), dispatcher, config.clone());
        let aggregator =
            ChunkAggregator::new(Arc::clone(&store), status, engine, config.clone())?;
        Ok(Self { store, submitter, aggregator, config, report_config })
    }

    fn api_bucket(&self) -> String {
        keys::bucket_name(&self.config.env, &self.config.region, keys::BULK_API_BUCKET)
    }
}

impl BulkActivities for WorkerActivities {
    fn get_max_parallel_chunks(&self) -> BulkResult<u32> {
        Ok(self.config.max_parallel_chunks)
    }

    fn generate_upload_id(&self, output_key: &str) -> BulkResult<String> {
        let bucket = self.api_bucket();
        self.store
            .create_multipart_upload(&bucket, output_key)
            .inspect_err(|err| {
                error!(%bucket, output_key, %err, "failed to open final upload");
            })
    }

    fn split_file_into_chunks(
        &self,
        input_key: &str,
        delimiter: &str,
    ) -> BulkResult<Vec<FileChunk>> {
        let bucket = self.api_bucket();
        let file_size = self.store.head_size(&bucket, input_key).inspect_err(|err| {
            error!(%bucket, input_key, %err, "failed to size input object");
        })?;
        let mut sampled = Vec::new();
        self.store
            .get_range(&bucket, input_key, 0, SAMPLE_WINDOW.min(file_size))?
            .read_to_end(&mut sampled)?;
        let metadata =
            estimate_metadata(self.config.sample_lines, file_size, delimiter, &sampled)?;
        validate_headers(&metadata.headers)?;
        let chunks = compute_chunks(
            self.config.min_chunk_size,
            self.config.min_lines_per_chunk,
            &metadata,
        );
        info!(input_key, chunks = chunks.len(), avg_line_size = metadata.avg_line_size,
            "split input into chunks");
        Ok(chunks)
    }

    fn upload_chunk(&self, chunk: &FileChunk, job: &JobRequest) -> BulkResult<ChunkSubmitResult> {
        self.submitter.submit(chunk, job).inspect_err(|err| {
            error!(chunk = chunk.chunk_number, file = %job.file_name, %err, "chunk submit failed");
        })
    }

    fn process_chunk(
        &self,
        chunk_number: u32,
        upload_id: &str,
        total_batches: u32,
        job: &JobRequest,
    ) -> BulkResult<ChunkProcessingResult> {
        let query_id = keys::query_id(&job.api_type, &job.file_name, &job.output_file_id);
        self.aggregator
            .aggregate(chunk_number, &query_id, total_batches, job, upload_id)
            .inspect_err(|err| {
                error!(chunk = chunk_number, file = %job.file_name, %err, "chunk processing failed");
            })
    }

    fn finalize_file_upload(
        &self,
        file_key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BulkResult<()> {
        let bucket = self.api_bucket();
        let mut parts = parts.to_vec();
        parts.sort_by_key(|p| p.part_number);
        self.store
            .complete_multipart_upload(&bucket, file_key, upload_id, &parts)
            .inspect_err(|err| {
                error!(file_key, upload_id, %err, "failed to finalize file upload");
            })
    }

    fn create_and_upload_report(
        &self,
        output_key: &str,
        report_data: &ReportData,
        report_detail: Option<&ReportDetail>,
        report_type: &str,
    ) -> BulkResult<()> {
        let bucket = self.api_bucket();
        let document = render_report(report_data, report_detail, &self.report_config);
        self.store
            .put_object(&bucket, output_key, document.as_bytes())
            .inspect_err(|err| {
                error!(report_type, output_key, %err, "failed to upload report");
            })
    }
}

/// Decorator applying the bounded-backoff retry policy to every activity
/// call of an inner implementation.
pub struct RetryingActivities<A> {
    inner: A,
    retry: RetryConfig,
}

impl<A: BulkActivities> RetryingActivities<A> {
    #[must_use]
    pub fn new(inner: A, retry: RetryConfig) -> Self {
        Self { inner, retry }
    }
}

impl<A: BulkActivities> BulkActivities for RetryingActivities<A> {
    fn get_max_parallel_chunks(&self) -> BulkResult<u32> {
        retry_with_backoff(&self.retry, || self.inner.get_max_parallel_chunks())
    }

    fn generate_upload_id(&self, output_key: &str) -> BulkResult<String> {
        retry_with_backoff(&self.retry, || self.inner.generate_upload_id(output_key))
    }

    fn split_file_into_chunks(
        &self,
        input_key: &str,
        delimiter: &str,
    ) -> BulkResult<Vec<FileChunk>> {
        retry_with_backoff(&self.retry, || {
            self.inner.split_file_into_chunks(input_key, delimiter)
        })
    }

    fn upload_chunk(&self, chunk: &FileChunk, job: &JobRequest) -> BulkResult<ChunkSubmitResult> {
        retry_with_backoff(&self.retry, || self.inner.upload_chunk(chunk, job))
    }

    fn process_chunk(
        &self,
        chunk_number: u32,
        upload_id: &str,
        total_batches: u32,
        job: &JobRequest,
    ) -> BulkResult<ChunkProcessingResult> {
        retry_with_backoff(&self.retry, || {
            self.inner.process_chunk(chunk_number, upload_id, total_batches, job)
        })
    }

    fn finalize_file_upload(
        &self,
        file_key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BulkResult<()> {
        retry_with_backoff(&self.retry, || {
            self.inner.finalize_file_upload(file_key, upload_id, parts)
        })
    }

    fn create_and_upload_report(
        &self,
        output_key: &str,
        report_data: &ReportData,
        report_detail: Option<&ReportDetail>,
        report_type: &str,
    ) -> BulkResult<()> {
        retry_with_backoff(&self.retry, || {
            self.inner
                .create_and_upload_report(output_key, report_data, report_detail, report_type)
        })
    }
}
