//! # Bulkflow
//!
//! A **bulk-enrichment pipeline** for very large delimited text files.
//! Bulkflow splits a source object into byte-range chunks, dispatches each
//! chunk's records for external enrichment through a message bus, waits for
//! per-chunk completion under bounded parallelism, and reassembles the
//! enriched results into a single output object via a two-level multipart
//! upload — with an optional fixed-width summary report at the end.
//!
//! ## Pipeline stages
//!
//! - **Chunking** ([`chunker`]) — sample the head of the file to estimate
//!   the average line size and header schema, then carve the file into
//!   contiguous, gapless byte ranges.
//! - **Submission** ([`submit`], [`lines`], [`dispatch`]) — stream a chunk's
//!   range, restore line boundaries across read windows, parse records, and
//!   publish fixed-size batches with a SUBMITTED marker per batch.
//! - **Aggregation** ([`aggregator`], [`multipart`]) — poll the status store
//!   for COMPLETED batches, convert each result object into output rows on a
//!   shared worker pool, and build the chunk's temporary multipart object
//!   behind a narrowly-scoped buffer lock.
//! - **Orchestration** ([`orchestrator`], [`activities`]) — a bounded window
//!   of in-flight chunk aggregations, harvested as they complete, with the
//!   final object assembled from per-chunk parts in chunk order.
//!
//! ## Quick start
//!
//! ```ignore
//! use bulkflow::*;
//! use std::sync::Arc;
//!
//! let config = ProcessorConfig::from_env();
//! let activities = WorkerActivities::new(
//!     object_store,          // Arc<dyn ObjectStore>
//!     message_bus,           // Arc<dyn MessageBus>
//!     status_store,          // Arc<dyn StatusStore>
//!     engine_context,        // Arc<dyn EngineContext>
//!     config,
//!     ReportConfig::default(),
//! )?;
//! let activities = RetryingActivities::new(activities, RetryConfig::default());
//! let result = run_job(&activities, &job)?;
//! ```
//!
//! ## External collaborators
//!
//! Object storage, the message bus, the status store, and the durable
//! engine's liveness channel are consumed through the narrow traits in
//! [`io::traits`]; [`io::fake`] provides in-memory implementations that can
//! drive the whole pipeline in tests.
//!
//! ## Failure model
//!
//! Every error carries an [`ErrorKind`]; `NotFound`, `Processing`, and
//! `MalformedInput` abort immediately, while transient storage conditions
//! are retried at the activity boundary with bounded exponential backoff
//! ([`retry`]). A chunk or a job either fully completes or is reported
//! failed — no partial final object is ever assembled.

pub mod activities;
pub mod aggregator;
pub mod chunker;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod io;
pub mod keys;
pub mod lines;
pub mod model;
pub mod multipart;
pub mod orchestrator;
pub mod record;
pub mod report;
pub mod retry;
pub mod submit;

// General re-exports
pub use activities::{BulkActivities, RetryingActivities, WorkerActivities};
pub use aggregator::ChunkAggregator;
pub use chunker::{FileChunk, FileMetadata, compute_chunks, estimate_metadata};
pub use config::{ProcessorConfig, ReportConfig};
pub use dispatch::EventDispatcher;
pub use error::{BulkError, BulkResult, ErrorKind};
pub use io::traits::{CompletedPart, EngineContext, MessageBus, ObjectStore, StatusStore};
pub use model::{
    BatchEvent, BatchId, ChunkProcessingResult, ChunkSubmitResult, InputRecord, JobRequest,
    JobResult, ReportDetail,
};
pub use orchestrator::run_job;
pub use report::ReportData;
pub use retry::{RetryConfig, retry_with_backoff};
pub use submit::ChunkSubmitter;
