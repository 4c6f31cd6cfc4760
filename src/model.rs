//! Wire and job model types.
//!
//! Everything here is serde-backed: the job request arrives as JSON from the
//! durable engine, batch events leave as JSON on the message bus, and batch
//! result objects come back as JSON from object storage.

use crate::error::{BulkError, BulkResult, ErrorKind};
use crate::report::ReportData;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A bulk job request. Immutable for the job's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub api_type: String,
    pub file_id: String,
    pub file_name: String,
    pub output_file_id: String,
    pub workspace_id: String,
    pub user_id: String,
    pub request_id: String,
    /// Single-character field separator for both input and output.
    pub delimiter: String,
    pub report_requested: bool,
    pub report_detail: Option<ReportDetail>,
}

/// Free-text fields substituted into the summary report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportDetail {
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub address: String,
}

/// Identifier of one dispatched batch.
///
/// The owning chunk is an explicit field rather than a prefix parsed out of
/// an opaque string; the canonical form `"<chunk>_<seq>"` is only used as the
/// status-store field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId {
    pub chunk: u32,
    pub seq: u32,
}

impl BatchId {
    #[must_use]
    pub const fn new(chunk: u32, seq: u32) -> Self {
        Self { chunk, seq }
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.chunk, self.seq)
    }
}

impl FromStr for BatchId {
    type Err = BulkError;

    fn from_str(s: &str) -> BulkResult<Self> {
        let (chunk, seq) = s.split_once('_').ok_or_else(|| {
            BulkError::new(ErrorKind::InvalidInput, format!("malformed batch id {s:?}"))
        })?;
        let parse = |part: &str| {
            part.parse::<u32>().map_err(|_| {
                BulkError::new(ErrorKind::InvalidInput, format!("malformed batch id {s:?}"))
            })
        };
        Ok(Self {
            chunk: parse(chunk)?,
            seq: parse(seq)?,
        })
    }
}

/// One parsed input line, reduced to the mandatory fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRecord {
    pub input1: String,
    pub input2: String,
    pub input3: String,
}

/// Batch payload published to the message bus for external enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEvent {
    pub query_id: String,
    pub batch_id: BatchId,
    pub payload_length: usize,
    pub records: Vec<InputRecord>,
}

/// One enriched record from the external enrichment process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichedRecord {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub error: Option<String>,
    pub input: Option<InputRecord>,
}

/// Result object written by the enrichment process for one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchResult {
    pub responses: Vec<EnrichedRecord>,
    pub payload_length: Option<usize>,
}

/// Outcome of submitting one chunk's records for enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSubmitResult {
    pub batch_count: u32,
    pub total_records: u64,
}

/// Outcome of aggregating one chunk, consumed exactly once by the
/// orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkProcessingResult {
    pub chunk_number: u32,
    pub total_record_count: u64,
    pub total_batch_count: u32,
    pub report_data: ReportData,
    /// The eTag produced when the chunk's finished object was copied into
    /// the job's final multipart object.
    pub upload_tag_id: String,
}

/// Echo of job identifiers returned when a job completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub api_type: String,
    pub file_id: String,
    pub file_name: String,
    pub output_file_id: String,
    pub workspace_id: String,
    pub user_id: String,
    pub report_requested: bool,
}

impl JobResult {
    #[must_use]
    pub fn from_request(job: &JobRequest) -> Self {
        Self {
            api_type: job.api_type.clone(),
            file_id: job.file_id.clone(),
            file_name: job.file_name.clone(),
            output_file_id: job.output_file_id.clone(),
            workspace_id: job.workspace_id.clone(),
            user_id: job.user_id.clone(),
            report_requested: job.report_requested,
        }
    }
}
