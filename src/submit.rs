//! Chunk submission: stream a byte range, batch records, dispatch.
//!
//! The read range extends one byte below the chunk start and two average
//! lines past the chunk end so the first and last logical lines of the chunk
//! are never truncated by the chunk boundary. The first emitted line of the
//! range is always the tail of the previous chunk (or the header) and is
//! discarded; the line assembler stops once its cursor passes the chunk end.

use crate::chunker::FileChunk;
use crate::config::ProcessorConfig;
use crate::dispatch::EventDispatcher;
use crate::error::BulkResult;
use crate::io::traits::ObjectStore;
use crate::keys;
use crate::lines::LineAssembler;
use crate::model::{BatchId, ChunkSubmitResult, InputRecord, JobRequest};
use crate::record::parse_record;
use std::sync::Arc;
use tracing::info;

/// Submits one chunk's records for enrichment.
pub struct ChunkSubmitter {
    store: Arc<dyn ObjectStore>,
    dispatcher: EventDispatcher,
    config: ProcessorConfig,
}

impl ChunkSubmitter {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        dispatcher: EventDispatcher,
        config: ProcessorConfig,
    ) -> Self {
        Self { store, dispatcher, config }
    }

    /// Stream the chunk's range, group parsed records into batches, and
    /// dispatch each batch. Returns the batch and record counts.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the source object is missing (never retried);
    /// any other storage or dispatch failure is `TransientIo` and retryable
    /// at the activity boundary.
    pub fn submit(&self, chunk: &FileChunk, job: &JobRequest) -> BulkResult<ChunkSubmitResult> {
        let metadata = &chunk.metadata;
        let query_id = keys::query_id(&job.api_type, &job.file_name, &job.output_file_id);
        let bucket = keys::bucket_name(&self.config.env, &self.config.region, keys::BULK_API_BUCKET);
        let input_key = keys::input_object_key(
            &keys::file_name_with_id(&job.file_name, &job.file_id),
            &job.workspace_id,
            &job.user_id,
        );

        let adjusted_start = chunk.start_offset - 1;
        let adjusted_end =
            (chunk.end_offset + 2 * metadata.avg_line_size).min(metadata.file_size);
        let stream = self
            .store
            .get_range(&bucket, &input_key, adjusted_start, adjusted_end)?;

        let mut assembler = LineAssembler::new(stream, adjusted_start, chunk.end_offset);
        // The first line of the range is the remainder of the previous chunk.
        if let Some(Err(err)) = assembler.next() {
            return Err(err);
        }

        let mut batch: Vec<InputRecord> = Vec::with_capacity(self.config.batch_size);
        let mut batch_count = 0u32;
        let mut total_records = 0u64;
        for line in assembler {
            let line = line?;
            total_records += 1;
            batch.push(parse_record(&metadata.headers, &line, &job.delimiter));
            if batch.len() == self.config.batch_size {
                batch_count += 1;
                self.close_batch(&query_id, chunk.chunk_number, batch_count, &mut batch)?;
            }
        }
        if !batch.is_empty() {
            batch_count += 1;
            self.close_batch(&query_id, chunk.chunk_number, batch_count, &mut batch)?;
        }

        info!(
            chunk = chunk.chunk_number,
            batches = batch_count,
            records = total_records,
            "chunk submitted"
        );
        Ok(ChunkSubmitResult { batch_count, total_records })
    }

    fn close_batch(
        &self,
        query_id: &str,
        chunk_number: u32,
        batch_count: u32,
        batch: &mut Vec<InputRecord>,
    ) -> BulkResult<()> {
        // Brief pause every Nth batch so the dispatch path is not flooded.
        if self.config.throttle_every > 0 && batch_count as usize % self.config.throttle_every == 0 {
            std::thread::sleep(self.config.throttle_delay);
        }
        self.dispatcher.dispatch(
            query_id,
            BatchId::new(chunk_number, batch_count),
            std::mem::take(batch),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::STATUS_SUBMITTED;
    use crate::io::fake::{FakeMessageBus, FakeObjectStore, FakeStatusStore};
    use crate::io::traits::StatusStore as _;
    use crate::model::BatchEvent;
    use std::time::Duration;

    fn job() -> JobRequest {
        JobRequest {
            api_type: "enrich".into(),
            file_id: "f1".into(),
            file_name: "input.csv".into(),
            output_file_id: "out1".into(),
            workspace_id: "w1".into(),
            user_id: "user-a".into(),
            request_id: "r1".into(),
            delimiter: ",".into(),
            report_requested: false,
            report_detail: None,
        }
    }

    fn config(batch_size: usize) -> ProcessorConfig {
        ProcessorConfig {
            batch_size,
            throttle_delay: Duration::from_millis(0),
            ..ProcessorConfig::default()
        }
    }

    fn setup(content: &[u8], batch_size: usize) -> (ChunkSubmitter, FakeMessageBus, FakeStatusStore, FileChunk) {
        let store = FakeObjectStore::new();
        store.seed("dev-us-east-1-bulk-api", "w1/user-a/input/input.csv::f1", content);
        let bus = FakeMessageBus::new();
        let status = FakeStatusStore::new();
        let dispatcher = EventDispatcher::new(
            Arc::new(bus.clone()),
            Arc::new(status.clone()),
            Duration::from_secs(60),
        );
        let metadata = crate::chunker::estimate_metadata(100, content.len() as u64, ",", content)
            .unwrap();
        let chunk = FileChunk {
            chunk_number: 1,
            start_offset: metadata.line_terminator_size,
            end_offset: metadata.file_size,
            metadata,
        };
        let submitter = ChunkSubmitter::new(Arc::new(store), dispatcher, config(batch_size));
        (submitter, bus, status, chunk)
    }

    #[test]
    fn two_data_lines_form_one_batch() {
        let content = b"input1,input2,input3\n1,test, test3\n2,test4,test5";
        let (submitter, bus, status, chunk) = setup(content, 4);
        let result = submitter.submit(&chunk, &job()).unwrap();
        assert_eq!(result, ChunkSubmitResult { batch_count: 1, total_records: 2 });

        let published = bus.published();
        assert_eq!(published.len(), 1);
        let event: BatchEvent = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(event.records.len(), 2);
        assert_eq!(event.records[0].input1, "1");
        assert_eq!(event.records[0].input3, "test3");

        let entries = status.hash_scan_all("enrich-input.csv-out1").unwrap();
        assert_eq!(entries, vec![("1_1".to_string(), STATUS_SUBMITTED.to_string())]);
    }

    #[test]
    fn header_line_is_never_submitted() {
        let content = b"input1,input2,input3\na,b,c\n";
        let (submitter, bus, _, chunk) = setup(content, 4);
        submitter.submit(&chunk, &job()).unwrap();
        let event: BatchEvent = serde_json::from_slice(&bus.published()[0].payload).unwrap();
        assert_eq!(event.records.len(), 1);
        assert_eq!(event.records[0].input1, "a");
    }

    #[test]
    fn batches_split_on_configured_size() {
        let mut content = b"input1,input2,input3\n".to_vec();
        for i in 0..5 {
            content.extend_from_slice(format!("{i},x,y\n").as_bytes());
        }
        let (submitter, bus, _, chunk) = setup(&content, 2);
        let result = submitter.submit(&chunk, &job()).unwrap();
        assert_eq!(result, ChunkSubmitResult { batch_count: 3, total_records: 5 });
        // Batch ids are sequential within the chunk.
        let ids: Vec<String> = bus
            .published()
            .iter()
            .map(|m| {
                let event: BatchEvent = serde_json::from_slice(&m.payload).unwrap();
                event.batch_id.to_string()
            })
            .collect();
        assert_eq!(ids, vec!["1_1", "1_2", "1_3"]);
    }

    #[test]
    fn missing_source_object_is_not_found() {
        let store = FakeObjectStore::new();
        let dispatcher = EventDispatcher::new(
            Arc::new(FakeMessageBus::new()),
            Arc::new(FakeStatusStore::new()),
            Duration::from_secs(60),
        );
        let metadata = crate::chunker::FileMetadata {
            line_terminator_size: 1,
            avg_line_size: 10,
            file_size: 100,
            headers: vec!["input1".into(), "input2".into(), "input3".into()],
        };
        let chunk = FileChunk {
            chunk_number: 1,
            start_offset: 1,
            end_offset: 100,
            metadata,
        };
        let submitter = ChunkSubmitter::new(Arc::new(store), dispatcher, config(4));
        let err = submitter.submit(&chunk, &job()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotFound);
    }
}
