//! End-to-end pipeline runs against the in-memory fakes, with a background
//! thread standing in for the external enrichment process.

use anyhow::Result;
use bulkflow::io::fake::{FakeEngineContext, FakeMessageBus, FakeObjectStore, FakeStatusStore};
use bulkflow::io::traits::{ObjectStore, StatusStore};
use bulkflow::model::{BatchEvent, BatchResult, EnrichedRecord, JobRequest};
use bulkflow::{
    ErrorKind, ProcessorConfig, ReportConfig, WorkerActivities, keys, run_job,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

const API_BUCKET: &str = "dev-us-east-1-bulk-api";
const RESULT_BUCKET: &str = "dev-us-east-1-bulk-result";
const INPUT_KEY: &str = "w1/user-a/input/input.csv::f1";
const FINAL_KEY: &str = "w1/user-a/output/out1/input.csv::f1.csv";
const REPORT_KEY: &str = "w1/user-a/output/out1/report.txt";

fn job(report_requested: bool) -> JobRequest {
    JobRequest {
        api_type: "enrich".into(),
        file_id: "f1".into(),
        file_name: "input.csv".into(),
        output_file_id: "out1".into(),
        workspace_id: "w1".into(),
        user_id: "user-a".into(),
        request_id: "r1".into(),
        delimiter: ",".into(),
        report_requested,
        report_detail: None,
    }
}

fn config(batch_size: usize) -> ProcessorConfig {
    ProcessorConfig {
        min_chunk_size: 1,
        min_lines_per_chunk: 3,
        max_parallel_chunks: 2,
        batch_size,
        converter_pool_size: 4,
        poll_interval: Duration::from_millis(5),
        heartbeat_interval: Duration::from_secs(3600),
        drain_wait: Duration::from_millis(200),
        throttle_delay: Duration::from_millis(0),
        ..ProcessorConfig::default()
    }
}

/// Header plus six 12-byte data lines; 93 bytes total, which the test
/// config splits into three chunks.
fn input_content() -> Vec<u8> {
    let mut content = b"input1,input2,input3\n".to_vec();
    for i in 1..=6 {
        content.extend_from_slice(format!("a{i:02},b{i:02},c{i:02}\n").as_bytes());
    }
    content
}

fn enrich(record: &bulkflow::InputRecord) -> EnrichedRecord {
    EnrichedRecord {
        name: Some(format!("name-{}", record.input1)),
        email: None,
        address: Some(format!("{} lane, unit 7", record.input2)),
        error: None,
        input: Some(record.clone()),
    }
}

/// Consume published batch events, write a result object per batch, and
/// mark the batch COMPLETED — the enrichment process, minus the enriching.
fn spawn_enricher(
    bus: FakeMessageBus,
    store: FakeObjectStore,
    status: FakeStatusStore,
    stop: Arc<AtomicBool>,
    corrupt: bool,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut processed = 0;
        loop {
            let messages = bus.published();
            for message in &messages[processed..] {
                let event: BatchEvent = serde_json::from_slice(&message.payload).unwrap();
                let folder = keys::result_folder("w1", "enrich", &event.query_id);
                let key = keys::result_object_key(&folder, &event.batch_id.to_string());
                if corrupt {
                    store.seed(RESULT_BUCKET, &key, b"definitely not json");
                } else {
                    let result = BatchResult {
                        responses: event.records.iter().map(enrich).collect(),
                        payload_length: Some(event.records.len()),
                    };
                    store.seed(RESULT_BUCKET, &key, &serde_json::to_vec(&result).unwrap());
                }
                status
                    .hash_set(
                        &event.query_id,
                        &event.batch_id.to_string(),
                        "COMPLETED",
                        Duration::from_secs(60),
                    )
                    .unwrap();
            }
            processed = messages.len();
            if stop.load(Ordering::Relaxed) && processed == bus.published().len() {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    })
}

struct Pipeline {
    store: FakeObjectStore,
    activities: WorkerActivities,
    stop: Arc<AtomicBool>,
    enricher: JoinHandle<()>,
}

fn setup(batch_size: usize, corrupt: bool) -> Pipeline {
    let store = FakeObjectStore::new();
    let bus = FakeMessageBus::new();
    let status = FakeStatusStore::new();
    store.seed(API_BUCKET, INPUT_KEY, &input_content());
    let stop = Arc::new(AtomicBool::new(false));
    let enricher = spawn_enricher(
        bus.clone(),
        store.clone(),
        status.clone(),
        Arc::clone(&stop),
        corrupt,
    );
    let activities = WorkerActivities::new(
        Arc::new(store.clone()),
        Arc::new(bus),
        Arc::new(status),
        Arc::new(FakeEngineContext::new()),
        config(batch_size),
        ReportConfig::default(),
    )
    .unwrap();
    Pipeline { store, activities, stop, enricher }
}

impl Pipeline {
    fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        self.enricher.join().unwrap();
    }
}

#[test]
fn whole_job_assembles_output_in_chunk_order() -> Result<()> {
    let pipeline = setup(10, false);
    let result = run_job(&pipeline.activities, &job(true))?;
    assert_eq!(result.output_file_id, "out1");
    assert!(result.report_requested);

    let content = String::from_utf8(pipeline.store.get_object(API_BUCKET, FINAL_KEY)?)?;
    let expected: String = std::iter::once(
        "name,email,address,input1,input2,input3,error\n".to_string(),
    )
    .chain((1..=6).map(|i| {
        format!("name-a{i:02},,\"b{i:02} lane, unit 7\",a{i:02},b{i:02},c{i:02},\n")
    }))
    .collect();
    assert_eq!(content, expected);

    // Every multipart session was completed or cleaned up.
    assert!(!pipeline.store.has_open_uploads());

    let report = String::from_utf8(pipeline.store.get_object(API_BUCKET, REPORT_KEY)?)?;
    assert!(report.contains("Summary Report"));
    assert!(report.contains(&bulkflow::report::fixed_width("6", 16, false)));
    pipeline.shutdown();
    Ok(())
}

#[test]
fn single_record_batches_still_cover_every_record() -> Result<()> {
    let pipeline = setup(1, false);
    run_job(&pipeline.activities, &job(false))?;

    let content = String::from_utf8(pipeline.store.get_object(API_BUCKET, FINAL_KEY)?)?;
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "name,email,address,input1,input2,input3,error");
    let mut rows: Vec<&str> = lines[1..].to_vec();
    rows.sort_unstable();
    let expected: Vec<String> = (1..=6)
        .map(|i| format!("name-a{i:02},,\"b{i:02} lane, unit 7\",a{i:02},b{i:02},c{i:02},"))
        .collect();
    assert_eq!(rows, expected);

    // No report was requested, so none was written.
    assert!(pipeline.store.get_object(API_BUCKET, REPORT_KEY).is_err());
    pipeline.shutdown();
    Ok(())
}

#[test]
fn corrupt_enrichment_results_abort_the_job() {
    let pipeline = setup(10, true);
    let err = run_job(&pipeline.activities, &job(false)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Processing);
    // The job aborted before finalizing: no final object exists.
    assert!(pipeline.store.get_object(API_BUCKET, FINAL_KEY).is_err());
    pipeline.shutdown();
}
