//! Top-level job scheduling: SPLIT → SCHEDULE → FINALIZE → REPORT.
//!
//! The scheduler keeps a FIFO queue of pending chunks and a window of
//! in-flight aggregation tasks bounded by the configured width. Filling the
//! window submits the chunk's records synchronously first, so its batch and
//! record counts land in the running totals before the chunk occupies a
//! slot, and only then starts the aggregation asynchronously. Progress blocks until
//! at least one in-flight task completes and then harvests *every* completed
//! task, not just the one that woke the wait, so fast chunks never starve
//! the window.
//!
//! Scheduling decisions are pure functions over the set of completed
//! results; the only suspension points are the window-fill call and the
//! any-of wait. Every externally visible call carries a stable identifier,
//! so a durable engine replaying this loop re-issues only calls whose
//! results it has not yet observed.

use crate::activities::BulkActivities;
use crate::chunker::FileChunk;
use crate::error::{BulkError, BulkResult, ErrorKind};
use crate::io::traits::CompletedPart;
use crate::keys;
use crate::model::{ChunkProcessingResult, JobRequest, JobResult};
use crate::report::ReportData;
use std::collections::VecDeque;
use std::sync::mpsc;
use tracing::info;

const REPORT_TYPE: &str = "SUMMARY";

/// Run one bulk job to completion.
///
/// # Errors
///
/// Propagates the first failure from any activity; the job aborts without
/// finalizing the output object, so no partial final object ever exists.
pub fn run_job<A: BulkActivities>(activities: &A, job: &JobRequest) -> BulkResult<JobResult> {
    let query_id = keys::query_id(&job.api_type, &job.file_name, &job.output_file_id);
    info!(%query_id, job = %job.output_file_id, "starting bulk job");

    let file_name = keys::file_name_with_id(&job.file_name, &job.file_id);
    let input_key = keys::input_object_key(&file_name, &job.workspace_id, &job.user_id);
    let final_key = keys::output_object_key(
        &file_name,
        &job.output_file_id,
        &job.workspace_id,
        &job.user_id,
    );

    let upload_id = activities.generate_upload_id(&final_key)?;
    let chunks = activities.split_file_into_chunks(&input_key, &job.delimiter)?;
    info!(%query_id, total_chunks = chunks.len(), "computed chunk list");
    let window = activities.get_max_parallel_chunks()?.max(1) as usize;

    let mut queue: VecDeque<FileChunk> = chunks.into_iter().collect();
    let upload_id_ref = upload_id.as_str();
    let mut submitted_records = 0u64;
    let mut successful_records = 0u64;
    let mut report_total = ReportData::default();
    let mut final_parts: Vec<CompletedPart> = Vec::new();

    std::thread::scope(|scope| -> BulkResult<()> {
        let (tx, rx) = mpsc::channel::<BulkResult<ChunkProcessingResult>>();
        let mut in_flight = 0usize;

        let mut fill_window = |in_flight: &mut usize,
                               queue: &mut VecDeque<FileChunk>,
                               submitted_records: &mut u64|
         -> BulkResult<()> {
            while *in_flight < window {
                let Some(chunk) = queue.pop_front() else { break };
                let submit = activities.upload_chunk(&chunk, job)?;
                info!(
                    chunk = chunk.chunk_number,
                    records = submit.total_records,
                    batches = submit.batch_count,
                    "chunk submitted, starting aggregation"
                );
                *submitted_records += submit.total_records;
                let tx = tx.clone();
                let chunk_number = chunk.chunk_number;
                scope.spawn(move || {
                    // The receiver is gone when the job already aborted;
                    // the result is dropped either way.
                    let _ = tx.send(activities.process_chunk(
                        chunk_number,
                        upload_id_ref,
                        submit.batch_count,
                        job,
                    ));
                });
                *in_flight += 1;
            }
            Ok(())
        };

        fill_window(&mut in_flight, &mut queue, &mut submitted_records)?;
        while in_flight > 0 {
            // Block for one completion, then harvest everything that is
            // done right now.
            let first = rx.recv().map_err(|_| {
                BulkError::new(ErrorKind::Processing, "aggregation task disappeared")
            })?;
            in_flight -= 1;
            let mut completed = vec![first];
            while let Ok(result) = rx.try_recv() {
                in_flight -= 1;
                completed.push(result);
            }
            for result in completed {
                let result = result?;
                info!(
                    chunk = result.chunk_number,
                    records = result.total_record_count,
                    batches = result.total_batch_count,
                    "chunk completed"
                );
                successful_records += result.total_record_count;
                report_total.merge(&result.report_data, job.report_requested);
                final_parts.push(CompletedPart {
                    part_number: result.chunk_number,
                    etag: result.upload_tag_id,
                });
            }
            fill_window(&mut in_flight, &mut queue, &mut submitted_records)?;
        }
        Ok(())
    })?;

    info!(submitted_records, successful_records, "all chunks processed");
    final_parts.sort_by_key(|p| p.part_number);
    activities.finalize_file_upload(&final_key, &upload_id, &final_parts)?;

    if job.report_requested {
        let report_key = format!(
            "{}{}",
            keys::report_object_prefix(&job.output_file_id, &job.workspace_id, &job.user_id),
            keys::REPORT_NAME
        );
        info!(%report_key, "generating summary report");
        activities.create_and_upload_report(
            &report_key,
            &report_total,
            job.report_detail.as_ref(),
            REPORT_TYPE,
        )?;
    }

    info!(%query_id, job = %job.output_file_id, "job completed");
    Ok(JobResult::from_request(job))
}
