//! File chunking: line-size estimation and byte-range computation.
//!
//! A job's source object is never read whole. A small sample from the head of
//! the file yields the header schema, the line-terminator width, and an
//! average line size; from those the file is carved into contiguous byte
//! ranges that downstream stages process independently.
//!
//! Chunk ranges deliberately ignore line boundaries. The submission path
//! compensates by over-reading past each range and discarding the first
//! partial line, so no logical line is ever split between two chunks.

use crate::error::{BulkError, BulkResult, ErrorKind};
use regex::Regex;
use serde::{Deserialize, Serialize};

const TAB: &str = "\t";

/// Sampled facts about a source file. Computed once per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// 1 for `\n`, 2 for `\r\n`.
    pub line_terminator_size: u64,
    /// Ceiling of the mean sampled line size including the terminator.
    pub avg_line_size: u64,
    pub file_size: u64,
    /// Lowercased, trimmed header fields in file order.
    pub headers: Vec<String>,
}

/// One contiguous byte range of the source file.
///
/// Chunks are gapless: `chunks[i + 1].start_offset == chunks[i].end_offset + 1`,
/// the first chunk starts right after the header terminator, and the last
/// chunk ends at `file_size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunk {
    /// 1-based, sequential.
    pub chunk_number: u32,
    pub start_offset: u64,
    pub end_offset: u64,
    pub metadata: FileMetadata,
}

/// Scan the first line of `bytes` and return `(header_line, terminator_size)`.
///
/// The terminator is 2 bytes when the first `\n` is preceded by `\r`, else 1.
/// The header excludes any `\r`. A file without a newline yields the whole
/// content as the header and a terminator size of 1.
#[must_use]
pub fn detect_terminator(bytes: &[u8]) -> (String, u64) {
    let mut header = Vec::new();
    let mut prev = 0u8;
    for &b in bytes {
        if b == b'\n' {
            let size = if prev == b'\r' { 2 } else { 1 };
            return (String::from_utf8_lossy(&header).into_owned(), size);
        }
        if b != b'\r' {
            header.push(b);
        }
        prev = b;
    }
    (String::from_utf8_lossy(&header).into_owned(), 1)
}

/// Split a header line into lowercased, trimmed field names.
///
/// Tab delimiters are split literally; any other delimiter goes through a
/// regex-escaped literal split.
///
/// # Errors
///
/// Returns `InvalidInput` if the delimiter cannot form a valid pattern.
pub fn parse_headers(header_line: &str, delimiter: &str) -> BulkResult<Vec<String>> {
    let normalized = header_line.trim().to_lowercase();
    if delimiter == TAB {
        return Ok(normalized.split(TAB).map(str::to_string).collect());
    }
    let splitter = Regex::new(&regex::escape(delimiter)).map_err(|e| {
        BulkError::new(ErrorKind::InvalidInput, format!("bad delimiter {delimiter:?}: {e}"))
    })?;
    Ok(splitter.split(&normalized).map(str::to_string).collect())
}

/// Estimate [`FileMetadata`] from a sample read off the head of the object.
///
/// `sampled` should hold the first `min(1 MiB, file_size)` bytes. The average
/// is the ceiling of the mean `line length + terminator size` over up to
/// `sample_lines` lines *after* the header; it is 0 when the sample holds no
/// data lines.
///
/// # Errors
///
/// Returns `InvalidInput` if the delimiter cannot form a header pattern.
pub fn estimate_metadata(
    sample_lines: usize,
    file_size: u64,
    delimiter: &str,
    sampled: &[u8],
) -> BulkResult<FileMetadata> {
    let (header_line, terminator_size) = detect_terminator(sampled);
    let headers = parse_headers(&header_line, delimiter)?;

    let body_start = (header_line.len() as u64 + terminator_size).min(sampled.len() as u64) as usize;
    let mut total = 0u64;
    let mut count = 0u64;
    for line in sampled[body_start..]
        .split_inclusive(|&b| b == b'\n')
        .take(sample_lines)
    {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        total += line.len() as u64 + terminator_size;
        count += 1;
    }
    let avg_line_size = if count == 0 { 0 } else { total.div_ceil(count) };

    Ok(FileMetadata {
        line_terminator_size: terminator_size,
        avg_line_size,
        file_size,
        headers,
    })
}

/// Carve the file into byte-range chunks.
///
/// The effective chunk size is
/// `max(min_chunk_size, avg_line_size * min_lines_per_chunk)`. Starting right
/// after the header terminator, ranges `[start, min(start + size, file_size)]`
/// are emitted with the next start one past the previous end, until the start
/// position reaches the file size.
#[must_use]
pub fn compute_chunks(
    min_chunk_size: u64,
    min_lines_per_chunk: u64,
    metadata: &FileMetadata,
) -> Vec<FileChunk> {
    let chunk_size = min_chunk_size.max(metadata.avg_line_size * min_lines_per_chunk);
    let mut chunks = Vec::new();
    let mut start_position = metadata.line_terminator_size;
    let mut chunk_number = 1u32;
    while start_position < metadata.file_size {
        let end_position = (start_position + chunk_size).min(metadata.file_size);
        chunks.push(FileChunk {
            chunk_number,
            start_offset: start_position,
            end_offset: end_position,
            metadata: metadata.clone(),
        });
        chunk_number += 1;
        start_position = end_position + 1;
    }
    chunks
}
