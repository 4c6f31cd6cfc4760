//! Record parsing and output-row rendering.
//!
//! Input lines are delimiter-separated with an informal quoting convention:
//! a field may be wrapped in double quotes to protect an embedded delimiter,
//! but files in the wild also contain stray and unbalanced quotes. A line
//! with a balanced quote count gets a quote-aware split; if that produces the
//! wrong field count, or the quotes are unbalanced, the line falls back to a
//! naive literal split.

use crate::error::{BulkError, BulkResult, ErrorKind};
use crate::model::{EnrichedRecord, InputRecord};
use crate::report::ReportData;

const QUOTE: char = '"';
const MANDATORY_HEADERS: [&str; 3] = ["input1", "input2", "input3"];

/// Column order of the output CSV.
const OUTPUT_COLUMNS: [&str; 7] = [
    "name", "email", "address", "input1", "input2", "input3", "error",
];

/// Fail the job if any mandatory input header is absent.
///
/// # Errors
///
/// Returns `MalformedInput`; this fires before any chunk is created and is
/// never retried.
pub fn validate_headers(headers: &[String]) -> BulkResult<()> {
    if MANDATORY_HEADERS
        .iter()
        .all(|h| headers.iter().any(|found| found == h))
    {
        return Ok(());
    }
    tracing::info!(?headers, "mandatory headers are missing");
    Err(BulkError::new(
        ErrorKind::MalformedInput,
        format!("mandatory input headers {MANDATORY_HEADERS:?} missing; the file may not be UTF-8 encoded"),
    ))
}

fn has_balanced_quotes(line: &str) -> bool {
    line.chars().filter(|&c| c == QUOTE).count() % 2 == 0
}

/// Split on the delimiter only outside quoted spans. Trailing empty fields
/// are kept.
fn quote_aware_split<'a>(line: &'a str, delimiter: &str) -> Vec<&'a str> {
    let mut fields = Vec::new();
    let mut in_quotes = false;
    let mut field_start = 0;
    let mut i = 0;
    while i < line.len() {
        let rest = &line[i..];
        if rest.starts_with(QUOTE) {
            in_quotes = !in_quotes;
            i += QUOTE.len_utf8();
        } else if !in_quotes && rest.starts_with(delimiter) {
            fields.push(&line[field_start..i]);
            i += delimiter.len();
            field_start = i;
        } else {
            i += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    fields.push(&line[field_start..]);
    fields
}

fn split_line<'a>(line: &'a str, delimiter: &str, header_count: usize) -> Vec<&'a str> {
    if has_balanced_quotes(line) {
        let fields = quote_aware_split(line, delimiter);
        if fields.len() == header_count {
            return fields;
        }
    }
    line.split(delimiter).collect()
}

/// Strip embedded quotes (replaced by a space), surrounding whitespace, and a
/// single leading/trailing apostrophe.
fn clean_field(value: &str) -> String {
    let mut value = value.replace(QUOTE, " ");
    value = value.trim().to_string();
    if let Some(stripped) = value.strip_prefix('\'') {
        value = stripped.to_string();
    }
    if let Some(stripped) = value.strip_suffix('\'') {
        value = stripped.to_string();
    }
    value.trim().to_string()
}

/// Parse one logical line into an [`InputRecord`] using the detected header.
/// Fields beyond the shorter of header and line are dropped; absent fields
/// stay empty.
#[must_use]
pub fn parse_record(headers: &[String], line: &str, delimiter: &str) -> InputRecord {
    let values = split_line(line, delimiter, headers.len());
    let mut record = InputRecord::default();
    for (header, value) in headers.iter().zip(values) {
        let cleaned = clean_field(value);
        match header.as_str() {
            "input1" => record.input1 = cleaned,
            "input2" => record.input2 = cleaned,
            "input3" => record.input3 = cleaned,
            _ => {}
        }
    }
    record
}

/// Header row of the output CSV, joined by the job delimiter.
#[must_use]
pub fn output_csv_header(delimiter: &str) -> String {
    OUTPUT_COLUMNS.join(delimiter)
}

fn wrap_if_contains_delimiter(value: &str, delimiter: &str) -> String {
    if !value.is_empty() && value.contains(delimiter) {
        format!("{QUOTE}{value}{QUOTE}")
    } else {
        value.to_string()
    }
}

/// Render one enriched record as a delimiter-joined CSV row, updating the
/// chunk's report accumulator. Absent fields render empty; any field
/// containing the delimiter is wrapped in double quotes.
#[must_use]
pub fn render_output_row(
    record: &EnrichedRecord,
    delimiter: &str,
    report_data: &mut ReportData,
) -> String {
    let input = record.input.clone().unwrap_or_default();
    let fields = [
        record.name.as_deref().unwrap_or(""),
        record.email.as_deref().unwrap_or(""),
        record.address.as_deref().unwrap_or(""),
        &input.input1,
        &input.input2,
        &input.input3,
        record.error.as_deref().unwrap_or(""),
    ];
    report_data.add_record();
    if record.name.as_deref().is_some_and(|name| !name.is_empty()) {
        report_data.add_name();
    }
    fields
        .iter()
        .map(|field| wrap_if_contains_delimiter(field, delimiter))
        .collect::<Vec<_>>()
        .join(delimiter)
}
