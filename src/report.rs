//! Job summary report: counters and the fixed-width rendering.
//!
//! The report accumulator travels with every chunk result and merges into a
//! job-level total, but the merge only takes effect when the job asked for a
//! report. The rendered document is a fixed-width columnar form: free-text
//! fields are word-wrapped into fixed-width slots, scalar fields are padded
//! or truncated to an exact width before substitution.

use crate::config::ReportConfig;
use crate::model::ReportDetail;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::macros::format_description;

/// Additive record counters accumulated while rendering output rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportData {
    pub records: u64,
    pub total_names: u64,
}

impl ReportData {
    pub fn add_record(&mut self) {
        self.records += 1;
    }

    pub fn add_name(&mut self) {
        self.total_names += 1;
    }

    /// Fold another accumulator into this one. A no-op unless the job
    /// requested a report.
    pub fn merge(&mut self, other: &Self, report_requested: bool) {
        if report_requested {
            self.records += other.records;
            self.total_names += other.total_names;
        }
    }
}

/// Width of the processor-name slots in the report form.
const NAME_SLOT_WIDTH: usize = 24;
/// Width of the mailing-address slots in the report form.
const ADDRESS_SLOT_WIDTH: usize = 36;

/// Pad (or truncate) to an exact character width. `left` pads on the left.
#[must_use]
pub fn fixed_width(input: &str, width: usize, left: bool) -> String {
    let count = input.chars().count();
    if count >= width {
        return input.chars().take(width).collect();
    }
    if left {
        format!("{input:>width$}")
    } else {
        format!("{input:<width$}")
    }
}

/// Word-wrap into pieces of at most `width` characters, breaking at spaces
/// when possible and hard-cutting otherwise.
#[must_use]
pub fn wrap_words(input: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut result = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + width).min(chars.len());
        while end < chars.len() && chars[end] != ' ' && end > start {
            end -= 1;
        }
        if end == start {
            end = (start + width).min(chars.len());
        }
        let piece: String = chars[start..end].iter().collect();
        result.push(piece.trim().to_string());
        start = end;
        while start < chars.len() && chars[start] == ' ' {
            start += 1;
        }
    }
    result
}

fn slot(lines: &[String], index: usize, width: usize) -> String {
    fixed_width(lines.get(index).map_or("", String::as_str), width, false)
}

/// Render the fixed-width summary document.
#[must_use]
pub fn render_report(
    report_data: &ReportData,
    report_detail: Option<&ReportDetail>,
    config: &ReportConfig,
) -> String {
    let date_format = format_description!("[month]/[day]/[year]");
    let current_date = OffsetDateTime::now_utc()
        .date()
        .format(&date_format)
        .unwrap_or_default();

    let detail_field = |f: fn(&ReportDetail) -> &String| -> String {
        report_detail.map(f).cloned().unwrap_or_default()
    };
    let name_lines = wrap_words(&detail_field(|d| &d.name), NAME_SLOT_WIDTH);
    let address_lines = wrap_words(&detail_field(|d| &d.address), ADDRESS_SLOT_WIDTH);

    format!(
        " Summary Report\n\
         +-----------------------------------------------------------------------------+\n\
         |A. Software                                                                  |\n\
         |-----------------------------------------------------------------------------|\n\
         |1. Vendor                   |2. Software                  |3. Configuration  |\n\
         |   Name                     |   Name/Version              |                  |\n\
         |                            |                             |                  |\n\
         |   {} |   {} |   STANDARD        |\n\
         |                            |   {} |                   |\n\
         |-----------------------------------------------------------------------------|\n\
         |B. Processing                                                                |\n\
         |-----------------------------------------------------------------------------|\n\
         |1. Processor's Name         |2. Date Processed   |3. Records Processed       |\n\
         |                            |                    |                           |\n\
         |   {} |   {}       |   {}        |\n\
         |   {} |                    |                           |\n\
         |   {} |                    |                           |\n\
         |-----------------------------------------------------------------------------|\n\
         |C. Contact                                                                   |\n\
         |-----------------------------------------------------------------------------|\n\
         |1. Email                    |2. Ext|                                         |\n\
         |   {}  |   {} |                                         |\n\
         |-----------------------------------------------------------------------------|\n\
         |D. Mailer                                                                    |\n\
         |-----------------------------------------------------------------------------|\n\
         |I certify that the output submitted   |3. Name and Address of Mailer         |\n\
         |with this form was produced from the  | {} |\n\
         |records listed above using the        | {} |\n\
         |software identified in Section A.     | {} |\n\
         |                                      | {} |\n\
         |--------------------------------------| {} |\n\
         |1. Mailer's Signature  |2. Date Signed| {} |\n\
         |                       |              | {} |\n\
         |                       |              | {} |\n\
         +-----------------------------------------------------------------------------+\n",
        fixed_width(&config.vendor_name, NAME_SLOT_WIDTH, false),
        fixed_width(&config.software_name, NAME_SLOT_WIDTH, false),
        fixed_width(&config.software_version, NAME_SLOT_WIDTH, false),
        slot(&name_lines, 0, NAME_SLOT_WIDTH),
        current_date,
        fixed_width(&report_data.records.to_string(), 16, false),
        slot(&name_lines, 1, NAME_SLOT_WIDTH),
        slot(&name_lines, 2, NAME_SLOT_WIDTH),
        fixed_width(&detail_field(|d| &d.email), 23, false),
        fixed_width(&detail_field(|d| &d.phone_number), 2, false),
        slot(&address_lines, 0, ADDRESS_SLOT_WIDTH),
        slot(&address_lines, 1, ADDRESS_SLOT_WIDTH),
        slot(&address_lines, 2, ADDRESS_SLOT_WIDTH),
        slot(&address_lines, 3, ADDRESS_SLOT_WIDTH),
        slot(&address_lines, 4, ADDRESS_SLOT_WIDTH),
        slot(&address_lines, 5, ADDRESS_SLOT_WIDTH),
        slot(&address_lines, 6, ADDRESS_SLOT_WIDTH),
        slot(&address_lines, 7, ADDRESS_SLOT_WIDTH),
    )
}
