//! Streaming line reassembly over a ranged byte stream.
//!
//! The submission path reads a chunk's byte range through a buffered window
//! and must restore logical lines that straddle window boundaries. The
//! assembler buffers bytes until a `\n`, strips the terminator, and tracks a
//! running byte cursor so it can stop emitting once the cursor passes the
//! chunk's end offset — the over-read tail belongs to the next chunk.

use crate::error::BulkResult;
use std::io::Read;

const WINDOW_SIZE: usize = 8 * 1024;

/// Iterator of logical lines over a byte range of the source object.
///
/// The cursor starts at the range's first byte offset and advances by the raw
/// byte length of every emitted line (terminator included). Iteration ends
/// when a line's trailing terminator lands on or past `end_offset`, or at end
/// of stream, whichever comes first. A trailing unterminated line is emitted.
pub struct LineAssembler<R: Read> {
    reader: R,
    window: [u8; WINDOW_SIZE],
    filled: usize,
    pos: usize,
    line_buf: Vec<u8>,
    cursor: u64,
    end_offset: u64,
    done: bool,
}

impl<R: Read> LineAssembler<R> {
    pub fn new(reader: R, start_cursor: u64, end_offset: u64) -> Self {
        Self {
            reader,
            window: [0; WINDOW_SIZE],
            filled: 0,
            pos: 0,
            line_buf: Vec::new(),
            cursor: start_cursor,
            end_offset,
            done: false,
        }
    }

    /// Byte offset just past the last consumed line.
    #[must_use]
    pub const fn cursor(&self) -> u64 {
        self.cursor
    }

    fn emit(&mut self) -> String {
        let raw_len = self.line_buf.len() as u64;
        let mut end = self.line_buf.len();
        if end >= 1 && self.line_buf[end - 1] == b'\n' {
            end -= 1;
        }
        if end >= 1 && self.line_buf[end - 1] == b'\r' {
            end -= 1;
        }
        let line = String::from_utf8_lossy(&self.line_buf[..end]).into_owned();
        self.cursor += raw_len;
        self.line_buf.clear();
        line
    }
}

impl<R: Read> Iterator for LineAssembler<R> {
    type Item = BulkResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if self.pos == self.filled {
                match self.reader.read(&mut self.window) {
                    Ok(0) => {
                        self.done = true;
                        if self.line_buf.is_empty() {
                            return None;
                        }
                        return Some(Ok(self.emit()));
                    }
                    Ok(n) => {
                        self.filled = n;
                        self.pos = 0;
                    }
                    Err(err) => {
                        self.done = true;
                        return Some(Err(err.into()));
                    }
                }
            }
            while self.pos < self.filled {
                let b = self.window[self.pos];
                self.pos += 1;
                self.line_buf.push(b);
                if b == b'\n' {
                    let line = self.emit();
                    if self.cursor - 1 >= self.end_offset {
                        self.done = true;
                    }
                    return Some(Ok(line));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect(data: &[u8], start: u64, end: u64) -> Vec<String> {
        LineAssembler::new(Cursor::new(data.to_vec()), start, end)
            .map(|line| line.unwrap())
            .collect()
    }

    #[test]
    fn reassembles_lines_across_window_boundaries() {
        // Lines longer than the read window still come out whole.
        let long = "x".repeat(3 * WINDOW_SIZE);
        let data = format!("{long}\nshort\n");
        let lines = collect(data.as_bytes(), 0, data.len() as u64);
        assert_eq!(lines, vec![long, "short".to_string()]);
    }

    #[test]
    fn strips_crlf_and_lf_terminators() {
        let lines = collect(b"a\r\nb\nc", 0, 100);
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn stops_once_cursor_passes_end_offset() {
        // Each line is 2 raw bytes; with end at 3 the second line's
        // terminator crosses it, so the third never emits.
        let lines = collect(b"a\nb\nc\nd\n", 0, 3);
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn emits_unterminated_tail_at_eof() {
        let lines = collect(b"a\ntail", 0, 100);
        assert_eq!(lines, vec!["a", "tail"]);
    }

    #[test]
    fn cursor_advances_by_raw_line_length() {
        let mut assembler = LineAssembler::new(Cursor::new(b"ab\r\ncd\n".to_vec()), 10, 100);
        assert_eq!(assembler.next().unwrap().unwrap(), "ab");
        assert_eq!(assembler.cursor(), 14);
        assert_eq!(assembler.next().unwrap().unwrap(), "cd");
        assert_eq!(assembler.cursor(), 17);
    }
}
