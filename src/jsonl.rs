//! JSONL record loader.
//!
//! Reads one JSON object per line and stamps it with an `entry_id`:
//!
//! ```text
//! {task}-{benchmark}-{model}-{language}-{NNNN}
//! ```
//!
//! Task, benchmark and model are lowercased; the language is kept as given.
//! `NNNN` is the 1-based line number, zero-padded to four digits. Lines that
//! are blank or do not parse as a JSON object are skipped but still consume
//! their line number, so an edit to one line never shifts the IDs of the
//! others.

use serde_json::{Map, Value};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::resolver::Selector;

pub type Record = Map<String, Value>;

/// Common prefix of every entry ID in one file.
pub fn entry_prefix(sel: &Selector) -> String {
    format!(
        "{}-{}-{}-{}",
        sel.task.to_lowercase(),
        sel.benchmark.to_lowercase(),
        sel.model.to_lowercase(),
        sel.language
    )
}

pub fn entry_id(prefix: &str, line_no: usize) -> String {
    format!("{}-{:04}", prefix, line_no)
}

/// Lazy iterator over the records of one JSONL stream.
///
/// Yields `Err` only for I/O failures. Not restartable; open the file again
/// to re-read it.
pub struct JsonlRecords<R> {
    reader: R,
    prefix: String,
    line_no: usize,
    skipped: usize,
    buf: Vec<u8>,
}

impl<R: BufRead> JsonlRecords<R> {
    pub fn new(reader: R, sel: &Selector) -> Self {
        Self {
            reader,
            prefix: entry_prefix(sel),
            line_no: 0,
            skipped: 0,
            buf: Vec::new(),
        }
    }

    /// Lines dropped so far because they were blank or not a JSON object.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for JsonlRecords<R> {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
            self.line_no += 1;

            let line = trim_line_end(&self.buf);
            if line.iter().all(u8::is_ascii_whitespace) {
                self.skipped += 1;
                continue;
            }

            match serde_json::from_slice::<Value>(line) {
                Ok(Value::Object(mut record)) => {
                    record.insert(
                        "entry_id".to_string(),
                        Value::String(entry_id(&self.prefix, self.line_no)),
                    );
                    return Some(Ok(record));
                }
                Ok(_) | Err(_) => {
                    tracing::debug!(line = self.line_no, "skipping malformed JSONL line");
                    self.skipped += 1;
                }
            }
        }
    }
}

fn trim_line_end(buf: &[u8]) -> &[u8] {
    let mut end = buf.len();
    while end > 0 && (buf[end - 1] == b'\n' || buf[end - 1] == b'\r') {
        end -= 1;
    }
    &buf[..end]
}

pub fn open_records(path: &Path, sel: &Selector) -> io::Result<JsonlRecords<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(JsonlRecords::new(BufReader::new(file), sel))
}

/// Read every record of `path` in file order.
pub fn load_records(path: &Path, sel: &Selector) -> io::Result<Vec<Record>> {
    let mut records = open_records(path, sel)?;
    let out = records.by_ref().collect::<io::Result<Vec<_>>>()?;
    tracing::debug!(
        path = %path.display(),
        records = out.len(),
        skipped = records.skipped(),
        "loaded JSONL file"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sel() -> Selector {
        Selector {
            task: "Classification".to_string(),
            benchmark: "SIB-200".to_string(),
            model: "gpt4".to_string(),
            language: "en".to_string(),
        }
    }

    fn ids(input: &str) -> Vec<String> {
        JsonlRecords::new(Cursor::new(input.as_bytes().to_vec()), &sel())
            .map(|r| r.unwrap()["entry_id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_entry_ids_lowercased_and_padded() {
        let got = ids("{\"x\": 1}\n{\"x\": 2}\n");
        assert_eq!(
            got,
            vec![
                "classification-sib-200-gpt4-en-0001",
                "classification-sib-200-gpt4-en-0002"
            ]
        );
    }

    #[test]
    fn test_malformed_line_keeps_line_positions() {
        let input = "{\"n\":1}\n{\"n\":2}\n{not json\n{\"n\":4}\n{\"n\":5}\n";
        let got = ids(input);
        assert_eq!(got.len(), 4);
        assert!(got[2].ends_with("-0004"));
        assert!(got[3].ends_with("-0005"));
    }

    #[test]
    fn test_non_objects_and_blank_lines_skipped() {
        let input = "[1,2]\n\n42\n{\"ok\":true}\r\n";
        let mut records = JsonlRecords::new(Cursor::new(input.as_bytes().to_vec()), &sel());
        let all: Vec<Record> = records.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0]["ok"], Value::Bool(true));
        assert_eq!(all[0]["entry_id"], "classification-sib-200-gpt4-en-0004");
        assert_eq!(records.skipped(), 3);
    }

    #[test]
    fn test_invalid_utf8_is_skipped() {
        let mut input = b"{\"a\":1}\n".to_vec();
        input.extend_from_slice(&[0xff, 0xfe, b'\n']);
        input.extend_from_slice(b"{\"a\":3}");
        let got: Vec<Record> = JsonlRecords::new(Cursor::new(input), &sel())
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(got.len(), 2);
        assert_eq!(got[1]["entry_id"], "classification-sib-200-gpt4-en-0003");
    }

    #[test]
    fn test_existing_entry_id_overwritten() {
        let got = ids("{\"entry_id\": \"stale\"}\n");
        assert_eq!(got, vec!["classification-sib-200-gpt4-en-0001"]);
    }

    #[test]
    fn test_wide_index_not_truncated() {
        assert_eq!(entry_id("p", 12345), "p-12345");
    }
}
