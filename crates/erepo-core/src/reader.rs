//! # Record Reader
//!
//! Format-aware, single-pass reader over a record stream.
//!
//! The format is decided from the first non-blank line:
//! - `[`: one JSON array of objects
//! - `{`: JSON lines, one object per line; when the first line is not a
//!   complete object on its own, the whole stream is read as a sequence of
//!   (possibly pretty-printed) JSON objects
//! - anything else: delimited text whose header names `RECORD_ID`
//!
//! Delimited text uses `,`, tab or `|`, whichever occurs most in the header.
//! Fields may be quoted; a doubled quote inside quotes is a literal quote and
//! quoted fields may span lines. Empty cells are omitted from the record.
//!
//! The reader yields `Result<Record, RepoError>` and stops after the first
//! error, so end of stream and a malformed stream stay distinguishable.

use crate::primitives::RECORD_ID_FIELD;
use crate::types::RepoError;
use serde_json::Value;
use std::io::BufRead;

/// A record: a flat JSON object.
pub type Record = serde_json::Map<String, Value>;

const DELIMITERS: [char; 3] = [',', '\t', '|'];

/// Detected stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Delimited { delimiter: char },
    JsonLines,
    JsonArray,
}

impl RecordFormat {
    /// Decide the format from the first non-blank line.
    pub fn detect(first_line: &str) -> Result<Self, RepoError> {
        let line = clean_line(first_line);
        match line.trim_start().chars().next() {
            Some('[') => Ok(Self::JsonArray),
            Some('{') => Ok(Self::JsonLines),
            Some(_) => {
                let delimiter = detect_delimiter(line);
                let header = split_fields(line, delimiter).map_err(RepoError::UnsupportedFormat)?;
                if header.iter().any(|name| name.trim() == RECORD_ID_FIELD) {
                    Ok(Self::Delimited { delimiter })
                } else {
                    Err(RepoError::UnsupportedFormat(format!(
                        "delimited header does not name {}",
                        RECORD_ID_FIELD
                    )))
                }
            }
            None => Err(RepoError::UnsupportedFormat("empty header line".to_string())),
        }
    }

    #[must_use]
    pub fn is_json(self) -> bool {
        matches!(self, Self::JsonLines | Self::JsonArray)
    }
}

enum ReaderState {
    Empty,
    Delimited { delimiter: char, header: Vec<String> },
    JsonLines { pending: Option<String> },
    /// Whole-document JSON: one array when `array`, else a sequence of values.
    JsonDocument {
        pending: Option<String>,
        array: bool,
        records: std::vec::IntoIter<Value>,
    },
}

/// Iterator over the records of a stream.
pub struct RecordReader<R> {
    source: R,
    format: Option<RecordFormat>,
    state: ReaderState,
    /// Records yielded so far (1-based index of the last one).
    index: u64,
    done: bool,
}

impl<R> std::fmt::Debug for RecordReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordReader")
            .field("format", &self.format)
            .field("index", &self.index)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl<R: BufRead> RecordReader<R> {
    /// Read the first non-blank line and detect the format.
    ///
    /// An empty stream is accepted and yields no records.
    pub fn open(mut source: R) -> Result<Self, RepoError> {
        let Some(first) = read_non_blank(&mut source)? else {
            return Ok(Self {
                source,
                format: None,
                state: ReaderState::Empty,
                index: 0,
                done: true,
            });
        };

        let format = RecordFormat::detect(&first)?;
        let state = match format {
            RecordFormat::Delimited { delimiter } => ReaderState::Delimited {
                delimiter,
                header: split_fields(clean_line(&first), delimiter)
                    .map_err(RepoError::UnsupportedFormat)?
                    .into_iter()
                    .map(|name| name.trim().to_string())
                    .collect(),
            },
            RecordFormat::JsonLines if ends_mid_value(&first) => ReaderState::JsonDocument {
                pending: Some(first),
                array: false,
                records: Vec::new().into_iter(),
            },
            RecordFormat::JsonLines => ReaderState::JsonLines {
                pending: Some(first),
            },
            RecordFormat::JsonArray => ReaderState::JsonDocument {
                pending: Some(first),
                array: true,
                records: Vec::new().into_iter(),
            },
        };

        Ok(Self {
            source,
            format: Some(format),
            state,
            index: 0,
            done: false,
        })
    }

    /// The detected format, or `None` for an empty stream.
    pub fn format(&self) -> Option<RecordFormat> {
        self.format
    }

    fn read_record(&mut self) -> Result<Option<Record>, RepoError> {
        let index = self.index.saturating_add(1);
        let malformed = |detail: String| RepoError::MalformedRecord { index, detail };

        match &mut self.state {
            ReaderState::Empty => Ok(None),
            ReaderState::Delimited { delimiter, header } => {
                let Some(mut text) = read_non_blank(&mut self.source)? else {
                    return Ok(None);
                };
                let fields = loop {
                    match split_fields(clean_line(&text), *delimiter) {
                        Ok(fields) => break fields,
                        Err(detail) => {
                            let mut more = String::new();
                            let read = self
                                .source
                                .read_line(&mut more)
                                .map_err(|e| RepoError::io("read records", e))?;
                            if read == 0 {
                                return Err(malformed(detail));
                            }
                            text.push_str(&more);
                        }
                    }
                };
                if fields.len() != header.len() {
                    return Err(malformed(format!(
                        "expected {} fields, found {}",
                        header.len(),
                        fields.len()
                    )));
                }
                let record = header
                    .iter()
                    .zip(fields)
                    .filter(|(_, value)| !value.is_empty())
                    .map(|(name, value)| (name.clone(), Value::String(value)))
                    .collect();
                Ok(Some(record))
            }
            ReaderState::JsonLines { pending } => {
                let line = match pending.take() {
                    Some(line) => line,
                    None => match read_non_blank(&mut self.source)? {
                        Some(line) => line,
                        None => return Ok(None),
                    },
                };
                let value: Value = serde_json::from_str(line.trim())
                    .map_err(|e| malformed(e.to_string()))?;
                into_record(value).map(Some).map_err(malformed)
            }
            ReaderState::JsonDocument {
                pending,
                array,
                records,
            } => {
                if let Some(mut document) = pending.take() {
                    self.source
                        .read_to_string(&mut document)
                        .map_err(|e| RepoError::io("read records", e))?;
                    let text = document.trim_start_matches('\u{feff}');
                    let values: Result<Vec<Value>, serde_json::Error> = if *array {
                        serde_json::from_str(text)
                    } else {
                        serde_json::Deserializer::from_str(text)
                            .into_iter::<Value>()
                            .collect()
                    };
                    *records = values.map_err(|e| malformed(e.to_string()))?.into_iter();
                }
                match records.next() {
                    Some(value) => into_record(value).map(Some).map_err(malformed),
                    None => Ok(None),
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Record, RepoError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => {
                self.index = self.index.saturating_add(1);
                Some(Ok(record))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn into_record(value: Value) -> Result<Record, String> {
    match value {
        Value::Object(record) => Ok(record),
        other => Err(format!("expected a JSON object, found {}", kind(&other))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// True when the line is the unfinished start of a JSON value.
fn ends_mid_value(line: &str) -> bool {
    serde_json::from_str::<Value>(clean_line(line).trim()).is_err_and(|e| e.is_eof())
}

fn read_non_blank<R: BufRead>(source: &mut R) -> Result<Option<String>, RepoError> {
    let mut line = String::new();
    loop {
        line.clear();
        let read = source
            .read_line(&mut line)
            .map_err(|e| RepoError::io("read records", e))?;
        if read == 0 {
            return Ok(None);
        }
        if !clean_line(&line).trim().is_empty() {
            return Ok(Some(line));
        }
    }
}

/// Strip a byte order mark and the line terminator.
fn clean_line(line: &str) -> &str {
    line.trim_start_matches('\u{feff}')
        .trim_end_matches(['\r', '\n'])
}

/// The candidate delimiter occurring most often outside quotes (`,` on ties).
pub fn detect_delimiter(header: &str) -> char {
    let mut counts = [0usize; DELIMITERS.len()];
    let mut quoted = false;
    for c in header.chars() {
        if c == '"' {
            quoted = !quoted;
        } else if !quoted {
            if let Some(slot) = DELIMITERS.iter().position(|d| *d == c) {
                counts[slot] += 1;
            }
        }
    }
    let mut best = 0;
    for (slot, count) in counts.iter().enumerate() {
        if *count > counts[best] {
            best = slot;
        }
    }
    DELIMITERS[best]
}

/// Split one delimited line into fields.
///
/// Fails on an unterminated quoted field.
pub fn split_fields(line: &str, delimiter: char) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut started = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if quoted {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    quoted = false;
                }
            } else {
                field.push(c);
            }
        } else if c == delimiter {
            fields.push(std::mem::take(&mut field));
            started = false;
        } else if c == '"' && !started {
            quoted = true;
            started = true;
        } else {
            field.push(c);
            started = true;
        }
    }

    if quoted {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(field);
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(input: &str) -> Vec<Result<Record, RepoError>> {
        RecordReader::open(Cursor::new(input.to_string()))
            .expect("open")
            .collect()
    }

    #[test]
    fn detect_formats() {
        assert_eq!(RecordFormat::detect("[").expect("array"), RecordFormat::JsonArray);
        assert_eq!(
            RecordFormat::detect("{\"RECORD_ID\":\"1\"}").expect("lines"),
            RecordFormat::JsonLines
        );
        assert_eq!(
            RecordFormat::detect("RECORD_ID\tNAME\n").expect("tsv"),
            RecordFormat::Delimited { delimiter: '\t' }
        );
        assert!(matches!(
            RecordFormat::detect("NAME,ADDRESS"),
            Err(RepoError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn csv_with_quotes_and_empty_cells() {
        let records = read_all("RECORD_ID,NAME,PHONE\n1,\"Smith, \"\"Bob\"\"\",\n2,Ann,555\n");
        assert_eq!(records.len(), 2);
        let first = records[0].as_ref().expect("first");
        assert_eq!(first["NAME"], Value::String("Smith, \"Bob\"".into()));
        assert!(!first.contains_key("PHONE"));
    }

    #[test]
    fn quoted_field_may_span_lines() {
        let records = read_all("RECORD_ID|NOTE\n1|\"two\nlines\"\n");
        let record = records[0].as_ref().expect("record");
        assert_eq!(record["NOTE"], Value::String("two\nlines".into()));
    }

    #[test]
    fn csv_field_count_mismatch_is_malformed_and_stops() {
        let records = read_all("RECORD_ID,NAME\n1,A\n2\n3,C\n");
        assert_eq!(records.len(), 2);
        assert!(records[0].is_ok());
        assert!(matches!(records[1], Err(RepoError::MalformedRecord { index: 2, .. })));
    }

    #[test]
    fn json_lines_skip_blank_lines() {
        let records = read_all("{\"RECORD_ID\":\"1\"}\n\n{\"RECORD_ID\":\"2\"}\n");
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(Result::is_ok));
    }

    #[test]
    fn json_array_yields_each_object() {
        let records = read_all("[\n{\"RECORD_ID\":1},\n{\"RECORD_ID\":2}\n]\n");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn pretty_printed_objects_are_read_as_one_document() {
        let records = read_all(
            "{\n  \"RECORD_ID\": \"1\",\n  \"NAME\": \"Ann\"\n}\n{\n  \"RECORD_ID\": \"2\"\n}\n",
        );
        assert_eq!(records.len(), 2);
        let first = records[0].as_ref().expect("first");
        assert_eq!(first["NAME"], Value::String("Ann".into()));
        assert!(records[1].is_ok());
    }

    #[test]
    fn truncated_pretty_printed_object_is_malformed() {
        let records = read_all("{\n  \"RECORD_ID\": \"1\"\n");
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], Err(RepoError::MalformedRecord { index: 1, .. })));
    }

    #[test]
    fn invalid_json_line_is_malformed() {
        let records = read_all("{\"RECORD_ID\":\"1\"}\n{not json}\n");
        assert_eq!(records.len(), 2);
        assert!(matches!(records[1], Err(RepoError::MalformedRecord { index: 2, .. })));
    }

    #[test]
    fn json_scalar_is_malformed() {
        let records = read_all("[{\"RECORD_ID\":1}, 7]");
        assert!(records[0].is_ok());
        assert!(matches!(
            &records[1],
            Err(RepoError::MalformedRecord { detail, .. }) if detail.contains("a number")
        ));
    }

    #[test]
    fn empty_stream_has_no_format() {
        let reader = RecordReader::open(Cursor::new("\n\n")).expect("open");
        assert_eq!(reader.format(), None);
        assert_eq!(reader.count(), 0);
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let records = read_all("\u{feff}RECORD_ID,NAME\n1,A\n");
        let record = records[0].as_ref().expect("record");
        assert!(record.contains_key(RECORD_ID_FIELD));
    }
}
