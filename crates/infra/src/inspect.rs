//! Row and column counting for uploaded delimited text.
//!
//! The header record is excluded from the row count, blank lines are ignored,
//! and quoted fields may contain delimiters, escaped quotes (`""`) and
//! newlines.

use thiserror::Error;

use datastory_jobs::DatasetFormat;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InspectError {
    #[error("file is not valid UTF-8 text")]
    NotUtf8,

    #[error("file has no header row")]
    MissingHeader,

    #[error("file ends inside a quoted field")]
    UnterminatedQuote,
}

/// Shape of a dataset as captured at admission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetShape {
    /// Data records, header excluded.
    pub rows: u64,
    /// Fields in the header record.
    pub columns: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct DatasetInspector {
    delimiter: char,
}

impl DatasetInspector {
    pub fn new(format: DatasetFormat) -> Self {
        Self {
            delimiter: char::from(format.delimiter()),
        }
    }

    pub fn inspect(&self, bytes: &[u8]) -> Result<DatasetShape, InspectError> {
        let text = std::str::from_utf8(bytes).map_err(|_| InspectError::NotUtf8)?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut records = RecordCounter::default();
        let mut in_quotes = false;
        let mut fields = 1u64;
        let mut has_content = false;

        for ch in text.chars() {
            match ch {
                '"' => {
                    in_quotes = !in_quotes;
                    has_content = true;
                }
                '\n' if !in_quotes => {
                    records.push(fields, has_content);
                    fields = 1;
                    has_content = false;
                }
                c if c == self.delimiter && !in_quotes => {
                    fields += 1;
                    has_content = true;
                }
                c if c.is_whitespace() => {}
                _ => has_content = true,
            }
        }

        if in_quotes {
            return Err(InspectError::UnterminatedQuote);
        }
        records.push(fields, has_content);

        let columns = records.header.ok_or(InspectError::MissingHeader)?;
        Ok(DatasetShape {
            rows: records.rows,
            columns,
        })
    }
}

#[derive(Default)]
struct RecordCounter {
    header: Option<u64>,
    rows: u64,
}

impl RecordCounter {
    fn push(&mut self, fields: u64, has_content: bool) {
        if !has_content {
            return;
        }
        match self.header {
            None => self.header = Some(fields),
            Some(_) => self.rows += 1,
        }
    }
}
