//! CSV reading for the staging layer
//!
//! Minimal RFC-4180 reader: first row is the header, fields may be quoted
//! with embedded separators, newlines, and doubled quotes. Everything is
//! read as text; type coercion happens server-side in the load procedures.

use std::path::{Path, PathBuf};

/// Error type for CSV handling
#[derive(Debug, thiserror::Error)]
pub enum CsvError {
    #[error("Failed to read {path}: {message}")]
    ReadError { path: PathBuf, message: String },

    #[error("{path} is empty (no header row)")]
    EmptyFile { path: PathBuf },

    #[error("{path} is missing required columns: {}", .columns.join(", "))]
    MissingColumns { path: PathBuf, columns: Vec<String> },
}

/// A parsed CSV file: header plus data rows, all text
#[derive(Debug, Clone)]
pub struct CsvTable {
    pub path: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Read and parse a UTF-8 CSV file
    pub fn read(path: impl AsRef<Path>) -> Result<Self, CsvError> {
        let path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&path).map_err(|e| CsvError::ReadError {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let mut records = parse_records(&content);
        if records.is_empty() {
            return Err(CsvError::EmptyFile { path });
        }

        let headers = records.remove(0);
        Ok(Self {
            path,
            headers,
            rows: records,
        })
    }

    /// Project rows down to the given columns, in allowlist order
    ///
    /// Extra CSV columns are ignored. A missing required column is an error
    /// naming every absent column. Short rows pad with empty strings; values
    /// are never turned into a null marker.
    pub fn project(&self, allowlist: &[String]) -> Result<Vec<Vec<String>>, CsvError> {
        let mut indices = Vec::with_capacity(allowlist.len());
        let mut missing = Vec::new();

        for wanted in allowlist {
            match self.headers.iter().position(|h| h.trim() == wanted) {
                Some(idx) => indices.push(idx),
                None => missing.push(wanted.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(CsvError::MissingColumns {
                path: self.path.clone(),
                columns: missing,
            });
        }

        let projected = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|&idx| row.get(idx).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        Ok(projected)
    }
}

/// Parse CSV text into records of fields
fn parse_records(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut saw_any = false;

    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        field.push('"');
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_quotes = true;
                saw_any = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                saw_any = true;
            }
            '\r' => {
                // Bare CR or part of CRLF; the newline branch finishes the record
                if chars.peek() == Some(&'\n') {
                    continue;
                }
                finish_record(&mut records, &mut record, &mut field, &mut saw_any);
            }
            '\n' => finish_record(&mut records, &mut record, &mut field, &mut saw_any),
            _ => {
                field.push(c);
                saw_any = true;
            }
        }
    }

    finish_record(&mut records, &mut record, &mut field, &mut saw_any);
    records
}

fn finish_record(
    records: &mut Vec<Vec<String>>,
    record: &mut Vec<String>,
    field: &mut String,
    saw_any: &mut bool,
) {
    if *saw_any || !record.is_empty() {
        record.push(std::mem::take(field));
        records.push(std::mem::take(record));
    }
    field.clear();
    *saw_any = false;
}
