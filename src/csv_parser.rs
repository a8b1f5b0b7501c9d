//! Dataset loading from delimited text.
//!
//! Reads CSV input with [`csv::Reader`] into raw string columns and hands
//! them to [`Dataset::from_raw_columns`] for classification.
//!
//! - RFC 4180 quoting (escaped quotes, delimiters and newlines inside quotes)
//! - LF, CRLF and lone CR line endings; a leading UTF-8 BOM is dropped
//! - Files that are not valid UTF-8 are decoded as ISO-8859-1
//!
//! # Example
//!
//! ```
//! use u_assoc::csv_parser::CsvParser;
//! use u_assoc::dataset::VariableKind;
//!
//! let csv = "strain_id,source_CAT,growth\nS1,gut,0.4\nS2,soil,1.2\n";
//! let ds = CsvParser::new().parse_str(csv).unwrap();
//! assert_eq!(ds.row_count(), 2);
//! assert_eq!(ds.variable("source_CAT").unwrap().kind(), VariableKind::Categorical);
//! assert_eq!(ds.variable("growth").unwrap().kind(), VariableKind::Numerical);
//! ```

use crate::dataset::{ColumnRules, Dataset};
use crate::error::AssocError;
use std::path::Path;

/// CSV parser configuration and entry point.
#[derive(Debug, Clone)]
pub struct CsvParser {
    delimiter: u8,
    has_header: bool,
    rules: ColumnRules,
}

impl CsvParser {
    /// Creates a parser with comma delimiter, header row and default [`ColumnRules`].
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            rules: ColumnRules::default(),
        }
    }

    /// Sets the field delimiter (default: comma).
    pub fn delimiter(mut self, delim: u8) -> Self {
        self.delimiter = delim;
        self
    }

    /// Sets whether the first row is a header (default: true).
    pub fn has_header(mut self, header: bool) -> Self {
        self.has_header = header;
        self
    }

    /// Sets the column classification rules.
    pub fn rules(mut self, rules: ColumnRules) -> Self {
        self.rules = rules;
        self
    }

    /// Parses CSV text into a classified dataset.
    pub fn parse_str(&self, input: &str) -> Result<Dataset, AssocError> {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);

        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_header)
            .flexible(false)
            .from_reader(input.as_bytes());

        let mut headers: Vec<String> = if self.has_header {
            rdr.headers()
                .map_err(parse_error)?
                .iter()
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };

        let mut columns: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in rdr.records() {
            let record = record.map_err(parse_error)?;
            if headers.is_empty() && !self.has_header {
                headers = (0..record.len()).map(|i| format!("col_{i}")).collect();
                columns = vec![Vec::new(); headers.len()];
            }
            for (col, field) in columns.iter_mut().zip(record.iter()) {
                col.push(field.to_string());
            }
        }

        if headers.is_empty() {
            return Ok(Dataset::new());
        }
        Dataset::from_raw_columns(headers, columns, &self.rules)
    }

    /// Reads and parses a CSV file.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Dataset, AssocError> {
        let bytes = std::fs::read(path)?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
        };
        self.parse_str(&text)
    }
}

/// Maps a reader error to [`AssocError::CsvParse`] with the record's line.
fn parse_error(err: csv::Error) -> AssocError {
    let line = err.position().map_or(0, |p| p.line() as usize);
    let message = match err.kind() {
        csv::ErrorKind::UnequalLengths { expected_len, len, .. } => {
            format!("expected {expected_len} fields, got {len}")
        }
        _ => err.to_string(),
    };
    AssocError::CsvParse { line, message }
}

impl Default for CsvParser {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
