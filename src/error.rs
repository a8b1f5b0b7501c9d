//! Error types for u-assoc.

use std::fmt;

/// All errors produced by u-assoc operations.
#[derive(Debug, Clone, PartialEq)]
pub enum AssocError {
    /// CSV parsing failed.
    CsvParse { line: usize, message: String },
    /// Column not found in the dataset.
    ColumnNotFound { name: String },
    /// A column has the wrong kind for the requested operation.
    WrongKind { column: String, expected: &'static str },
    /// Insufficient data for the requested operation.
    InsufficientData { min_required: usize, actual: usize },
    /// Dimension mismatch.
    DimensionMismatch { expected: usize, actual: usize },
    /// A persisted record could not be interpreted.
    InvalidRecord { line: usize, message: String },
    /// A test statistic could not be computed.
    Degenerate { test: String, message: String },
    /// I/O error during file reading or writing.
    Io(String),
    /// CSV (de)serialization error for persisted stage results.
    Csv(String),
}

impl fmt::Display for AssocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CsvParse { line, message } => {
                write!(f, "CSV parse error at line {line}: {message}")
            }
            Self::ColumnNotFound { name } => {
                write!(f, "column '{name}' not found")
            }
            Self::WrongKind { column, expected } => {
                write!(f, "column '{column}' is not {expected}")
            }
            Self::InsufficientData {
                min_required,
                actual,
            } => {
                write!(f, "need more than {min_required} rows, got {actual}")
            }
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "expected {expected} elements, got {actual}")
            }
            Self::InvalidRecord { line, message } => {
                write!(f, "invalid record at line {line}: {message}")
            }
            Self::Degenerate { test, message } => {
                write!(f, "{test} could not be computed: {message}")
            }
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
        }
    }
}

impl std::error::Error for AssocError {}

impl From<std::io::Error> for AssocError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<csv::Error> for AssocError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e.to_string())
    }
}
