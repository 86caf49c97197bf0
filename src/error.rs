use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn an uploaded file into a [`Table`](crate::table::Table).
///
/// Every variant is reported back to the user; no partial table is ever kept.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("the uploaded file is empty")]
    Empty,

    #[error("{file_name} is not an .xlsx or .xls workbook")]
    UnrecognizedFormat { file_name: String },

    #[error("could not read workbook {file_name}: {reason}")]
    Workbook { file_name: String, reason: String },

    #[error("{file_name} contains no worksheets")]
    NoWorksheet { file_name: String },

    #[error("the first worksheet of {file_name} has no header row with occupation names")]
    MissingHeader { file_name: String },

    #[error("the year column needs at least two distinct numeric years, found {found}")]
    TooFewYears { found: usize },
}

/// An invalid selection against a loaded table.
///
/// The report shell clamps its controls so these never reach a user through
/// normal interaction; they exist for hand-built requests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("start year {start} must be before end year {end}")]
    Inverted { start: i64, end: i64 },

    #[error("unknown occupation: {0}")]
    UnknownColumn(String),

    #[error("the table has no numeric years")]
    NoYears,
}

/// The reflection store could not be read or written.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("reflection store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("reflection store {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bind address {value:?}: {source}")]
    Address {
        value: String,
        source: std::net::AddrParseError,
    },

    #[error("unexpected argument {0:?}; usage: website [ADDR] [STORE_PATH]")]
    UnexpectedArgument(String),
}
