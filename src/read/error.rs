use std::path::PathBuf;

use thiserror::Error;

use crate::datastore::DataStoreError;

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Invalid file pattern '{pattern}': {err}")]
    Glob {
        pattern: String,
        err: glob::PatternError,
    },

    #[error("No files matching '{pattern}' were found in {}", dir.display())]
    NoFiles { dir: PathBuf, pattern: String },

    #[error("Couldn't read {}: {err}", path.display())]
    Io {
        path: PathBuf,
        err: std::io::Error,
    },

    #[error("{} is not valid XML: {err}", path.display())]
    Xml {
        path: PathBuf,
        err: roxmltree::Error,
    },

    #[error("{} is missing '{tag}'", path.display())]
    MissingTag { path: PathBuf, tag: &'static str },

    #[error("{} doesn't contain a table of measurements", path.display())]
    MissingDataTable { path: PathBuf },

    #[error("{}: couldn't parse '{value}' as a number (row {row})", path.display())]
    BadNumber {
        path: PathBuf,
        row: usize,
        value: String,
    },

    #[error("{}: row {row} has {got} values, but there are {expected} columns", path.display())]
    BadRow {
        path: PathBuf,
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("{} has columns {got:?}, but the first file has {expected:?}", path.display())]
    InconsistentColumns {
        path: PathBuf,
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("The cable positions of {} differ from those of the first file", path.display())]
    XMismatch { path: PathBuf },

    #[error("{}: couldn't parse '{value}' as a timestamp", path.display())]
    BadTimestamp { path: PathBuf, value: String },

    #[error("'{0}' is not a timezone; use UTC, an offset like +01:00 or a name like Europe/Paris")]
    BadTimezone(String),

    #[error(transparent)]
    DataStore(#[from] DataStoreError),
}
