use std::path::PathBuf;

use thiserror::Error;

/// A snapshot table that cannot be used at all.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Table {table:?} is missing required column {column:?}")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error("Could not open {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not read table {table:?}")]
    Csv {
        table: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("Malformed row {row} in table {table:?}")]
    Record {
        table: &'static str,
        row: u64,
        #[source]
        source: csv::Error,
    },
}
