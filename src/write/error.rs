use std::path::PathBuf;

use hifitime::Epoch;
use thiserror::Error;

use crate::datastore::{DataStoreError, Dims};

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Couldn't write to {}: {err}", path.display())]
    Io {
        path: PathBuf,
        err: std::io::Error,
    },

    #[error("Couldn't serialise the datastore: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Couldn't serialise the sections: {0}")]
    Sections(#[from] serde_yaml::Error),

    #[error("The timestamp {0} can't be stored as nanoseconds since 1970")]
    TimeOutOfRange(Epoch),
}

#[derive(Error, Debug)]
pub enum OpenError {
    #[error("Couldn't read {}: {err}", path.display())]
    Io {
        path: PathBuf,
        err: std::io::Error,
    },

    #[error("{} isn't a valid datastore file: {err}", path.display())]
    Json {
        path: PathBuf,
        err: serde_json::Error,
    },

    #[error("Variable '{name}' has dims {dims} but shape {shape:?} with {num_values} values")]
    BadShape {
        name: String,
        dims: Dims,
        shape: Vec<usize>,
        num_values: usize,
    },

    #[error(transparent)]
    DataStore(#[from] DataStoreError),
}
