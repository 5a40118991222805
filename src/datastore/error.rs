//! Errors that can occur when building or transforming a [`super::DataStore`].

use thiserror::Error;

use super::Dims;

#[derive(Error, Debug)]
pub enum DataStoreError {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("No candidate shifts were supplied; at least one is required")]
    EmptyRange,

    #[error("The resampling period must be positive, but got {0}")]
    BadResamplePeriod(hifitime::Duration),

    #[error("Couldn't (de)serialise the sections: {0}")]
    Serialization(#[from] serde_yaml::Error),
}

/// An axis length or trim can't be satisfied.
#[derive(Error, Debug)]
pub enum ShapeError {
    #[error("The x coordinates aren't strictly increasing: x[{index}] = {value} follows {previous}")]
    XNotIncreasing {
        index: usize,
        previous: f64,
        value: f64,
    },

    #[error("Variable '{name}' has {got} elements along '{axis}', but the coordinate has {expected}")]
    AxisLength {
        name: String,
        axis: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("A shift of {shift} can't be applied to an x axis of length {nx}")]
    ShiftTooLarge { shift: i64, nx: usize },

    #[error("The x index range {start}..{end} is out of bounds for an x axis of length {nx}")]
    SliceOutOfBounds { start: usize, end: usize, nx: usize },

    #[error("The timestamps aren't sorted ascendingly")]
    TimesNotSorted,
}

/// An expected variable is missing or has the wrong layout.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Variable '{name}' doesn't exist")]
    Missing { name: String },

    #[error("Variable '{name}' is indexed by {got}, but {expected} was expected")]
    WrongDims {
        name: String,
        expected: Dims,
        got: Dims,
    },

    #[error("Variable '{name}' already exists")]
    Duplicate { name: String },

    #[error("'{name}' is a coordinate name and can't be used for a variable")]
    ReservedName { name: String },

    #[error("Section {start}..{end} of '{name}' ends before it starts")]
    InvalidSection { name: String, start: f64, end: f64 },
}
