//! Saving a [`DataStore`] to disk and opening it again.
//!
//! The file is JSON. Times are stored as nanoseconds since 1970-01-01 UTC,
//! missing values (NaN) as `null` and infinities as `"inf"` or `"-inf"`. The
//! sections are stored as a YAML string under `_sections`, which is the YAML
//! `null` document when there aren't any.

mod error;
#[cfg(test)]
mod tests;

pub use error::{OpenError, WriteError};

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use hifitime::{Duration, Epoch};
use indexmap::IndexMap;
use log::{debug, trace};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    datastore::{DataStore, DataStoreError, Dims, Variable, VariableData, VariableRole},
    sections::Sections,
};

#[derive(Debug, Serialize, Deserialize)]
struct StoredDataStore {
    x: Vec<Option<StoredValue>>,

    /// Nanoseconds since the Unix epoch.
    time: Vec<i64>,

    data_vars: IndexMap<String, StoredVariable>,

    attrs: IndexMap<String, String>,

    #[serde(rename = "_sections")]
    sections: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredVariable {
    dims: Dims,
    role: VariableRole,
    #[serde(default)]
    units: Option<String>,
    shape: Vec<usize>,
    /// Row-major.
    values: Vec<Option<StoredValue>>,
}

/// A single value; NaN is `None`. JSON has no infinities, so they're strings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Finite(f64),
    Infinite(Infinity),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum Infinity {
    #[serde(rename = "inf")]
    Positive,
    #[serde(rename = "-inf")]
    Negative,
}

impl StoredValue {
    fn new(v: f64) -> Option<StoredValue> {
        if v.is_nan() {
            None
        } else if v.is_finite() {
            Some(StoredValue::Finite(v))
        } else if v > 0.0 {
            Some(StoredValue::Infinite(Infinity::Positive))
        } else {
            Some(StoredValue::Infinite(Infinity::Negative))
        }
    }

    fn value(v: Option<StoredValue>) -> f64 {
        match v {
            None => f64::NAN,
            Some(StoredValue::Finite(v)) => v,
            Some(StoredValue::Infinite(Infinity::Positive)) => f64::INFINITY,
            Some(StoredValue::Infinite(Infinity::Negative)) => f64::NEG_INFINITY,
        }
    }
}

fn to_stored(values: ArrayView<f64, impl Dimension>) -> Vec<Option<StoredValue>> {
    values.iter().map(|&v| StoredValue::new(v)).collect()
}

impl DataStore {
    /// Write the datastore to `path`, replacing any existing file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), WriteError> {
        let path = path.as_ref();
        let time = self
            .time()
            .iter()
            .map(|&t| {
                i64::try_from(
                    (t.to_duration_in_time_scale(hifitime::TimeScale::UTC)
                        - hifitime::UNIX_REF_EPOCH.to_utc_duration())
                    .total_nanoseconds(),
                )
                .map_err(|_| WriteError::TimeOutOfRange(t))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let data_vars = self
            .raw_data_vars()
            .iter()
            .map(|(name, var)| {
                let (shape, values) = match &var.data {
                    VariableData::X(a) | VariableData::Time(a) => {
                        (a.shape().to_vec(), to_stored(a.view()))
                    }
                    VariableData::XTime(a) => (a.shape().to_vec(), to_stored(a.view())),
                };
                let stored = StoredVariable {
                    dims: var.dims(),
                    role: var.role,
                    units: var.units.clone(),
                    shape,
                    values,
                };
                (name.clone(), stored)
            })
            .collect();

        let sections = match self.sections() {
            Some(s) => s.to_yaml_string()?,
            None => Sections::none_yaml_string()?,
        };
        let stored = StoredDataStore {
            x: to_stored(self.x()),
            time,
            data_vars,
            attrs: self.attrs().clone(),
            sections,
        };

        let io_err = |err| WriteError::Io {
            path: path.to_path_buf(),
            err,
        };
        let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
        serde_json::to_writer(&mut writer, &stored)?;
        writer.flush().map_err(io_err)?;
        debug!("Wrote the datastore to {}", path.display());
        Ok(())
    }
}

/// Open a datastore written by [`DataStore::to_file`]. All invariants of the
/// datastore are checked again.
pub fn open_datastore<P: AsRef<Path>>(path: P) -> Result<DataStore, OpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| OpenError::Io {
        path: path.to_path_buf(),
        err,
    })?;
    let stored: StoredDataStore =
        serde_json::from_reader(BufReader::new(file)).map_err(|err| OpenError::Json {
            path: path.to_path_buf(),
            err,
        })?;
    trace!(
        "{} has {} variables and {} timesteps",
        path.display(),
        stored.data_vars.len(),
        stored.time.len()
    );

    let time = stored
        .time
        .iter()
        .map(|&ns| Epoch::from_unix_duration(Duration::from_total_nanoseconds(i128::from(ns))))
        .collect();

    let mut data_vars = IndexMap::with_capacity(stored.data_vars.len());
    for (name, var) in stored.data_vars {
        let data = from_stored(&name, var.dims, &var.shape, var.values)?;
        data_vars.insert(
            name,
            Variable {
                role: var.role,
                units: var.units,
                data,
            },
        );
    }

    let sections = Sections::from_yaml_str(&stored.sections).map_err(DataStoreError::from)?;
    let ds = DataStore::from_parts(
        stored.x.into_iter().map(StoredValue::value).collect(),
        time,
        data_vars,
        stored.attrs,
        sections,
    )?;
    debug!("Opened the datastore at {}", path.display());
    Ok(ds)
}

fn from_stored(
    name: &str,
    dims: Dims,
    shape: &[usize],
    values: Vec<Option<StoredValue>>,
) -> Result<VariableData, OpenError> {
    let bad_shape = || OpenError::BadShape {
        name: name.to_string(),
        dims,
        shape: shape.to_vec(),
        num_values: values.len(),
    };
    if shape.len() != dims.names().len() || shape.iter().product::<usize>() != values.len() {
        return Err(bad_shape());
    }
    let values: Vec<f64> = values.into_iter().map(StoredValue::value).collect();
    Ok(match dims {
        Dims::X => VariableData::X(Array1::from(values)),
        Dims::Time => VariableData::Time(Array1::from(values)),
        Dims::XTime => {
            let ncols = shape[1];
            VariableData::XTime(Array2::from_shape_fn((shape[0], ncols), |(i, j)| {
                values[i * ncols + j]
            }))
        }
    })
}
