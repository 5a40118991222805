//! The labelled container holding DTS measurements along the cable (`x`) and
//! through time.

mod error;

pub use error::{DataStoreError, SchemaError, ShapeError};

use std::{fmt, ops::Range};

use hifitime::Epoch;
use indexmap::IndexMap;
use itertools::Itertools;
use log::trace;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::sections::Sections;

/// Forward-channel Stokes.
pub const ST: &str = "st";
/// Forward-channel anti-Stokes.
pub const AST: &str = "ast";
/// Backward-channel Stokes.
pub const RST: &str = "rst";
/// Backward-channel anti-Stokes.
pub const RAST: &str = "rast";

/// The axes a variable is indexed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dims {
    X,
    Time,
    XTime,
}

impl Dims {
    pub fn has_x(self) -> bool {
        matches!(self, Dims::X | Dims::XTime)
    }

    pub fn has_time(self) -> bool {
        matches!(self, Dims::Time | Dims::XTime)
    }

    pub fn names(self) -> &'static [&'static str] {
        match self {
            Dims::X => &["x"],
            Dims::Time => &["time"],
            Dims::XTime => &["x", "time"],
        }
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.names().join(", "))
    }
}

/// What a variable means to the calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableRole {
    /// A signal of the forward-travelling channel.
    Forward,

    /// A signal of the backward-travelling channel. During a cable shift these
    /// are re-indexed relative to `x`.
    Backward,

    /// A reference temperature through time (e.g. a bath probe).
    Probe,

    /// Anything else (e.g. the instrument-derived temperature).
    Auxiliary,
}

impl VariableRole {
    /// Work out the role of a variable from its name and axes.
    pub fn infer(name: &str, dims: Dims) -> VariableRole {
        match (name, dims) {
            (ST | AST, _) => VariableRole::Forward,
            (RST | RAST, _) => VariableRole::Backward,
            (_, Dims::Time) => VariableRole::Probe,
            _ => VariableRole::Auxiliary,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VariableData {
    X(Array1<f64>),
    Time(Array1<f64>),
    /// Shape `(nx, nt)`.
    XTime(Array2<f64>),
}

impl VariableData {
    pub fn dims(&self) -> Dims {
        match self {
            VariableData::X(_) => Dims::X,
            VariableData::Time(_) => Dims::Time,
            VariableData::XTime(_) => Dims::XTime,
        }
    }

    /// The number of elements along `x`, if this variable has that axis.
    pub fn len_x(&self) -> Option<usize> {
        match self {
            VariableData::X(a) => Some(a.len()),
            VariableData::Time(_) => None,
            VariableData::XTime(a) => Some(a.len_of(Axis(0))),
        }
    }

    /// The number of elements along `time`, if this variable has that axis.
    pub fn len_time(&self) -> Option<usize> {
        match self {
            VariableData::X(_) => None,
            VariableData::Time(a) => Some(a.len()),
            VariableData::XTime(a) => Some(a.len_of(Axis(1))),
        }
    }

    pub fn as_time(&self) -> Option<ArrayView1<f64>> {
        match self {
            VariableData::Time(a) => Some(a.view()),
            _ => None,
        }
    }

    pub fn as_x_time(&self) -> Option<ArrayView2<f64>> {
        match self {
            VariableData::XTime(a) => Some(a.view()),
            _ => None,
        }
    }

    /// Take the `x` elements in `range`. Variables without an `x` axis are
    /// returned as they are.
    pub(crate) fn slice_x(&self, range: Range<usize>) -> VariableData {
        match self {
            VariableData::X(a) => VariableData::X(a.slice(s![range]).to_owned()),
            VariableData::Time(a) => VariableData::Time(a.clone()),
            VariableData::XTime(a) => VariableData::XTime(a.slice(s![range, ..]).to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub role: VariableRole,
    pub units: Option<String>,
    pub data: VariableData,
}

impl Variable {
    pub fn dims(&self) -> Dims {
        self.data.dims()
    }
}

/// Measurements indexed by cable position (`x`) and time, along with the
/// calibration sections.
///
/// Every constructor validates the invariants of the container: `x` is
/// strictly increasing and every variable agrees with the coordinate lengths.
#[derive(Debug, Clone, PartialEq)]
pub struct DataStore {
    x: Array1<f64>,
    time: Vec<Epoch>,
    data_vars: IndexMap<String, Variable>,
    attrs: IndexMap<String, String>,
    pub(crate) sections: Option<Sections>,
    initialized: bool,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore {
    /// An empty container without coordinates or variables.
    pub fn new() -> DataStore {
        DataStore {
            x: Array1::zeros(0),
            time: vec![],
            data_vars: IndexMap::new(),
            attrs: IndexMap::new(),
            sections: None,
            initialized: true,
        }
    }

    /// A container with coordinates but no variables yet.
    pub fn with_coords(x: Array1<f64>, time: Vec<Epoch>) -> Result<DataStore, DataStoreError> {
        Self::from_parts(x, time, IndexMap::new(), IndexMap::new(), None)
    }

    /// Assemble a container from all of its parts, checking the invariants.
    pub(crate) fn from_parts(
        x: Array1<f64>,
        time: Vec<Epoch>,
        data_vars: IndexMap<String, Variable>,
        attrs: IndexMap<String, String>,
        sections: Option<Sections>,
    ) -> Result<DataStore, DataStoreError> {
        check_x_increasing(x.view())?;
        for (name, var) in &data_vars {
            check_variable(name, &var.data, x.len(), time.len())?;
        }
        let mut ds = DataStore {
            x,
            time,
            data_vars,
            attrs,
            sections: None,
            initialized: false,
        };
        if let Some(sections) = sections {
            ds.set_sections(sections)?;
        }
        ds.initialized = true;
        trace!(
            "Assembled a datastore with {} x, {} timesteps and {} variables",
            ds.nx(),
            ds.nt(),
            ds.data_vars.len()
        );
        Ok(ds)
    }

    /// Add a variable, inferring its role from its name.
    pub fn insert<S: Into<String>>(
        &mut self,
        name: S,
        data: VariableData,
    ) -> Result<(), DataStoreError> {
        let name = name.into();
        let role = VariableRole::infer(&name, data.dims());
        self.insert_with_role(name, role, None, data)
    }

    pub fn insert_with_role<S: Into<String>>(
        &mut self,
        name: S,
        role: VariableRole,
        units: Option<String>,
        data: VariableData,
    ) -> Result<(), DataStoreError> {
        let name = name.into();
        if self.data_vars.contains_key(&name) {
            return Err(SchemaError::Duplicate { name }.into());
        }
        check_variable(&name, &data, self.nx(), self.nt())?;
        self.data_vars.insert(name, Variable { role, units, data });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.data_vars.get(name)
    }

    /// Like [`DataStore::get`], but a missing variable is an error.
    pub fn variable(&self, name: &str) -> Result<&Variable, SchemaError> {
        self.data_vars.get(name).ok_or_else(|| SchemaError::Missing {
            name: name.to_string(),
        })
    }

    /// Get a variable that must be indexed by both `x` and `time`.
    pub fn x_time(&self, name: &str) -> Result<ArrayView2<f64>, SchemaError> {
        let var = self.variable(name)?;
        var.data.as_x_time().ok_or_else(|| SchemaError::WrongDims {
            name: name.to_string(),
            expected: Dims::XTime,
            got: var.dims(),
        })
    }

    pub fn data_vars(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.data_vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn x(&self) -> ArrayView1<f64> {
        self.x.view()
    }

    pub fn time(&self) -> &[Epoch] {
        &self.time
    }

    pub fn nx(&self) -> usize {
        self.x.len()
    }

    pub fn nt(&self) -> usize {
        self.time.len()
    }

    pub fn attrs(&self) -> &IndexMap<String, String> {
        &self.attrs
    }

    pub fn set_attr<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Does this container hold both a forward and a backward channel?
    pub fn is_double_ended(&self) -> bool {
        [ST, AST, RST, RAST]
            .into_iter()
            .all(|name| self.x_time(name).is_ok())
    }

    /// The names of all variables indexed solely by `time`.
    pub fn timeseries_keys(&self) -> Vec<&str> {
        self.data_vars
            .iter()
            .filter(|(_, v)| v.dims() == Dims::Time)
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Select the `x` elements in `range` for the coordinate and every
    /// variable with an `x` axis.
    pub fn isel_x(&self, range: Range<usize>) -> Result<DataStore, DataStoreError> {
        if range.start > range.end || range.end > self.nx() {
            return Err(ShapeError::SliceOutOfBounds {
                start: range.start,
                end: range.end,
                nx: self.nx(),
            }
            .into());
        }
        let data_vars = self
            .data_vars
            .iter()
            .map(|(name, var)| {
                (
                    name.clone(),
                    Variable {
                        data: var.data.slice_x(range.clone()),
                        ..var.clone()
                    },
                )
            })
            .collect();
        Self::from_parts(
            self.x.slice(s![range]).to_owned(),
            self.time.clone(),
            data_vars,
            self.attrs.clone(),
            self.sections.clone(),
        )
    }

    /// Copy everything apart from the coordinates and variables, which are
    /// supplied.
    pub(crate) fn rebuild(
        &self,
        x: Array1<f64>,
        time: Vec<Epoch>,
        data_vars: IndexMap<String, Variable>,
    ) -> Result<DataStore, DataStoreError> {
        Self::from_parts(
            x,
            time,
            data_vars,
            self.attrs.clone(),
            self.sections.clone(),
        )
    }

    pub(crate) fn raw_data_vars(&self) -> &IndexMap<String, Variable> {
        &self.data_vars
    }
}

fn check_x_increasing(x: ArrayView1<f64>) -> Result<(), ShapeError> {
    for (index, pair) in x.windows(2).into_iter().enumerate() {
        let (previous, value) = (pair[0], pair[1]);
        // Written this way so that NaNs are caught too.
        if !(value > previous) {
            return Err(ShapeError::XNotIncreasing {
                index: index + 1,
                previous,
                value,
            });
        }
    }
    Ok(())
}

fn check_variable(
    name: &str,
    data: &VariableData,
    nx: usize,
    nt: usize,
) -> Result<(), DataStoreError> {
    if name == "x" || name == "time" {
        return Err(SchemaError::ReservedName {
            name: name.to_string(),
        }
        .into());
    }
    for (axis, expected, got) in [("x", nx, data.len_x()), ("time", nt, data.len_time())] {
        match got {
            Some(got) if got != expected => {
                return Err(ShapeError::AxisLength {
                    name: name.to_string(),
                    axis,
                    expected,
                    got,
                }
                .into())
            }
            _ => (),
        }
    }
    Ok(())
}

impl fmt::Display for DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<{}.DataStore>", env!("CARGO_CRATE_NAME"))?;
        writeln!(f, "Sections:")?;
        match &self.sections {
            Some(sections) => {
                for (name, intervals) in sections.iter() {
                    let intervals = intervals
                        .iter()
                        .map(|s| format!("({:.2} - {:.2})", s.start, s.end))
                        .join(", ");
                    writeln!(f, "    {name:<20} {intervals}")?;
                }
            }
            None => writeln!(f, "    ()")?,
        }
        writeln!(f, "Dimensions: (x: {}, time: {})", self.nx(), self.nt())?;
        writeln!(f, "Coordinates:")?;
        match (self.x.first(), self.x.last()) {
            (Some(first), Some(last)) => writeln!(f, "    x     (x)    {first} .. {last}")?,
            _ => writeln!(f, "    x     (x)    -")?,
        }
        match (self.time.first(), self.time.last()) {
            (Some(first), Some(last)) => writeln!(f, "    time  (time) {first} .. {last}")?,
            _ => writeln!(f, "    time  (time) -")?,
        }
        writeln!(f, "Data variables:")?;
        for (name, var) in &self.data_vars {
            writeln!(f, "    {name:<20} {:<12} {:?}", var.dims().to_string(), var.role)?;
        }
        if !self.attrs.is_empty() {
            writeln!(f, "Attributes:")?;
            for (k, v) in &self.attrs {
                writeln!(f, "    {k}: {v}")?;
            }
        }
        Ok(())
    }
}
