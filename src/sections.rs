//! Calibration sections: the stretches of cable that sit in a reference bath
//! of known temperature, keyed by the probe that measures that bath.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::datastore::{DataStore, DataStoreError, Dims, SchemaError};

/// A stretch of cable from `start` to `end` \[m\].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub start: f64,
    pub end: f64,
}

impl Section {
    pub fn new(start: f64, end: f64) -> Section {
        Section { start, end }
    }

    pub fn contains(&self, x: f64) -> bool {
        (self.start..=self.end).contains(&x)
    }
}

impl From<(f64, f64)> for Section {
    fn from((start, end): (f64, f64)) -> Self {
        Section { start, end }
    }
}

/// Probe name -> the sections that probe's bath covers. The insertion order of
/// the probes is preserved, including through serialisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sections(IndexMap<String, Vec<Section>>);

impl Sections {
    pub fn new() -> Sections {
        Sections::default()
    }

    pub fn insert<S: Into<String>, I: IntoIterator<Item = Section>>(
        &mut self,
        probe: S,
        sections: I,
    ) {
        self.0.insert(probe.into(), sections.into_iter().collect());
    }

    pub fn get(&self, probe: &str) -> Option<&[Section]> {
        self.0.get(probe).map(|v| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Section])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialise to the string form stored in a persisted datastore.
    pub fn to_yaml_string(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Parse the string form of (possibly absent) sections. The absent state
    /// is the YAML `null` document.
    pub fn from_yaml_str(s: &str) -> Result<Option<Sections>, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }

    /// The string form of absent sections.
    pub fn none_yaml_string() -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&None::<Sections>)
    }
}

impl<S: Into<String>, I: IntoIterator<Item = Section>> FromIterator<(S, I)> for Sections {
    fn from_iter<T: IntoIterator<Item = (S, I)>>(iter: T) -> Self {
        let mut sections = Sections::new();
        for (probe, s) in iter {
            sections.insert(probe, s);
        }
        sections
    }
}

impl DataStore {
    pub fn sections(&self) -> Option<&Sections> {
        self.sections.as_ref()
    }

    /// Set the calibration sections. Each probe must be an existing variable
    /// indexed solely by `time`, and each section must not end before it
    /// starts. Sections aren't required to lie within the `x` range.
    pub fn set_sections(&mut self, sections: Sections) -> Result<(), DataStoreError> {
        for (probe, intervals) in sections.iter() {
            let var = self.variable(probe)?;
            if var.dims() != Dims::Time {
                return Err(SchemaError::WrongDims {
                    name: probe.to_string(),
                    expected: Dims::Time,
                    got: var.dims(),
                }
                .into());
            }
            if let Some(bad) = intervals.iter().find(|s| !(s.start <= s.end)) {
                return Err(SchemaError::InvalidSection {
                    name: probe.to_string(),
                    start: bad.start,
                    end: bad.end,
                }
                .into());
            }
        }
        self.sections = Some(sections);
        Ok(())
    }

    pub fn delete_sections(&mut self) {
        self.sections = None;
    }
}
