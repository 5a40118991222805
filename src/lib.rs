//! Reading, aligning and resampling fibre-optic distributed temperature
//! sensing (DTS) measurements.

pub mod averaging;
pub mod datastore;
pub mod read;
pub mod sections;
pub mod shift;
pub mod unit_parsing;
pub mod write;

pub use datastore::{DataStore, DataStoreError, SchemaError, ShapeError};
pub use read::{
    parse_timezone, read_sensornet_files, read_silixa_files, ReadError, ReadOptions, Timezone,
};
pub use sections::{Section, Sections};
pub use shift::{
    shift_double_ended, suggest_cable_shift_double_ended, suggest_cable_shift_double_ended_in,
    MeritWindow, ShiftScore, ShiftSuggestion,
};
pub use write::{open_datastore, OpenError, WriteError};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// All supported instrument file formats.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum DtsInputType {
    /// XML files of Silixa instruments.
    Silixa,

    /// DDF files of Sensornet instruments.
    Sensornet,
}

impl DtsInputType {
    pub fn default_file_ext(self) -> &'static str {
        match self {
            DtsInputType::Silixa => "*.xml",
            DtsInputType::Sensornet => "*.ddf",
        }
    }

    /// Guess the format from a file glob like "*.xml".
    pub fn from_file_ext(file_ext: &str) -> Option<DtsInputType> {
        let file_ext = file_ext.to_ascii_lowercase();
        if file_ext.ends_with(".xml") {
            Some(DtsInputType::Silixa)
        } else if file_ext.ends_with(".ddf") {
            Some(DtsInputType::Sensornet)
        } else {
            None
        }
    }
}
