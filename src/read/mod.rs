//! Reading directories of DTS instrument files into a [`DataStore`].
//!
//! Files are parsed on a separate thread and streamed to the assembler, which
//! stacks the measurements of every file along the time axis.

mod error;
pub mod sensornet;
pub mod silixa;
#[cfg(test)]
mod tests;

pub use error::ReadError;
pub use silixa::read_data_from_fp;

use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
    thread::scope,
};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use crossbeam_channel::{bounded, Receiver, Sender};
use crossbeam_utils::atomic::AtomicCell;
use hifitime::Epoch;
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use log::{debug, info, warn};
use ndarray::prelude::*;

use crate::{
    datastore::{DataStore, Dims, VariableData, VariableRole, RAST, RST},
    DtsInputType,
};

/// Formats of timestamps without an offset. These are interpreted in the
/// timezone of the input files.
const NAIVE_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%dT%H:%M:%S%.f",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// The timezone recorded with the assembled datastore.
    pub timezone_netcdf: String,

    /// The timezone of timestamps in the files that don't specify an offset.
    pub timezone_input_files: String,

    /// The glob matching files inside the directory. If this isn't given, the
    /// default of the file format is used (e.g. "*.xml").
    pub file_ext: Option<String>,

    /// Draw a progress bar while reading.
    pub progress_bar: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            timezone_netcdf: "UTC".to_string(),
            timezone_input_files: "UTC".to_string(),
            file_ext: None,
            progress_bar: false,
        }
    }
}

/// Everything taken from a single measurement file.
#[derive(Debug, Clone)]
pub(crate) struct MeasurementFile {
    pub(crate) path: PathBuf,
    pub(crate) timestamp: Epoch,

    /// Column names. One of these is "x".
    pub(crate) columns: Vec<String>,
    pub(crate) units: Vec<Option<String>>,

    /// The measurements, with shape (nx, number of columns).
    pub(crate) table: Array2<f64>,

    /// Scalars recorded with the measurement, e.g. reference bath
    /// temperatures.
    pub(crate) probes: IndexMap<String, f64>,

    pub(crate) attrs: IndexMap<String, String>,
}

/// Read all Silixa XML files in `directory`.
pub fn read_silixa_files<P: AsRef<Path>>(
    directory: P,
    options: &ReadOptions,
) -> Result<DataStore, ReadError> {
    read_files(directory.as_ref(), DtsInputType::Silixa, options)
}

/// Read all Sensornet DDF files in `directory`.
pub fn read_sensornet_files<P: AsRef<Path>>(
    directory: P,
    options: &ReadOptions,
) -> Result<DataStore, ReadError> {
    read_files(directory.as_ref(), DtsInputType::Sensornet, options)
}

/// Read all files of a format in `directory` into a single datastore, sorted
/// by time. Every file must have the same columns and cable positions; scalar
/// probe values are kept if they're present in every file.
pub fn read_files(
    directory: &Path,
    input_type: DtsInputType,
    options: &ReadOptions,
) -> Result<DataStore, ReadError> {
    parse_timezone(&options.timezone_netcdf)?;
    let timezone_input_files = parse_timezone(&options.timezone_input_files)?;
    let pattern = options
        .file_ext
        .as_deref()
        .unwrap_or_else(|| input_type.default_file_ext());
    let files = find_files(directory, pattern)?;
    info!(
        "Reading {} {input_type} files from {}",
        files.len(),
        directory.display()
    );

    let (tx, rx) = bounded(5);
    let error = AtomicCell::new(false);
    let read_progress = ProgressBar::with_draw_target(
        Some(files.len() as _),
        if options.progress_bar {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template(
                "{msg:17}: [{wide_bar:.blue}] {pos:3}/{len:3} files ({elapsed_precise}<{eta_precise})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    )
    .with_position(0)
    .with_message("Reading");
    read_progress.tick();

    let ds = scope(|s| {
        let producer = s.spawn(|| {
            let result = parse_files(
                &files,
                input_type,
                timezone_input_files,
                tx,
                &error,
                &read_progress,
            );
            if result.is_err() {
                error.store(true);
            }
            result
        });

        let assembled = assemble(rx, &error);
        if assembled.is_err() {
            error.store(true);
        }
        match producer.join() {
            Ok(result) => result?,
            Err(e) => std::panic::resume_unwind(e),
        }
        assembled
    });
    read_progress.abandon_with_message("Finished reading");

    let mut ds = ds?;
    ds.set_attr("instrument", input_type.to_string());
    ds.set_attr(
        "isDoubleEnded",
        if ds.get(RST).is_some() && ds.get(RAST).is_some() {
            "1"
        } else {
            "0"
        },
    );
    ds.set_attr("timezone_netcdf", options.timezone_netcdf.clone());
    ds.set_attr("timezone_input_files", options.timezone_input_files.clone());
    info!("Read {} timesteps of {} positions", ds.nt(), ds.nx());
    Ok(ds)
}

/// Parse each file in turn and send it to the assembler. Stops early if the
/// assembler has gone away or an error was flagged.
fn parse_files(
    files: &[PathBuf],
    input_type: DtsInputType,
    timezone: Timezone,
    tx: Sender<MeasurementFile>,
    error: &AtomicCell<bool>,
    progress_bar: &ProgressBar,
) -> Result<(), ReadError> {
    for path in files {
        if error.load() {
            break;
        }
        debug!("Reading {}", path.display());
        let file = match input_type {
            DtsInputType::Silixa => silixa::parse_file(path, timezone)?,
            DtsInputType::Sensornet => sensornet::parse_file(path, timezone)?,
        };
        if tx.send(file).is_err() {
            break;
        }
        progress_bar.inc(1);
    }
    Ok(())
}

/// Stack the incoming files along time.
fn assemble(
    rx: Receiver<MeasurementFile>,
    error: &AtomicCell<bool>,
) -> Result<DataStore, ReadError> {
    let mut first: Option<MeasurementFile> = None;
    let mut x_column = 0;
    // Per column, the values of every file one after the other.
    let mut stacks: Vec<Vec<f64>> = vec![];
    let mut timestamps: Vec<Epoch> = vec![];
    let mut probes: Vec<IndexMap<String, f64>> = vec![];

    for file in rx.iter() {
        if error.load() {
            break;
        }
        match first.as_ref() {
            None => {
                x_column = file
                    .columns
                    .iter()
                    .position(|c| c == "x")
                    .ok_or_else(|| ReadError::MissingDataTable {
                        path: file.path.clone(),
                    })?;
                stacks = vec![vec![]; file.columns.len()];
            }
            Some(reference) => {
                if file.columns != reference.columns {
                    return Err(ReadError::InconsistentColumns {
                        path: file.path,
                        expected: reference.columns.clone(),
                        got: file.columns,
                    });
                }
                if file.table.column(x_column) != reference.table.column(x_column) {
                    return Err(ReadError::XMismatch { path: file.path });
                }
            }
        }

        for (stack, column) in stacks.iter_mut().zip(file.table.columns()) {
            stack.extend(column.iter().copied());
        }
        timestamps.push(file.timestamp);
        probes.push(file.probes.clone());
        if first.is_none() {
            first = Some(file);
        }
    }

    let first = match first {
        Some(f) => f,
        // Only possible if the producer bailed; its error takes precedence.
        None => return Ok(DataStore::new()),
    };

    // Order the timesteps chronologically. The sort is stable, so files with
    // the same timestamp stay in file order.
    let mut order: Vec<usize> = (0..timestamps.len()).collect();
    order.sort_by(|&a, &b| {
        timestamps[a]
            .partial_cmp(&timestamps[b])
            .unwrap_or(Ordering::Equal)
    });
    let nx = first.table.nrows();
    let nt = order.len();

    let x = first.table.column(x_column).to_owned();
    let time = order.iter().map(|&t| timestamps[t]).collect();
    let mut ds = DataStore::with_coords(x, time)?;
    for (i_col, (name, units)) in first.columns.iter().zip(first.units.iter()).enumerate() {
        if i_col == x_column {
            continue;
        }
        let stack = &stacks[i_col];
        let data = Array2::from_shape_fn((nx, nt), |(i, t)| stack[order[t] * nx + i]);
        ds.insert_with_role(
            name.as_str(),
            VariableRole::infer(name, Dims::XTime),
            units.clone(),
            VariableData::XTime(data),
        )?;
    }

    for name in first.probes.keys() {
        if first.columns.contains(name) || name == "x" || name == "time" {
            warn!("Ignoring the probe '{name}'; it clashes with a column name");
            continue;
        }
        let values: Option<Vec<f64>> = order
            .iter()
            .map(|&t| probes[t].get(name).copied())
            .collect();
        match values {
            Some(values) => ds.insert_with_role(
                name.as_str(),
                VariableRole::Probe,
                None,
                VariableData::Time(Array1::from(values)),
            )?,
            None => debug!("'{name}' isn't present in every file; skipping it"),
        }
    }

    for (key, value) in &first.attrs {
        ds.set_attr(key.as_str(), value.as_str());
    }
    Ok(ds)
}

/// All files in `directory` matching `pattern`, sorted by path.
fn find_files(directory: &Path, pattern: &str) -> Result<Vec<PathBuf>, ReadError> {
    let full_pattern = format!(
        "{}/{pattern}",
        glob::Pattern::escape(&directory.to_string_lossy())
    );
    let paths = glob::glob(&full_pattern).map_err(|err| ReadError::Glob {
        pattern: pattern.to_string(),
        err,
    })?;
    let mut files: Vec<PathBuf> = paths
        .filter_map(|p| match p {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Skipping an unreadable path: {e}");
                None
            }
        })
        .filter(|p| p.is_file())
        .collect();
    files.sort_unstable();
    if files.is_empty() {
        return Err(ReadError::NoFiles {
            dir: directory.to_path_buf(),
            pattern: pattern.to_string(),
        });
    }
    Ok(files)
}

/// The timezone of timestamps that don't carry their own offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timezone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl Timezone {
    /// Interpret a local time in this timezone. `None` if the local time is
    /// skipped or repeated by a daylight saving transition.
    fn to_utc(self, naive: &NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            Timezone::Fixed(tz) => tz
                .from_local_datetime(naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc)),
            Timezone::Named(tz) => tz
                .from_local_datetime(naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Parse a timezone: UTC, a fixed offset (e.g. "+01:00", "UTC-0530") or an
/// IANA name (e.g. "Europe/Amsterdam").
pub fn parse_timezone(s: &str) -> Result<Timezone, ReadError> {
    if let Some(offset) = parse_fixed_offset(s) {
        return Ok(Timezone::Fixed(offset));
    }
    s.trim()
        .parse::<Tz>()
        .map(Timezone::Named)
        .map_err(|_| ReadError::BadTimezone(s.to_string()))
}

fn parse_fixed_offset(s: &str) -> Option<FixedOffset> {
    let upper = s.trim().to_ascii_uppercase();
    if matches!(upper.as_str(), "UTC" | "Z" | "GMT" | "ETC/UTC" | "ETC/GMT") {
        return FixedOffset::east_opt(0);
    }

    let offset = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);
    let (sign, rest) = match offset.chars().next() {
        Some('+') => (1, &offset[1..]),
        Some('-') => (-1, &offset[1..]),
        _ => return None,
    };
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit() || c == ':') {
        return None;
    }
    let (hours, minutes) = match rest.split_once(':') {
        Some(hm) => hm,
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Parse a timestamp. Timestamps carrying their own offset (RFC 3339) ignore
/// `timezone`.
pub(crate) fn parse_timestamp(
    path: &Path,
    value: &str,
    timezone: Timezone,
) -> Result<Epoch, ReadError> {
    let value = value.trim();
    let bad = || ReadError::BadTimestamp {
        path: path.to_path_buf(),
        value: value.to_string(),
    };
    let utc = match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(_) => {
            let naive = NAIVE_TIMESTAMP_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
                .ok_or_else(bad)?;
            timezone.to_utc(&naive).ok_or_else(bad)?
        }
    };
    Ok(Epoch::from_gregorian_utc(
        utc.year(),
        utc.month() as u8,
        utc.day() as u8,
        utc.hour() as u8,
        utc.minute() as u8,
        utc.second() as u8,
        // Leap seconds are folded into the preceding second.
        utc.nanosecond().min(999_999_999),
    ))
}

pub(crate) fn read_to_string(path: &Path) -> Result<String, ReadError> {
    std::fs::read_to_string(path).map_err(|err| ReadError::Io {
        path: path.to_path_buf(),
        err,
    })
}

/// Parse a single value of a data table. Empty values are missing
/// measurements.
pub(crate) fn parse_number(path: &Path, row: usize, value: &str) -> Result<f64, ReadError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(f64::NAN);
    }
    value.parse().map_err(|_| ReadError::BadNumber {
        path: path.to_path_buf(),
        row,
        value: value.to_string(),
    })
}

/// "T ext. ref 1" -> "t_ext_ref_1"
pub(crate) fn sanitize_name(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .join("_")
}
