//! Sensornet DDF files.
//!
//! A header of tab-separated key/value lines is followed by a tab-separated
//! table. The table starts with a line of column names, the first of which is
//! "length".

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use ndarray::prelude::*;

use super::{
    parse_number, parse_timestamp, read_to_string, sanitize_name, MeasurementFile, ReadError,
    Timezone,
};
use crate::datastore::{AST, RAST, RST, ST};

fn column_name(name: &str) -> String {
    match name.to_lowercase().as_str() {
        "length" => "x",
        "temperature" => "tmp",
        "stokes" => ST,
        "anti-stokes" => AST,
        "reverse stokes" => RST,
        "reverse anti-stokes" => RAST,
        other => return sanitize_name(other),
    }
    .to_string()
}

fn probe_name(key: &str) -> String {
    match key {
        "T ext. ref 1 (°C)" => "probe1Temperature".to_string(),
        "T ext. ref 2 (°C)" => "probe2Temperature".to_string(),
        "T internal ref (°C)" => "referenceTemperature".to_string(),
        other => sanitize_name(other),
    }
}

/// "length (m)" -> ("length", Some("m"))
fn split_units(header: &str) -> (&str, Option<String>) {
    let header = header.trim();
    match header.split_once('(') {
        Some((name, rest)) => {
            let units = rest.trim_end_matches(')').trim();
            (
                name.trim(),
                Some(units).filter(|u| !u.is_empty()).map(str::to_string),
            )
        }
        None => (header, None),
    }
}

pub(crate) fn parse_file(path: &Path, timezone: Timezone) -> Result<MeasurementFile, ReadError> {
    let text = read_to_string(path)?;
    let mut lines = text.lines().enumerate();

    let mut header: IndexMap<&str, &str> = IndexMap::new();
    let mut column_line = None;
    for (_, line) in lines.by_ref() {
        if line.trim().is_empty() {
            continue;
        }
        if line.trim_start().to_lowercase().starts_with("length") {
            column_line = Some(line);
            break;
        }
        if let Some((key, value)) = line.split_once('\t') {
            header.entry(key.trim()).or_insert_with(|| value.trim());
        }
    }
    let column_line = column_line.ok_or_else(|| ReadError::MissingDataTable {
        path: path.to_path_buf(),
    })?;
    let (columns, units): (Vec<String>, Vec<Option<String>>) = column_line
        .trim_end()
        .split('\t')
        .map(|h| {
            let (name, units) = split_units(h);
            (column_name(name), units)
        })
        .unzip();
    let num_columns = columns.len();

    let mut values = vec![];
    let mut num_rows = 0;
    for (row, line) in lines.filter(|(_, l)| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() != num_columns {
            return Err(ReadError::BadRow {
                path: path.to_path_buf(),
                row,
                expected: num_columns,
                got: fields.len(),
            });
        }
        for field in fields {
            values.push(parse_number(path, row, field)?);
        }
        num_rows += 1;
    }
    if num_rows == 0 {
        return Err(ReadError::MissingDataTable {
            path: path.to_path_buf(),
        });
    }
    let table = Array2::from_shape_fn((num_rows, num_columns), |(i, j)| {
        values[i * num_columns + j]
    });

    let header_value = |key: &'static str| {
        header
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| *v)
            .ok_or_else(|| ReadError::MissingTag {
                path: path.to_path_buf(),
                tag: key,
            })
    };
    let date = header_value("date")?;
    let time = header_value("time")?;
    let timestamp = parse_timestamp(path, &format!("{date} {time}"), timezone)?;

    let mut probes = IndexMap::new();
    let mut attrs = IndexMap::new();
    for (&key, &value) in header
        .iter()
        .filter(|(k, _)| !k.eq_ignore_ascii_case("date") && !k.eq_ignore_ascii_case("time"))
    {
        match value.parse::<f64>() {
            Ok(v) => {
                probes.entry(probe_name(key)).or_insert(v);
            }
            Err(_) => {
                attrs.entry(sanitize_name(key)).or_insert_with(|| value.to_string());
            }
        }
    }

    Ok(MeasurementFile {
        path: PathBuf::from(path),
        timestamp,
        columns,
        units,
        table,
        probes,
        attrs,
    })
}
