//! Silixa XML files.
//!
//! Each file holds a single measurement. The columns of the measurement table
//! are named by `<mnemonicList>` (e.g. "LAF,ST,AST,REV-ST,REV-AST,TMP"), and
//! each `<data>` element is one comma-separated row of the table. Scalars like
//! the reference bath temperatures live under `<customData>`.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use ndarray::prelude::*;
use roxmltree::{Document, Node};

use super::{
    parse_number, parse_timestamp, read_to_string, MeasurementFile, ReadError, Timezone,
};
use crate::datastore::{AST, RAST, RST, ST};

fn is_tag(node: Node<'_, '_>, tag: &str) -> bool {
    node.is_element() && node.tag_name().name().eq_ignore_ascii_case(tag)
}

fn find_tag<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.descendants().find(|n| is_tag(*n, tag))
}

fn is_leaf(node: Node<'_, '_>) -> bool {
    node.is_element() && !node.children().any(|c| c.is_element())
}

fn column_name(mnemonic: &str) -> String {
    match mnemonic.trim() {
        "LAF" => "x",
        "ST" => ST,
        "AST" => AST,
        "REV-ST" => RST,
        "REV-AST" => RAST,
        "TMP" => "tmp",
        other => return other.to_lowercase().replace('-', "_"),
    }
    .to_string()
}

struct DataTable {
    columns: Vec<String>,
    units: Vec<Option<String>>,
    table: Array2<f64>,
}

fn parse_document<'input>(path: &Path, text: &'input str) -> Result<Document<'input>, ReadError> {
    Document::parse(text).map_err(|err| ReadError::Xml {
        path: path.to_path_buf(),
        err,
    })
}

fn parse_data_table(path: &Path, doc: &Document) -> Result<DataTable, ReadError> {
    let root = doc.root_element();
    let mnemonics = find_tag(root, "mnemonicList")
        .and_then(|n| n.text())
        .ok_or_else(|| ReadError::MissingTag {
            path: path.to_path_buf(),
            tag: "mnemonicList",
        })?;
    let columns: Vec<String> = mnemonics.split(',').map(column_name).collect();
    let num_columns = columns.len();

    let mut units: Vec<Option<String>> = match find_tag(root, "unitList").and_then(|n| n.text()) {
        Some(u) => u
            .split(',')
            .map(|u| Some(u.trim()).filter(|u| !u.is_empty()).map(str::to_string))
            .collect(),
        None => vec![],
    };
    units.resize(num_columns, None);

    let mut values = vec![];
    let mut num_rows = 0;
    for (row, node) in root.descendants().filter(|n| is_tag(*n, "data")).enumerate() {
        let text = node.text().unwrap_or("");
        let fields: Vec<&str> = text.split(',').collect();
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

    Ok(DataTable {
        columns,
        units,
        table: Array2::from_shape_fn((num_rows, num_columns), |(i, j)| {
            values[i * num_columns + j]
        }),
    })
}

/// Read the measurement table of a single Silixa file. The shape is (number
/// of positions, number of columns).
pub fn read_data_from_fp<P: AsRef<Path>>(path: P) -> Result<Array2<f64>, ReadError> {
    let path = path.as_ref();
    let text = read_to_string(path)?;
    let doc = parse_document(path, &text)?;
    Ok(parse_data_table(path, &doc)?.table)
}

pub(crate) fn parse_file(path: &Path, timezone: Timezone) -> Result<MeasurementFile, ReadError> {
    let text = read_to_string(path)?;
    let doc = parse_document(path, &text)?;
    let DataTable {
        columns,
        units,
        table,
    } = parse_data_table(path, &doc)?;
    let root = doc.root_element();

    let start = find_tag(root, "startDateTimeIndex").ok_or_else(|| ReadError::MissingTag {
        path: path.to_path_buf(),
        tag: "startDateTimeIndex",
    })?;
    let timestamp = parse_timestamp(path, start.text().unwrap_or(""), timezone)?;

    // The metadata of the log sits next to its start time.
    let mut attrs = IndexMap::new();
    if let Some(log) = start.parent_element() {
        for leaf in log.children().filter(|n| is_leaf(*n)) {
            if let Some(text) = leaf.text().map(str::trim).filter(|t| !t.is_empty()) {
                attrs.insert(leaf.tag_name().name().to_string(), text.to_string());
            }
        }
    }

    let mut probes = IndexMap::new();
    if let Some(custom_data) = find_tag(root, "customData") {
        for leaf in custom_data.descendants().filter(|n| is_leaf(*n)) {
            let name = leaf.tag_name().name();
            // Derived from the columns instead.
            if name.eq_ignore_ascii_case("isDoubleEnded") {
                continue;
            }
            let text = match leaf.text().map(str::trim) {
                Some(t) if !t.is_empty() => t,
                _ => continue,
            };
            if probes.contains_key(name) || attrs.contains_key(name) {
                continue;
            }
            match text.parse::<f64>() {
                Ok(v) => {
                    probes.insert(name.to_string(), v);
                }
                Err(_) => {
                    attrs.insert(name.to_string(), text.to_string());
                }
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
