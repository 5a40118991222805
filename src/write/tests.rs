use tempfile::tempdir;

use super::*;
use crate::{
    datastore::{AST, ST},
    sections::Section,
};

fn example_datastore() -> DataStore {
    let t0 = Epoch::from_gregorian_utc(2018, 5, 4, 12, 22, 17, 710_000_000);
    let time = (0..4)
        .map(|i| t0 + Duration::from_seconds(30.5 * i as f64))
        .collect();
    let x = Array1::from_shape_fn(6, |i| -1.0 + 0.1 * i as f64);
    let mut ds = DataStore::with_coords(x, time).unwrap();
    ds.insert(
        ST,
        VariableData::XTime(Array2::from_shape_fn((6, 4), |(i, t)| {
            (i * 4 + t) as f64 / 3.0
        })),
    )
    .unwrap();
    let mut ast = Array2::from_elem((6, 4), 0.1 + 0.2);
    ast[(2, 3)] = f64::NAN;
    ds.insert(AST, VariableData::XTime(ast)).unwrap();
    ds.insert_with_role(
        "tmp",
        VariableRole::Auxiliary,
        Some("degC".to_string()),
        VariableData::XTime(Array2::zeros((6, 4))),
    )
    .unwrap();
    ds.insert(
        "probe1Temperature",
        VariableData::Time(array![4.0, 4.1, 4.2, 4.3]),
    )
    .unwrap();
    ds.insert("fibre_loss", VariableData::X(Array1::zeros(6)))
        .unwrap();
    ds.set_attr("instrument", "silixa");
    ds.set_attr("timezone_netcdf", "UTC");
    ds
}

/// NaN != NaN, so compare with the NaNs replaced.
fn without_nans(ds: &DataStore) -> Vec<(String, Vec<f64>)> {
    ds.data_vars()
        .map(|(name, var)| {
            let values = match &var.data {
                VariableData::X(a) | VariableData::Time(a) => a.to_vec(),
                VariableData::XTime(a) => a.iter().copied().collect(),
            };
            let values = values
                .into_iter()
                .map(|v| if v.is_nan() { -999.0 } else { v })
                .collect();
            (name.to_string(), values)
        })
        .collect()
}

#[test]
fn test_io_sections_property() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sections.json");

    let mut ds = example_datastore();
    let sections: Sections = [(
        "probe1Temperature",
        vec![Section::new(7.5, 17.0), Section::new(70.0, 80.0)],
    )]
    .into_iter()
    .collect();
    ds.set_sections(sections.clone()).unwrap();
    ds.to_file(&path).unwrap();

    let ds2 = open_datastore(&path).unwrap();
    assert!(ds2.is_initialized());
    assert_eq!(ds2.sections(), Some(&sections));
}

#[test]
fn test_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ds.json");
    let ds = example_datastore();
    ds.to_file(&path).unwrap();

    let ds2 = open_datastore(&path).unwrap();
    assert!(ds2.sections().is_none());
    assert_eq!(ds2.x(), ds.x());
    assert_eq!(ds2.time(), ds.time());
    assert_eq!(ds2.attrs(), ds.attrs());
    assert_eq!(without_nans(&ds2), without_nans(&ds));
    assert!(ds2.x_time(AST).unwrap()[(2, 3)].is_nan());
    let tmp = ds2.get("tmp").unwrap();
    assert_eq!(tmp.role, VariableRole::Auxiliary);
    assert_eq!(tmp.units.as_deref(), Some("degC"));
    assert_eq!(ds2.to_string(), ds.to_string());
}

#[test]
fn test_open_rejects_invalid_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ds.json");
    example_datastore().to_file(&path).unwrap();
    let json = std::fs::read_to_string(&path).unwrap();

    // Malformed sections.
    let no_sections = "\"_sections\":\"null\\n\"";
    let bad = json.replace(no_sections, "\"_sections\":\"probe1Temperature: [[7.5, \"");
    assert_ne!(bad, json);
    std::fs::write(&path, bad).unwrap();
    assert!(matches!(
        open_datastore(&path),
        Err(OpenError::DataStore(DataStoreError::Serialization(_)))
    ));

    // Sections of a variable that doesn't exist.
    let bad = json.replace(no_sections, "\"_sections\":\"probe9Temperature: []\\n\"");
    std::fs::write(&path, bad).unwrap();
    assert!(matches!(
        open_datastore(&path),
        Err(OpenError::DataStore(DataStoreError::Schema(_)))
    ));

    // x that isn't increasing.
    let mut stored: serde_json::Value = serde_json::from_str(&json).unwrap();
    stored["x"][1] = serde_json::json!(-5.0);
    std::fs::write(&path, stored.to_string()).unwrap();
    assert!(matches!(
        open_datastore(&path),
        Err(OpenError::DataStore(DataStoreError::Shape(_)))
    ));

    // A shape that doesn't match the values.
    let mut stored: serde_json::Value = serde_json::from_str(&json).unwrap();
    stored["data_vars"]["st"]["shape"] = serde_json::json!([5, 4]);
    std::fs::write(&path, stored.to_string()).unwrap();
    assert!(matches!(
        open_datastore(&path),
        Err(OpenError::BadShape { .. })
    ));

    std::fs::write(&path, "{").unwrap();
    assert!(matches!(open_datastore(&path), Err(OpenError::Json { .. })));

    assert!(matches!(
        open_datastore(dir.path().join("missing.json")),
        Err(OpenError::Io { .. })
    ));
}

#[test]
fn test_non_finite_values_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ds.json");
    let t0 = Epoch::from_gregorian_utc_hms(2018, 5, 4, 12, 22, 17);
    let mut ds = DataStore::with_coords(array![0.0, 1.0, f64::INFINITY], vec![t0]).unwrap();
    ds.insert(
        ST,
        VariableData::XTime(array![[f64::INFINITY], [f64::NEG_INFINITY], [f64::NAN]]),
    )
    .unwrap();
    ds.to_file(&path).unwrap();
    let json = std::fs::read_to_string(&path).unwrap();
    assert!(json.contains("[\"inf\",\"-inf\",null]"), "{json}");

    let ds2 = open_datastore(&path).unwrap();
    assert_eq!(ds2.x(), ds.x());
    let st = ds2.x_time(ST).unwrap();
    assert_eq!(st[(0, 0)], f64::INFINITY);
    assert_eq!(st[(1, 0)], f64::NEG_INFINITY);
    assert!(st[(2, 0)].is_nan());
}

#[test]
fn test_times_are_unix_nanoseconds() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ds.json");
    let ds = example_datastore();
    ds.to_file(&path).unwrap();

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let first = stored["time"][0].as_i64().unwrap();
    let second = stored["time"][1].as_i64().unwrap();
    assert_eq!(second - first, 30_500_000_000);

    // Writing what was read gives the same times again.
    let path2 = dir.path().join("ds2.json");
    open_datastore(&path).unwrap().to_file(&path2).unwrap();
    let stored2: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path2).unwrap()).unwrap();
    assert_eq!(stored2["time"], stored["time"]);
}
