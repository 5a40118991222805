use approx::assert_abs_diff_eq;
use hifitime::{Duration, Epoch};
use itertools::Itertools;
use tempfile::{tempdir, TempDir};

use super::*;
use crate::{averaging::ResampleMethod, datastore::ST};

const DOUBLE_ENDED: &str = "LAF,ST,AST,REV-ST,REV-AST,TMP";
const SINGLE_ENDED: &str = "LAF,ST,AST,TMP";

fn silixa_xml(
    timestamp: &str,
    mnemonics: &str,
    rows: &[Vec<f64>],
    probes: &[(&str, f64)],
) -> String {
    let custom_data: String = probes
        .iter()
        .map(|(name, v)| format!("      <{name} uom=\"degC\">{v}</{name}>\n"))
        .collect();
    let data: String = rows
        .iter()
        .map(|r| format!("      <data>{}</data>\n", r.iter().join(",")))
        .collect();
    let units = mnemonics
        .split(',')
        .map(|m| match m {
            "LAF" => "m",
            "TMP" => "degC",
            _ => "",
        })
        .join(",");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<logs xmlns="http://www.witsml.org/schemas/1series" version="1.4.1.1">
  <log uid="dts">
    <name>channel 1</name>
    <startDateTimeIndex>{timestamp}</startDateTimeIndex>
    <customData>
      <isDoubleEnded>1</isDoubleEnded>
      <forwardMeasurementChannel>channel 1</forwardMeasurementChannel>
{custom_data}      <UserConfiguration>
        <ChannelConfiguration>
          <FibreLength>1000</FibreLength>
        </ChannelConfiguration>
      </UserConfiguration>
    </customData>
    <logData>
      <mnemonicList>{mnemonics}</mnemonicList>
      <unitList>{units}</unitList>
{data}    </logData>
  </log>
</logs>
"#
    )
}

/// Rows of a measurement, with values depending on the position and `t`.
fn rows(nx: usize, num_columns: usize, t: f64) -> Vec<Vec<f64>> {
    (0..nx)
        .map(|i| {
            let mut row = vec![i as f64 * 0.5];
            row.extend((1..num_columns).map(|c| 100.0 * c as f64 + i as f64 + t));
            row
        })
        .collect()
}

fn write(dir: &TempDir, name: &str, contents: &str) {
    std::fs::write(dir.path().join(name), contents).unwrap();
}

fn sensornet_ddf(date: &str, time: &str, probe1: f64, nx: usize, t: f64) -> String {
    let mut s = format!(
        "Date\t{date}\nTime\t{time}\nDifferential loss correction\tsingle-ended\n\
         T ext. ref 1 (°C)\t{probe1}\nT ext. ref 2 (°C)\t{}\nT internal ref (°C)\t22.3\n\
         length (m)\ttemperature (°C)\tStokes\tanti-Stokes\n",
        probe1 + 1.0
    );
    for i in 0..nx {
        s.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            i as f64 - 2.0,
            20.0 + t,
            1.5 + i as f64,
            0.9 + t
        ));
    }
    s
}

#[test]
fn test_read_data_from_single_file_double_ended() {
    let dir = tempdir().unwrap();
    let r = rows(7, 6, 0.0);
    write(
        &dir,
        "a.xml",
        &silixa_xml("2018-05-04T12:22:17.710Z", DOUBLE_ENDED, &r, &[]),
    );
    let data = read_data_from_fp(dir.path().join("a.xml")).unwrap();
    assert_eq!(data.dim(), (7, 6));
    for (i, row) in r.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            assert_abs_diff_eq!(data[(i, j)], v);
        }
    }
}

#[test]
fn test_read_data_from_single_file_single_ended() {
    let dir = tempdir().unwrap();
    write(
        &dir,
        "a.xml",
        &silixa_xml(
            "2018-05-04T12:22:17.710Z",
            SINGLE_ENDED,
            &rows(5, 4, 0.0),
            &[],
        ),
    );
    let data = read_data_from_fp(dir.path().join("a.xml")).unwrap();
    assert_eq!(data.dim(), (5, 4));
}

#[test]
fn test_read_silixa_files_double_ended() {
    let dir = tempdir().unwrap();
    // File order differs from time order.
    for (name, timestamp, t) in [
        ("a.xml", "2018-05-04T12:23:18.000Z", 2.0),
        ("b.xml", "2018-05-04T12:22:17.000Z", 0.0),
        ("c.xml", "2018-05-04T12:22:48.000Z", 1.0),
    ] {
        let probes = [
            ("probe1Temperature", 4.0 + t),
            ("probe2Temperature", 5.0 + t),
            ("referenceTemperature", 21.0),
        ];
        write(
            &dir,
            name,
            &silixa_xml(timestamp, DOUBLE_ENDED, &rows(8, 6, t), &probes),
        );
    }
    // Not matched by the glob.
    write(&dir, "notes.txt", "not a measurement");

    let ds = read_silixa_files(dir.path(), &ReadOptions::default()).unwrap();
    assert!(ds.is_initialized());
    assert!(ds.is_double_ended());
    assert_eq!(ds.nx(), 8);
    assert_eq!(ds.nt(), 3);
    assert_abs_diff_eq!(ds.x()[7], 3.5);
    assert_eq!(
        ds.time(),
        [
            Epoch::from_gregorian_utc_hms(2018, 5, 4, 12, 22, 17),
            Epoch::from_gregorian_utc_hms(2018, 5, 4, 12, 22, 48),
            Epoch::from_gregorian_utc_hms(2018, 5, 4, 12, 23, 18),
        ]
    );

    let st = ds.x_time(ST).unwrap();
    assert_abs_diff_eq!(st[(3, 0)], 103.0);
    assert_abs_diff_eq!(st[(3, 2)], 105.0);
    let tmp = ds.x_time("tmp").unwrap();
    assert_abs_diff_eq!(tmp[(0, 1)], 501.0);
    assert_eq!(ds.get("tmp").unwrap().units.as_deref(), Some("degC"));
    assert_eq!(ds.get(ST).unwrap().role, VariableRole::Forward);
    assert_eq!(ds.get(RST).unwrap().role, VariableRole::Backward);

    let probe1 = ds.get("probe1Temperature").unwrap();
    assert_eq!(probe1.role, VariableRole::Probe);
    assert_eq!(probe1.data.as_time().unwrap(), array![4.0, 5.0, 6.0]);
    assert!(ds.get("FibreLength").is_some());
    assert!(ds.get("isDoubleEnded").is_none());

    assert_eq!(ds.attrs()["isDoubleEnded"], "1");
    assert_eq!(ds.attrs()["instrument"], "silixa");
    assert_eq!(ds.attrs()["timezone_netcdf"], "UTC");
    assert_eq!(ds.attrs()["forwardMeasurementChannel"], "channel 1");
    assert_eq!(ds.attrs()["name"], "channel 1");
}

#[test]
fn test_read_silixa_files_single_ended() {
    let dir = tempdir().unwrap();
    for (name, timestamp) in [
        ("a.xml", "2018-05-04T12:22:17Z"),
        ("b.xml", "2018-05-04T12:22:47Z"),
    ] {
        write(
            &dir,
            name,
            &silixa_xml(timestamp, SINGLE_ENDED, &rows(4, 4, 0.0), &[]),
        );
    }
    let ds = read_silixa_files(dir.path(), &ReadOptions::default()).unwrap();
    assert!(ds.is_initialized());
    assert!(!ds.is_double_ended());
    assert_eq!(ds.attrs()["isDoubleEnded"], "0");
    assert!(ds.get(RST).is_none());
}

#[test]
fn test_probes_must_be_in_every_file() {
    let dir = tempdir().unwrap();
    write(
        &dir,
        "a.xml",
        &silixa_xml(
            "2018-05-04T12:22:17Z",
            SINGLE_ENDED,
            &rows(4, 4, 0.0),
            &[("probe1Temperature", 4.0), ("probe2Temperature", 5.0)],
        ),
    );
    write(
        &dir,
        "b.xml",
        &silixa_xml(
            "2018-05-04T12:22:47Z",
            SINGLE_ENDED,
            &rows(4, 4, 0.0),
            &[("probe1Temperature", 4.5)],
        ),
    );
    let ds = read_silixa_files(dir.path(), &ReadOptions::default()).unwrap();
    assert!(ds.get("probe1Temperature").is_some());
    assert!(ds.get("probe2Temperature").is_none());
}

#[test]
fn test_files_must_agree() {
    let dir = tempdir().unwrap();
    write(
        &dir,
        "a.xml",
        &silixa_xml("2018-05-04T12:22:17Z", SINGLE_ENDED, &rows(4, 4, 0.0), &[]),
    );
    write(
        &dir,
        "b.xml",
        &silixa_xml("2018-05-04T12:22:47Z", SINGLE_ENDED, &rows(5, 4, 0.0), &[]),
    );
    let result = read_silixa_files(dir.path(), &ReadOptions::default());
    assert!(matches!(result, Err(ReadError::XMismatch { .. })), "{result:?}");

    write(
        &dir,
        "b.xml",
        &silixa_xml("2018-05-04T12:22:47Z", DOUBLE_ENDED, &rows(4, 6, 0.0), &[]),
    );
    let result = read_silixa_files(dir.path(), &ReadOptions::default());
    assert!(
        matches!(result, Err(ReadError::InconsistentColumns { .. })),
        "{result:?}"
    );
}

#[test]
fn test_malformed_files() {
    let dir = tempdir().unwrap();
    write(
        &dir,
        "a.xml",
        &silixa_xml("2018-05-04T12:22:17Z", SINGLE_ENDED, &rows(4, 4, 0.0), &[])
            .replace("<data>1,", "<data>one,"),
    );
    let result = read_silixa_files(dir.path(), &ReadOptions::default());
    assert!(matches!(result, Err(ReadError::BadNumber { .. })), "{result:?}");

    write(&dir, "a.xml", "<logs><log></logs>");
    let result = read_silixa_files(dir.path(), &ReadOptions::default());
    assert!(matches!(result, Err(ReadError::Xml { .. })), "{result:?}");

    write(
        &dir,
        "a.xml",
        &silixa_xml("yesterday", SINGLE_ENDED, &rows(4, 4, 0.0), &[]),
    );
    let result = read_silixa_files(dir.path(), &ReadOptions::default());
    assert!(matches!(result, Err(ReadError::BadTimestamp { .. })), "{result:?}");

    write(
        &dir,
        "a.xml",
        &silixa_xml("2018-05-04T12:22:17Z", SINGLE_ENDED, &[], &[]),
    );
    let result = read_silixa_files(dir.path(), &ReadOptions::default());
    assert!(
        matches!(result, Err(ReadError::MissingDataTable { .. })),
        "{result:?}"
    );
}

#[test]
fn test_no_files() {
    let dir = tempdir().unwrap();
    let result = read_silixa_files(dir.path(), &ReadOptions::default());
    assert!(matches!(result, Err(ReadError::NoFiles { .. })));

    let options = ReadOptions {
        file_ext: Some("*.ddf".to_string()),
        ..Default::default()
    };
    write(
        &dir,
        "a.xml",
        &silixa_xml("2018-05-04T12:22:17Z", SINGLE_ENDED, &rows(4, 4, 0.0), &[]),
    );
    let result = read_silixa_files(dir.path(), &options);
    assert!(matches!(result, Err(ReadError::NoFiles { .. })));
}

#[test]
fn test_naive_timestamps_use_input_timezone() {
    let dir = tempdir().unwrap();
    write(
        &dir,
        "a.xml",
        &silixa_xml("2018-05-04T14:22:17", SINGLE_ENDED, &rows(4, 4, 0.0), &[]),
    );
    let options = ReadOptions {
        timezone_input_files: "+02:00".to_string(),
        ..Default::default()
    };
    let ds = read_silixa_files(dir.path(), &options).unwrap();
    assert_eq!(
        ds.time(),
        [Epoch::from_gregorian_utc_hms(2018, 5, 4, 12, 22, 17)]
    );
    assert_eq!(ds.attrs()["timezone_input_files"], "+02:00");

    let options = ReadOptions {
        timezone_netcdf: "Mars/Olympus_Mons".to_string(),
        ..Default::default()
    };
    let result = read_silixa_files(dir.path(), &options);
    assert!(matches!(result, Err(ReadError::BadTimezone(_))));
}

#[test]
fn test_naive_timestamps_use_named_timezone() {
    let dir = tempdir().unwrap();
    write(
        &dir,
        "a.xml",
        &silixa_xml("2018-05-04T14:22:17", SINGLE_ENDED, &rows(4, 4, 0.0), &[]),
    );
    // Amsterdam is on summer time (UTC+2) in May.
    let options = ReadOptions {
        timezone_input_files: "Europe/Amsterdam".to_string(),
        timezone_netcdf: "Europe/Amsterdam".to_string(),
        ..Default::default()
    };
    let ds = read_silixa_files(dir.path(), &options).unwrap();
    assert_eq!(
        ds.time(),
        [Epoch::from_gregorian_utc_hms(2018, 5, 4, 12, 22, 17)]
    );
    assert_eq!(ds.attrs()["timezone_netcdf"], "Europe/Amsterdam");

    // A local time skipped by the switch to summer time doesn't exist.
    write(
        &dir,
        "a.xml",
        &silixa_xml("2018-03-25T02:30:00", SINGLE_ENDED, &rows(4, 4, 0.0), &[]),
    );
    let result = read_silixa_files(dir.path(), &options);
    assert!(matches!(result, Err(ReadError::BadTimestamp { .. })));
}

#[test]
fn test_read_sensornet_files_single_ended() {
    let dir = tempdir().unwrap();
    write(
        &dir,
        "b.ddf",
        &sensornet_ddf("2018/02/13", "15:32:10", 24.5, 6, 1.0),
    );
    write(
        &dir,
        "a.ddf",
        &sensornet_ddf("2018/02/13", "15:30:10", 24.0, 6, 0.0),
    );
    let options = ReadOptions {
        file_ext: Some("*.ddf".to_string()),
        ..Default::default()
    };
    let ds = read_sensornet_files(dir.path(), &options).unwrap();
    assert!(ds.is_initialized());
    assert!(!ds.is_double_ended());
    assert_eq!(ds.nx(), 6);
    assert_eq!(ds.nt(), 2);
    assert_eq!(ds.x(), array![-2.0, -1.0, 0.0, 1.0, 2.0, 3.0]);
    assert_eq!(
        ds.time(),
        [
            Epoch::from_gregorian_utc_hms(2018, 2, 13, 15, 30, 10),
            Epoch::from_gregorian_utc_hms(2018, 2, 13, 15, 32, 10),
        ]
    );

    assert_eq!(
        ds.data_vars().map(|(name, _)| name).collect::<Vec<_>>(),
        [
            "tmp",
            "st",
            "ast",
            "probe1Temperature",
            "probe2Temperature",
            "referenceTemperature"
        ]
    );
    assert_eq!(ds.get("tmp").unwrap().units.as_deref(), Some("°C"));
    assert_eq!(
        ds.get("probe1Temperature").unwrap().data.as_time().unwrap(),
        array![24.0, 24.5]
    );
    assert_abs_diff_eq!(ds.x_time("ast").unwrap()[(0, 1)], 1.9);
    assert_eq!(ds.attrs()["differential_loss_correction"], "single-ended");
    assert_eq!(ds.attrs()["instrument"], "sensornet");
}

#[test]
fn test_resample_read_files() {
    let dir = tempdir().unwrap();
    for (name, timestamp) in [
        ("a.xml", "2018-05-04T12:22:02.074Z"),
        ("b.xml", "2018-05-04T12:22:32.903Z"),
        ("c.xml", "2018-05-04T12:23:03.723Z"),
    ] {
        write(
            &dir,
            name,
            &silixa_xml(timestamp, SINGLE_ENDED, &rows(4, 4, 0.0), &[]),
        );
    }
    let ds = read_silixa_files(dir.path(), &ReadOptions::default()).unwrap();
    assert_eq!(ds.nt(), 3);

    let resampled = ds
        .resample_datastore(ResampleMethod::Mean, Duration::from_seconds(47.0))
        .unwrap();
    assert_eq!(resampled.nt(), 2);
}

#[test]
fn test_parse_timezone() {
    for (s, seconds) in [
        ("UTC", 0),
        ("z", 0),
        ("GMT", 0),
        ("+01:00", 3600),
        ("UTC+01:00", 3600),
        ("-05:30", -19800),
        ("+0530", 19800),
        ("+2", 7200),
    ] {
        match parse_timezone(s).unwrap() {
            Timezone::Fixed(offset) => assert_eq!(offset.local_minus_utc(), seconds, "{s}"),
            tz => panic!("{s} parsed as {tz:?}"),
        }
    }
    assert_eq!(
        parse_timezone("Europe/Amsterdam").unwrap(),
        Timezone::Named(chrono_tz::Europe::Amsterdam)
    );
    for s in ["", "Mars/Olympus_Mons", "+25:00", "+01:75", "+-1", "UTC+"] {
        assert!(parse_timezone(s).is_err(), "{s}");
    }
}

#[test]
fn test_sanitize_name() {
    assert_eq!(sanitize_name("T ext. ref 1 (°C)"), "t_ext_ref_1_c");
    assert_eq!(sanitize_name("Differential loss correction"), "differential_loss_correction");
}
