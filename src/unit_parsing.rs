//! Parse strings such as "47s" or "2min" into durations.

use hifitime::Duration;
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, IntoStaticStr)]
pub enum TimeFormat {
    /// Milliseconds
    Ms,

    /// Seconds
    S,

    /// Minutes
    Min,

    /// Hours
    H,
}

impl TimeFormat {
    fn seconds_per_unit(self) -> f64 {
        match self {
            TimeFormat::Ms => 1e-3,
            TimeFormat::S => 1.0,
            TimeFormat::Min => 60.0,
            TimeFormat::H => 3600.0,
        }
    }
}

#[derive(Error, Debug)]
pub enum UnitParseError {
    #[error("Successfully parsed a {unit} unit, but could not parse the numerical component of '{input}'")]
    GotTimeUnitButCantParse { input: String, unit: &'static str },

    #[error("Could not parse '{input}' as a {unit_type}")]
    Unknown {
        input: String,
        unit_type: &'static str,
    },
}

/// Parse a string that may have a unit of time attached to it. If there's no
/// unit, the returned format is `None`.
pub fn parse_time(s: &str) -> Result<(f64, Option<TimeFormat>), UnitParseError> {
    // Try to parse a naked number.
    if let Ok(number) = s.trim().parse::<f64>() {
        return Ok((number, None));
    };

    let suffix = s
        .trim()
        .trim_start_matches(|c| char::is_numeric(c) || c == '.' || c == '-' || c == '+')
        .trim();
    for time_format in TimeFormat::iter() {
        let time_format_str: &'static str = time_format.into();
        if suffix.eq_ignore_ascii_case(time_format_str) {
            let prefix = s.trim().trim_end_matches(char::is_alphabetic).trim();
            return match prefix.parse() {
                Ok(number) => Ok((number, Some(time_format))),
                Err(_) => Err(UnitParseError::GotTimeUnitButCantParse {
                    input: s.to_string(),
                    unit: time_format_str,
                }),
            };
        }
    }

    Err(UnitParseError::Unknown {
        input: s.to_string(),
        unit_type: "time",
    })
}

/// Parse a duration. A number without a unit is in seconds.
pub fn parse_duration(s: &str) -> Result<Duration, UnitParseError> {
    let (number, time_format) = parse_time(s)?;
    let seconds = number * time_format.map_or(1.0, TimeFormat::seconds_per_unit);
    if !seconds.is_finite() {
        return Err(UnitParseError::Unknown {
            input: s.to_string(),
            unit_type: "finite duration",
        });
    }
    Ok(Duration::from_seconds(seconds))
}
