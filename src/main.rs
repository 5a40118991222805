use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    path::PathBuf,
    str::FromStr,
};

use clap::{AppSettings, Parser};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use strum_macros::EnumString;
use thiserror::Error;

use dts_calibration::{
    averaging::ResampleMethod,
    read::{read_files, ReadError, ReadOptions},
    shift::{shift_double_ended, suggest_cable_shift_double_ended_in, MeritWindow},
    unit_parsing::{parse_duration, UnitParseError},
    DataStoreError, DtsInputType, WriteError,
};

const DEFAULT_SHIFT_MIN: i64 = -10;
const DEFAULT_SHIFT_MAX: i64 = 10;

#[derive(Debug, Clone, Copy, EnumString)]
#[strum(serialize_all = "lowercase")]
enum ArgFileTypes {
    Toml,
    Json,
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_long_args = true)]
#[clap(version, about = "Read DTS measurement files and align the channels of double-ended measurements.")]
struct Args {
    /// The directory containing the measurement files.
    directory: Option<PathBuf>,

    /// A TOML or JSON file of arguments. Arguments on the command line take
    /// precedence.
    #[clap(long, parse(from_os_str))]
    #[serde(skip)]
    args_file: Option<PathBuf>,

    /// The instrument file format (silixa or sensornet). If not given, it's
    /// worked out from --file-ext.
    #[clap(long)]
    format: Option<DtsInputType>,

    /// The glob matching files inside the directory, e.g. "channel 1*.xml".
    #[clap(long)]
    file_ext: Option<String>,

    /// The timezone recorded with the output [default: UTC].
    #[clap(long)]
    timezone_netcdf: Option<String>,

    /// The timezone of file timestamps without an offset [default: UTC].
    #[clap(long)]
    timezone_input_files: Option<String>,

    /// Resample in time to this period (e.g. 47s, 10min). A number without a
    /// unit is in seconds.
    #[clap(long)]
    resample: Option<String>,

    /// How to reduce the values within each resampling period (mean, median,
    /// sum, min, max) [default: mean].
    #[clap(long)]
    how: Option<ResampleMethod>,

    /// The smallest cable shift to try [default: -10].
    #[clap(long, allow_hyphen_values = true)]
    shift_min: Option<i64>,

    /// The largest cable shift to try [default: 10].
    #[clap(long, allow_hyphen_values = true)]
    shift_max: Option<i64>,

    /// Only judge the alignment beyond this position along the cable [m].
    #[clap(long, allow_hyphen_values = true)]
    x_min: Option<f64>,

    /// Only judge the alignment before this position along the cable [m].
    #[clap(long, allow_hyphen_values = true)]
    x_max: Option<f64>,

    /// Apply the suggested cable shift before saving.
    #[clap(long)]
    #[serde(default)]
    apply: bool,

    /// Save the datastore to this JSON file.
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Save the input arguments into a new TOML file that can be used to
    /// reproduce this run.
    #[clap(long)]
    #[serde(skip)]
    save_toml: Option<PathBuf>,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences))]
    #[serde(skip)]
    verbosity: u8,

    /// Disable progress bars.
    #[clap(long)]
    #[serde(skip)]
    no_progress_bars: bool,
}

#[derive(Error, Debug)]
enum AlignError {
    #[error("No directory of measurement files was given")]
    NoDirectory,

    #[error("Couldn't work out the file format from '{0}'; use --format")]
    UnknownFormat(String),

    #[error("--shift-min ({min}) is greater than --shift-max ({max})")]
    BadShiftRange { min: i64, max: i64 },

    #[error("Argument file {} should have a .toml or .json extension", .0.display())]
    ArgFileType(PathBuf),

    #[error("Couldn't decode the argument file {}:\n{1}", .0.display())]
    ArgFile(PathBuf, String),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    DataStore(#[from] DataStoreError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    UnitParse(#[from] UnitParseError),

    #[error("Couldn't write the arguments as toml: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Args {
    /// Consolidate the command-line arguments with those of the argument file,
    /// preferring the command line.
    fn merge(self) -> Result<Args, AlignError> {
        let cli_args = self;
        let arg_file = match cli_args.args_file.as_ref() {
            Some(f) => f.clone(),
            None => return Ok(cli_args),
        };
        debug!("Merging command-line arguments with {}", arg_file.display());

        let mut contents = String::new();
        File::open(&arg_file)?.read_to_string(&mut contents)?;
        let arg_file_type = arg_file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ArgFileTypes::from_str(&e).ok());
        let file_args: Args = match arg_file_type {
            Some(ArgFileTypes::Toml) => toml::from_str(&contents)
                .map_err(|err| AlignError::ArgFile(arg_file.clone(), err.to_string()))?,
            Some(ArgFileTypes::Json) => serde_json::from_str(&contents)
                .map_err(|err| AlignError::ArgFile(arg_file.clone(), err.to_string()))?,
            None => return Err(AlignError::ArgFileType(arg_file)),
        };

        Ok(Args {
            directory: cli_args.directory.or(file_args.directory),
            args_file: None,
            format: cli_args.format.or(file_args.format),
            file_ext: cli_args.file_ext.or(file_args.file_ext),
            timezone_netcdf: cli_args.timezone_netcdf.or(file_args.timezone_netcdf),
            timezone_input_files: cli_args
                .timezone_input_files
                .or(file_args.timezone_input_files),
            resample: cli_args.resample.or(file_args.resample),
            how: cli_args.how.or(file_args.how),
            shift_min: cli_args.shift_min.or(file_args.shift_min),
            shift_max: cli_args.shift_max.or(file_args.shift_max),
            x_min: cli_args.x_min.or(file_args.x_min),
            x_max: cli_args.x_max.or(file_args.x_max),
            apply: cli_args.apply || file_args.apply,
            output: cli_args.output.or(file_args.output),
            save_toml: cli_args.save_toml,
            verbosity: cli_args.verbosity,
            no_progress_bars: cli_args.no_progress_bars,
        })
    }

    fn run(self) -> Result<(), AlignError> {
        let directory = self.directory.ok_or(AlignError::NoDirectory)?;
        let input_type = match (self.format, self.file_ext.as_deref()) {
            (Some(format), _) => format,
            (None, Some(file_ext)) => DtsInputType::from_file_ext(file_ext)
                .ok_or_else(|| AlignError::UnknownFormat(file_ext.to_string()))?,
            (None, None) => DtsInputType::Silixa,
        };
        info!("Input type: {input_type}");

        let defaults = ReadOptions::default();
        let options = ReadOptions {
            timezone_netcdf: self.timezone_netcdf.unwrap_or(defaults.timezone_netcdf),
            timezone_input_files: self
                .timezone_input_files
                .unwrap_or(defaults.timezone_input_files),
            file_ext: self.file_ext,
            progress_bar: !self.no_progress_bars,
        };
        let mut ds = read_files(&directory, input_type, &options)?;

        if let Some(resample) = self.resample.as_deref() {
            let period = parse_duration(resample)?;
            let how = self.how.unwrap_or(ResampleMethod::Mean);
            info!("Resampling to {period} with {how}");
            ds = ds.resample_datastore(how, period)?;
        }

        if ds.is_double_ended() {
            let shift_min = self.shift_min.unwrap_or(DEFAULT_SHIFT_MIN);
            let shift_max = self.shift_max.unwrap_or(DEFAULT_SHIFT_MAX);
            if shift_min > shift_max {
                return Err(AlignError::BadShiftRange {
                    min: shift_min,
                    max: shift_max,
                });
            }
            let nx = ds.nx();
            let candidates: Vec<i64> = (shift_min..=shift_max)
                .filter(|k| usize::try_from(k.unsigned_abs()).map_or(false, |k| k < nx))
                .collect();
            if candidates.len() as i128 != i128::from(shift_max) - i128::from(shift_min) + 1 {
                warn!("Only trying cable shifts smaller than the {nx} positions along the cable");
            }
            let window = MeritWindow {
                x_min: self.x_min,
                x_max: self.x_max,
            };
            let suggestion = suggest_cable_shift_double_ended_in(&ds, &candidates, window, false)?;
            info!("Suggested cable shift: {}", suggestion.shift);
            if suggestion.shift_second_diff != suggestion.shift {
                warn!(
                    "The second-difference merit suggests a cable shift of {} instead",
                    suggestion.shift_second_diff
                );
            }
            if self.apply {
                info!("Applying a cable shift of {}", suggestion.shift);
                ds = shift_double_ended(&ds, suggestion.shift)?;
            }
        } else {
            info!("The measurements are single-ended; there's no cable shift to suggest");
        }

        match self.output {
            Some(output) => {
                ds.to_file(&output)?;
                info!("Saved the datastore to {}", output.display());
            }
            None => println!("{ds}"),
        }
        Ok(())
    }
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), AlignError> {
    let args = Args::parse();
    setup_logging(args.verbosity);
    info!("dts-align {}", env!("CARGO_PKG_VERSION"));

    let args = args.merge()?;
    if let Some(toml_path) = args.save_toml.as_ref() {
        let mut f = BufWriter::new(File::create(toml_path)?);
        f.write_all(toml::to_string(&args)?.as_bytes())?;
        f.flush()?;
        debug!("Saved the arguments to {}", toml_path.display());
    }
    args.run()
}

fn setup_logging(verbosity: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        2 => builder.filter_level(log::LevelFilter::Trace),
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
            builder.format(|buf, record| {
                let timestamp = buf.timestamp();
                let level = record.level();
                let target = record.target();
                let line = record.line().unwrap_or(0);
                let message = record.args();

                writeln!(buf, "[{timestamp} {level} {target}:{line}] {message}")
            })
        }
    };
    builder.init();
}
