//! Print how well each cable shift aligns the channels of a saved
//! double-ended datastore.
//!
//! Usage: dts_shift_scores DATASTORE.json [SHIFT_MIN SHIFT_MAX]

use std::path::PathBuf;

use dts_calibration::{open_datastore, suggest_cable_shift_double_ended};

fn main() {
    if let Err(e) = try_main() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut args = std::env::args().skip(1);
    let path: PathBuf = args
        .next()
        .ok_or("usage: dts_shift_scores DATASTORE.json [SHIFT_MIN SHIFT_MAX]")?
        .into();
    let shift_min: i64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(-10);
    let shift_max: i64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(10);

    let ds = open_datastore(&path)?;
    let candidates: Vec<i64> = (shift_min..=shift_max).collect();
    let suggestion = suggest_cable_shift_double_ended(&ds, &candidates, true)?;

    println!("# shift residual_first_diff residual_second_diff");
    for score in suggestion.scores.iter().flatten() {
        println!(
            "{:>6} {:.6e} {:.6e}",
            score.shift, score.residual_first_diff, score.residual_second_diff
        );
    }
    println!(
        "# suggested shift: {} (second difference: {})",
        suggestion.shift, suggestion.shift_second_diff
    );
    Ok(())
}
