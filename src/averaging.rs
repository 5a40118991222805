//! Temporal resampling of a [`DataStore`].

use std::ops::Range;

use hifitime::{Duration, Epoch};
use indexmap::IndexMap;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use vec1::Vec1;

use crate::datastore::{DataStore, DataStoreError, ShapeError, Variable, VariableData};

/// A collection of timesteps.
#[derive(Debug, Clone)]
pub struct Timeblock {
    /// The timeblock index. e.g. If all timesteps fall into a single
    /// timeblock, then its index is 0.
    pub index: usize,

    /// The range of timestep indices comprising this timeblock. Timestamps are
    /// sorted, so the timesteps belonging to a timeblock are always contiguous.
    pub range: Range<usize>,

    /// The timestamps comprising this timeblock.
    pub timestamps: Vec1<Epoch>,

    /// The leading edge of the timeblock. This is what labels the timeblock
    /// after resampling.
    pub start: Epoch,

    /// The median timestamp of the *ideal* timeblock.
    ///
    /// e.g. If we have timestamps every 10 seconds and we're resampling to 30
    /// seconds, the timeblocks look like this:
    ///
    /// [[0, 10, 20], [30, 40, 50], [60]]
    ///
    /// and the medians are 15, 45 and 75. If we only have timestamps [10, 30,
    /// 80], the timeblocks are anchored on the first timestamp and the empty
    /// one in the middle is dropped:
    ///
    /// [[10, 30], [80]]
    ///
    /// with medians 25 and 85. Note how missing timestamps don't affect it.
    pub median: Epoch,
}

/// How the values within a timeblock are reduced. NaNs are ignored; a
/// timeblock with only NaNs reduces to NaN.
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
pub enum ResampleMethod {
    Mean,
    Median,
    Sum,
    Min,
    Max,
}

impl ResampleMethod {
    fn reduce(self, values: ArrayView1<f64>) -> f64 {
        let mut finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if finite.is_empty() {
            return f64::NAN;
        }
        match self {
            ResampleMethod::Mean => finite.iter().sum::<f64>() / finite.len() as f64,
            ResampleMethod::Sum => finite.iter().sum(),
            ResampleMethod::Min => finite.iter().copied().fold(f64::INFINITY, f64::min),
            ResampleMethod::Max => finite.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ResampleMethod::Median => {
                finite.sort_unstable_by(f64::total_cmp);
                let n = finite.len();
                if n % 2 == 1 {
                    finite[n / 2]
                } else {
                    (finite[n / 2 - 1] + finite[n / 2]) / 2.0
                }
            }
        }
    }
}

/// Group ascendingly-sorted timestamps into blocks of `timeblock_length`. The
/// first block starts at the first timestamp; blocks are half-open, so a
/// timestamp exactly on a boundary belongs to the later block. Blocks without
/// any timestamps are not returned, so the result is never empty. A
/// non-positive length is treated as 1 ns.
pub fn timestamps_to_timeblocks(
    all_timestamps: &Vec1<Epoch>,
    timeblock_length: Duration,
) -> Vec<Timeblock> {
    let length_ns = timeblock_length.total_nanoseconds().max(1);
    let timeblock_length = Duration::from_total_nanoseconds(length_ns);
    let half_a_timeblock = timeblock_length / 2;
    let first_timestamp = *all_timestamps.first();

    let mut timeblocks = vec![];
    let mut timestep_index = 0;
    while let Some(&timestamp) = all_timestamps.get(timestep_index) {
        // Jump straight to the block holding the next timestamp; empty blocks
        // are never visited.
        let i = (timestamp - first_timestamp).total_nanoseconds() / length_ns;
        // `timeblock_start` and `timeblock_end` are not centroids but "leading
        // edge", however `timeblock_median` is a centroid.
        let timeblock_start = first_timestamp + Duration::from_total_nanoseconds(length_ns * i);
        let timeblock_end = timeblock_start + timeblock_length;
        let timeblock_median = timeblock_start + half_a_timeblock;

        let mut timestamps = Vec1::new(timestamp);
        timestamps.extend(
            all_timestamps.as_slice()[timestep_index + 1..]
                .iter()
                .take_while(|ts| (timeblock_start..timeblock_end).contains(ts))
                .copied(),
        );
        let num_timeblock_timestamps = timestamps.len();
        timeblocks.push(Timeblock {
            index: timeblocks.len(),
            range: timestep_index..timestep_index + num_timeblock_timestamps,
            timestamps,
            start: timeblock_start,
            median: timeblock_median,
        });
        timestep_index += num_timeblock_timestamps;
    }

    timeblocks
}

impl DataStore {
    /// Reduce all time-indexed variables into timeblocks of `period`. The
    /// resampled timestamps are the leading edges of the timeblocks.
    /// Variables without a time axis, the attributes and the sections are
    /// carried over.
    pub fn resample_datastore(
        &self,
        how: ResampleMethod,
        period: Duration,
    ) -> Result<DataStore, DataStoreError> {
        if period.total_nanoseconds() <= 0 {
            return Err(DataStoreError::BadResamplePeriod(period));
        }
        if self.time().windows(2).any(|w| w[1] < w[0]) {
            return Err(ShapeError::TimesNotSorted.into());
        }
        let all_timestamps = match Vec1::try_from_vec(self.time().to_vec()) {
            Ok(t) => t,
            // Nothing to resample.
            Err(_) => return Ok(self.clone()),
        };

        let timeblocks = timestamps_to_timeblocks(&all_timestamps, period);
        debug!(
            "Resampling {} timesteps into {} timeblocks with {how}",
            all_timestamps.len(),
            timeblocks.len()
        );

        let data_vars: IndexMap<String, Variable> = self
            .raw_data_vars()
            .iter()
            .map(|(name, var)| {
                let data = match &var.data {
                    VariableData::X(a) => VariableData::X(a.clone()),
                    VariableData::Time(a) => VariableData::Time(
                        timeblocks
                            .iter()
                            .map(|tb| how.reduce(a.slice(s![tb.range.clone()])))
                            .collect(),
                    ),
                    VariableData::XTime(a) => {
                        let mut out = Array2::zeros((a.len_of(Axis(0)), timeblocks.len()));
                        for (mut out_col, tb) in out.axis_iter_mut(Axis(1)).zip(timeblocks.iter()) {
                            let block = a.slice(s![.., tb.range.clone()]);
                            for (o, row) in out_col.iter_mut().zip(block.outer_iter()) {
                                *o = how.reduce(row);
                            }
                        }
                        VariableData::XTime(out)
                    }
                };
                let var = Variable {
                    role: var.role,
                    units: var.units.clone(),
                    data,
                };
                (name.clone(), var)
            })
            .collect();

        self.rebuild(
            self.x().to_owned(),
            timeblocks.iter().map(|tb| tb.start).collect(),
            data_vars,
        )
    }
}
