//! Spatial alignment of double-ended measurements.
//!
//! Light is injected from both ends of the cable, and the backward channel's
//! positions are only as good as the cable length configured on the
//! instrument. A wrong length offsets the backward channel relative to the
//! forward channel by a whole number of samples, which shows up as spikes in
//! the differential attenuation wherever the cable has a sharp feature (a
//! connector, a bath edge). [`suggest_cable_shift_double_ended`] searches for
//! the shift that makes the differential attenuation smoothest, and
//! [`shift_double_ended`] applies it.


use std::{cmp::Ordering, ops::Range};

use indexmap::IndexMap;
use log::{debug, trace};
use ndarray::prelude::*;
use rayon::prelude::*;
use vec1::Vec1;

use crate::datastore::{
    DataStore, DataStoreError, SchemaError, ShapeError, Variable, VariableRole, AST, RAST, RST,
    ST,
};

/// The merit of a single candidate shift. Lower residuals are better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftScore {
    pub shift: i64,

    /// The mean absolute first difference of the differential attenuation
    /// along `x`.
    pub residual_first_diff: f64,

    /// The mean absolute second difference of the differential attenuation
    /// along `x`.
    pub residual_second_diff: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShiftSuggestion {
    /// The best shift according to the first-difference residual.
    pub shift: i64,

    /// The best shift according to the second-difference residual. This is
    /// less sensitive to a constant slope of the differential attenuation, but
    /// more sensitive to noise.
    pub shift_second_diff: i64,

    /// The scores of every candidate, in candidate order. Only populated when
    /// the plot data was requested.
    pub scores: Option<Vec<ShiftScore>>,
}

/// Restrict the merit to positions strictly between `x_min` and `x_max`. A
/// window that is open on both ends uses the whole cable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeritWindow {
    pub x_min: Option<f64>,
    pub x_max: Option<f64>,
}

impl MeritWindow {
    fn contains(&self, x: f64) -> bool {
        self.x_min.map_or(true, |m| x > m) && self.x_max.map_or(true, |m| x < m)
    }
}

/// Shift the backward channel by `i_shift` samples relative to the forward
/// channel, dropping the `|i_shift|` positions that are no longer covered by
/// both channels.
///
/// With a positive shift, `x` and the forward channel lose their first
/// `i_shift` positions while the backward channel loses its last `i_shift`.
/// With a negative shift it's the other way around. The output therefore has
/// `nx - |i_shift|` positions. Variables with the [`VariableRole::Backward`]
/// role follow the backward channel, all other variables with an `x` axis
/// follow the forward channel and variables without an `x` axis are copied.
///
/// No value is interpolated, so shifting by `-k` and then `k` gives back the
/// input restricted to `x[k..nx - k]` exactly.
pub fn shift_double_ended(ds: &DataStore, i_shift: i64) -> Result<DataStore, DataStoreError> {
    check_double_ended(ds)?;
    let (forward, backward) = shifted_ranges(ds.nx(), i_shift)?;
    trace!("Shift {i_shift}: forward x {forward:?}, backward x {backward:?}");

    let data_vars: IndexMap<String, Variable> = ds
        .raw_data_vars()
        .iter()
        .map(|(name, var)| {
            let range = match var.role {
                VariableRole::Backward => backward.clone(),
                _ => forward.clone(),
            };
            let var = Variable {
                role: var.role,
                units: var.units.clone(),
                data: var.data.slice_x(range),
            };
            (name.clone(), var)
        })
        .collect();

    ds.rebuild(
        ds.x().slice(s![forward]).to_owned(),
        ds.time().to_vec(),
        data_vars,
    )
}

/// Evaluate every candidate shift and suggest the one that best aligns the
/// backward channel with the forward channel. See
/// [`suggest_cable_shift_double_ended_in`].
pub fn suggest_cable_shift_double_ended(
    ds: &DataStore,
    candidate_shifts: &[i64],
    plot_result: bool,
) -> Result<ShiftSuggestion, DataStoreError> {
    suggest_cable_shift_double_ended_in(ds, candidate_shifts, MeritWindow::default(), plot_result)
}

/// Evaluate every candidate shift and suggest the one that best aligns the
/// backward channel with the forward channel.
///
/// For each candidate `k` the datastore is shifted with
/// [`shift_double_ended`], and the differential attenuation
///
/// E = (ln(rst / rast) - ln(st / ast)) / 2
///
/// is computed over all positions and times. When the channels are aligned, E
/// is smooth along the cable; the residuals are the mean absolute first and
/// second differences of E along `x` (positions of each difference stencil's
/// midpoint must lie within `window`, and non-finite values are ignored). A
/// candidate without any usable value scores infinity.
///
/// Ties are broken by the smallest `|k|`, then by the negative candidate. A
/// flat or noisy signal still yields a suggestion, however unreliable.
///
/// If `plot_result` is set, the scores of every candidate are attached to the
/// result.
pub fn suggest_cable_shift_double_ended_in(
    ds: &DataStore,
    candidate_shifts: &[i64],
    window: MeritWindow,
    plot_result: bool,
) -> Result<ShiftSuggestion, DataStoreError> {
    let candidates =
        Vec1::try_from_vec(candidate_shifts.to_vec()).map_err(|_| DataStoreError::EmptyRange)?;
    check_double_ended(ds)?;
    // Fail before doing any work if a candidate can't be applied.
    for &i_shift in candidates.iter() {
        shifted_ranges(ds.nx(), i_shift)?;
    }
    debug!(
        "Evaluating {} candidate cable shifts ({} .. {})",
        candidates.len(),
        candidates.first(),
        candidates.last()
    );

    let scores = candidates
        .as_slice()
        .par_iter()
        .map(|&i_shift| score_shift(ds, i_shift, window))
        .collect::<Result<Vec<_>, _>>()?;
    let scores = Vec1::try_from_vec(scores).map_err(|_| DataStoreError::EmptyRange)?;
    for score in scores.iter() {
        trace!(
            "Shift {:>4}: first-difference residual {:.6e}, second-difference residual {:.6e}",
            score.shift,
            score.residual_first_diff,
            score.residual_second_diff
        );
    }

    let shift = best_shift(&scores, |s| s.residual_first_diff);
    let shift_second_diff = best_shift(&scores, |s| s.residual_second_diff);
    debug!("Suggested cable shift: {shift} (second-difference merit suggests {shift_second_diff})");

    Ok(ShiftSuggestion {
        shift,
        shift_second_diff,
        scores: plot_result.then(|| scores.into_vec()),
    })
}

/// Both channels must be present for any of this to make sense.
fn check_double_ended(ds: &DataStore) -> Result<(), SchemaError> {
    for name in [ST, AST, RST, RAST] {
        ds.x_time(name)?;
    }
    Ok(())
}

/// The `x` index ranges of the forward and backward channels that survive a
/// shift.
fn shifted_ranges(nx: usize, i_shift: i64) -> Result<(Range<usize>, Range<usize>), ShapeError> {
    let k = usize::try_from(i_shift.unsigned_abs()).unwrap_or(usize::MAX);
    if k >= nx {
        return Err(ShapeError::ShiftTooLarge { shift: i_shift, nx });
    }
    let nx2 = nx - k;
    Ok(match i_shift.cmp(&0) {
        Ordering::Less => (0..nx2, k..nx),
        Ordering::Greater => (k..nx, 0..nx2),
        Ordering::Equal => (0..nx, 0..nx),
    })
}

fn score_shift(
    ds: &DataStore,
    i_shift: i64,
    window: MeritWindow,
) -> Result<ShiftScore, DataStoreError> {
    let shifted = shift_double_ended(ds, i_shift)?;
    let st = shifted.x_time(ST)?;
    let ast = shifted.x_time(AST)?;
    let rst = shifted.x_time(RST)?;
    let rast = shifted.x_time(RAST)?;

    let i_fw = (&st / &ast).mapv_into(f64::ln);
    let i_bw = (&rst / &rast).mapv_into(f64::ln);
    let diff_att = (i_bw - i_fw) / 2.0;

    Ok(ShiftScore {
        shift: i_shift,
        residual_first_diff: mean_abs_difference(diff_att.view(), shifted.x(), 1, window),
        residual_second_diff: mean_abs_difference(diff_att.view(), shifted.x(), 2, window),
    })
}

/// The mean absolute `order`-th difference of `values` along `x` (axis 0).
fn mean_abs_difference(
    values: ArrayView2<f64>,
    x: ArrayView1<f64>,
    order: usize,
    window: MeritWindow,
) -> f64 {
    if values.len_of(Axis(0)) <= order {
        return f64::INFINITY;
    }
    let mut diff = values.to_owned();
    for _ in 0..order {
        let next = &diff.slice(s![1.., ..]) - &diff.slice(s![..-1, ..]);
        diff = next;
    }

    let mut sum = 0.0;
    let mut count: usize = 0;
    for (i, row) in diff.outer_iter().enumerate() {
        if !window.contains(0.5 * (x[i] + x[i + order])) {
            continue;
        }
        for &v in row.iter().filter(|v| v.is_finite()) {
            sum += v.abs();
            count += 1;
        }
    }
    if count == 0 {
        f64::INFINITY
    } else {
        sum / count as f64
    }
}

fn best_shift<F: Fn(&ShiftScore) -> f64>(scores: &Vec1<ShiftScore>, residual: F) -> i64 {
    let key = |s: &ShiftScore| {
        let r = residual(s);
        if r.is_nan() {
            f64::INFINITY
        } else {
            r
        }
    };
    let rank = |a: &ShiftScore, b: &ShiftScore| {
        key(a)
            .total_cmp(&key(b))
            .then(a.shift.unsigned_abs().cmp(&b.shift.unsigned_abs()))
            .then(a.shift.cmp(&b.shift))
    };
    scores
        .iter()
        .skip(1)
        .fold(scores.first(), |best, s| {
            if rank(s, best) == Ordering::Less {
                s
            } else {
                best
            }
        })
        .shift
}
