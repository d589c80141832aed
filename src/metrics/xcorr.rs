//! Boundary-corrected normalized cross-correlation.
//!
//! The raw discrete cross-correlation at lag `k` is biased by zero
//! padding: full-overlap lags accumulate more terms than edge lags. The
//! correction applied here divides each lag by (a) the number of
//! overlapping samples and (b) the product of the RMS amplitudes of each
//! series restricted to the overlapping window at that lag, so the
//! zero-lag autocorrelation of any non-constant series is exactly 1 and
//! every lag behaves like a lag-wise Pearson correlation.
//!
//! RMS is computed per lag over the overlap, not once per trial; edge
//! behavior differs materially between the two choices and the per-lag
//! form is the one preserved here.
//!
//! A lag whose overlap window is constant (zero variance) in either
//! series has no defined normalization: it is reported as NaN and
//! counted, never silently zero.

use tracing::debug;

use crate::dataset::TrialDataset;
use crate::error::{AnalysisError, Result};
use crate::trial::TrialId;

/// Variance below `VARIANCE_FLOOR * mean-square` counts as constant.
const VARIANCE_FLOOR: f64 = 1e-12;

/// Cross-correlation of one series pair at every lag.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LagCorrelation {
    /// Lags `-(n-1)..=(n-1)`, ascending.
    pub lags: Vec<isize>,
    /// Normalized correlation per lag; NaN marks a degenerate lag.
    pub values: Vec<f64>,
    /// Number of degenerate lags.
    pub degenerate_lags: usize,
}

impl LagCorrelation {
    /// The value at lag zero.
    #[must_use]
    pub fn at_zero(&self) -> f64 {
        self.values[self.lags.len() / 2]
    }
}

/// Trial-aggregated cross-correlation between two scalar signals.
#[derive(Debug, Clone)]
pub struct CrossCorrelation {
    /// Lags spanning the longest trial, ascending.
    pub lags: Vec<isize>,
    /// Mean over the covering, non-degenerate trials per lag; NaN when
    /// no trial contributes.
    pub values: Vec<f64>,
    /// Contributing trials per lag.
    pub trial_counts: Vec<usize>,
    /// Total degenerate lags across trials.
    pub degenerate_lags: usize,
    /// Per-trial correlations, in dataset order.
    pub per_trial: Vec<(TrialId, LagCorrelation)>,
}

/// Cross-correlate two single-channel signals per trial, then average
/// per lag across trials.
///
/// Degenerate lags are excluded from the average and counted; a lag
/// degenerate in every covering trial stays NaN in the aggregate.
///
/// # Errors
///
/// Structural failures: `UnknownSignal`, `ShapeMismatch` (a signal has
/// more than one channel), `IncompatibleBinSize`, `EmptyInput`.
pub fn cross_correlate(
    dataset: &TrialDataset,
    signal_a: &str,
    signal_b: &str,
) -> Result<CrossCorrelation> {
    dataset.uniform_bin_size()?;

    let mut per_trial = Vec::with_capacity(dataset.len());
    for trial in dataset {
        let a = scalar_series(trial.signal_required(signal_a)?, signal_a)?;
        let b = scalar_series(trial.signal_required(signal_b)?, signal_b)?;
        let correlation = correlate_series(&a, &b);
        if correlation.degenerate_lags > 0 {
            debug!(
                trial = %trial.id(),
                degenerate = correlation.degenerate_lags,
                "cross-correlation found degenerate lags"
            );
        }
        per_trial.push((trial.id(), correlation));
    }

    let max_n = per_trial
        .iter()
        .map(|(_, c)| c.lags.len() / 2)
        .max()
        .unwrap_or(0);
    let lags: Vec<isize> = (-(max_n as isize)..=max_n as isize).collect();

    let mut values = vec![f64::NAN; lags.len()];
    let mut trial_counts = vec![0usize; lags.len()];
    let mut degenerate_lags = 0;
    for (slot, &lag) in lags.iter().enumerate() {
        let mut acc = 0.0;
        let mut count = 0;
        for (_, correlation) in &per_trial {
            let half = correlation.lags.len() / 2;
            let index = lag + half as isize;
            if index < 0 || index as usize >= correlation.lags.len() {
                continue;
            }
            let v = correlation.values[index as usize];
            if v.is_nan() {
                continue;
            }
            acc += v;
            count += 1;
        }
        if count > 0 {
            values[slot] = acc / count as f64;
        }
        trial_counts[slot] = count;
    }
    for (_, correlation) in &per_trial {
        degenerate_lags += correlation.degenerate_lags;
    }

    Ok(CrossCorrelation {
        lags,
        values,
        trial_counts,
        degenerate_lags,
        per_trial,
    })
}

/// Strict single-pair form.
///
/// # Errors
///
/// `ShapeMismatch` when the series lengths differ, `EmptyInput` for
/// empty series, and `DegenerateSeries` when every lag is degenerate
/// (both inputs constant over their full overlap).
pub fn cross_correlate_pair(a: &[f64], b: &[f64]) -> Result<LagCorrelation> {
    if a.is_empty() || b.is_empty() {
        return Err(AnalysisError::empty_input("cross-correlation input is empty"));
    }
    if a.len() != b.len() {
        return Err(AnalysisError::sample_mismatch("series b", a.len(), b.len()));
    }
    let correlation = correlate_series(a, b);
    if correlation.degenerate_lags == correlation.lags.len() {
        return Err(AnalysisError::degenerate(
            "every lag has a constant overlap window",
        ));
    }
    Ok(correlation)
}

/// Full-lag normalized cross-correlation of two equal-length series.
fn correlate_series(a: &[f64], b: &[f64]) -> LagCorrelation {
    let n = a.len() as isize;
    let mut lags = Vec::with_capacity((2 * n - 1) as usize);
    let mut values = Vec::with_capacity((2 * n - 1) as usize);
    let mut degenerate_lags = 0;

    for lag in -(n - 1)..n {
        // Overlap windows: pairs (a[t + lag], b[t]) for valid t.
        let (a_start, b_start) = if lag >= 0 {
            (lag as usize, 0)
        } else {
            (0, (-lag) as usize)
        };
        let overlap = (n - lag.abs()) as usize;
        let wa = &a[a_start..a_start + overlap];
        let wb = &b[b_start..b_start + overlap];

        let (mean_sq_a, var_a) = window_moments(wa);
        let (mean_sq_b, var_b) = window_moments(wb);

        lags.push(lag);
        if is_constant(var_a, mean_sq_a) || is_constant(var_b, mean_sq_b) {
            values.push(f64::NAN);
            degenerate_lags += 1;
            continue;
        }

        let raw: f64 = wa.iter().zip(wb.iter()).map(|(x, y)| x * y).sum();
        let rms = (mean_sq_a * mean_sq_b).sqrt();
        values.push(raw / overlap as f64 / rms);
    }

    LagCorrelation {
        lags,
        values,
        degenerate_lags,
    }
}

/// Mean square and variance of a window.
fn window_moments(window: &[f64]) -> (f64, f64) {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let mean_sq = window.iter().map(|v| v * v).sum::<f64>() / n;
    let var = (mean_sq - mean * mean).max(0.0);
    (mean_sq, var)
}

/// A window is constant when its variance vanishes relative to its
/// mean-square amplitude.
fn is_constant(var: f64, mean_sq: f64) -> bool {
    var < VARIANCE_FLOOR * mean_sq.max(VARIANCE_FLOOR)
}

/// Extract a single-channel signal as a flat series.
fn scalar_series(data: &ndarray::Array2<f64>, name: &str) -> Result<Vec<f64>> {
    if data.ncols() != 1 {
        return Err(AnalysisError::channel_mismatch(name, 1, data.ncols()));
    }
    Ok(data.column(0).to_vec())
}
