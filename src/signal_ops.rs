//! Ready-made signal transforms for [`TrialDataset::map_signal`].
//!
//! Each function takes a `[time x channel]` array and returns a new one
//! with the same row count, so they compose directly inside a
//! `map_signal` closure:
//!
//! ```
//! use ndarray::Array2;
//! use trial_dynamics::{signal_ops, Trial, TrialDataset, TrialId};
//!
//! let trial = Trial::new(TrialId(1), 0.01, 50)
//!     .with_signal("rates", Array2::from_shape_fn((50, 2), |(i, _)| i as f64))?;
//! let ds = TrialDataset::from_trials(vec![trial])?;
//!
//! let ds = ds.map_signal("rates_norm", |t| {
//!     Ok(signal_ops::soft_normalize(t.signal_required("rates")?, 5.0))
//! })?;
//! let ds = ds.map_signal("rates_vel", |t| {
//!     Ok(signal_ops::time_derivative(
//!         t.signal_required("rates_norm")?,
//!         t.bin_size(),
//!     ))
//! })?;
//! assert!(ds.iter().all(|t| t.signal("rates_vel").is_some()));
//! # Ok::<(), trial_dynamics::AnalysisError>(())
//! ```
//!
//! [`TrialDataset::map_signal`]: crate::TrialDataset::map_signal

use ndarray::Array2;

use crate::error::{AnalysisError, Result};

/// Per-channel soft normalization: `x / (range + epsilon)`.
///
/// The range is the channel's max minus min over time. For firing rates
/// in Hz an epsilon of 5 keeps near-silent channels from exploding while
/// leaving active channels close to a unit range.
#[must_use]
pub fn soft_normalize(data: &Array2<f64>, range_epsilon: f64) -> Array2<f64> {
    let (rows, cols) = data.dim();
    let mut out = Array2::zeros((rows, cols));
    for c in 0..cols {
        let column = data.column(c);
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in column {
            min = min.min(v);
            max = max.max(v);
        }
        let denom = (max - min) + range_epsilon;
        for t in 0..rows {
            out[[t, c]] = data[[t, c]] / denom;
        }
    }
    out
}

/// Subtract, per channel, the mean over the sample window
/// `[start, end)`.
///
/// Used to remove a baseline estimated from a reference period (for
/// example a pre-task hold) from the whole trial.
///
/// # Errors
///
/// Returns `InvalidConfig` when the window is empty or exceeds the
/// array's rows.
pub fn center_to_window(data: &Array2<f64>, start: usize, end: usize) -> Result<Array2<f64>> {
    let (rows, cols) = data.dim();
    if start >= end || end > rows {
        return Err(AnalysisError::invalid_config(format!(
            "baseline window [{start}, {end}) out of range for {rows} samples"
        )));
    }
    let mut out = data.clone();
    let span = (end - start) as f64;
    for c in 0..cols {
        let mut mean = 0.0;
        for t in start..end {
            mean += data[[t, c]];
        }
        mean /= span;
        for t in 0..rows {
            out[[t, c]] -= mean;
        }
    }
    Ok(out)
}

/// Numerical time derivative, in units per second.
///
/// Central differences in the interior, one-sided differences at the
/// edges. Arrays with fewer than two samples derive to zeros.
#[must_use]
pub fn time_derivative(data: &Array2<f64>, bin_size: f64) -> Array2<f64> {
    let (rows, cols) = data.dim();
    let mut out = Array2::zeros((rows, cols));
    if rows < 2 {
        return out;
    }
    for c in 0..cols {
        out[[0, c]] = (data[[1, c]] - data[[0, c]]) / bin_size;
        out[[rows - 1, c]] = (data[[rows - 1, c]] - data[[rows - 2, c]]) / bin_size;
        for t in 1..rows - 1 {
            out[[t, c]] = (data[[t + 1, c]] - data[[t - 1, c]]) / (2.0 * bin_size);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_soft_normalize_range() {
        // Channel 0 spans [0, 10]; epsilon 5 gives denominator 15.
        let data = Array2::from_shape_fn((11, 1), |(i, _)| i as f64);
        let out = soft_normalize(&data, 5.0);
        assert_relative_eq!(out[[10, 0]], 10.0 / 15.0, epsilon = 1e-12);
        assert_relative_eq!(out[[0, 0]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_soft_normalize_flat_channel() {
        let data = Array2::from_elem((10, 1), 2.0);
        let out = soft_normalize(&data, 5.0);
        // Range 0: epsilon alone keeps the value finite.
        assert_relative_eq!(out[[0, 0]], 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_center_to_window() {
        let data = Array2::from_shape_fn((10, 1), |(i, _)| i as f64);
        // Baseline over samples [0, 4): mean 1.5.
        let out = center_to_window(&data, 0, 4).unwrap();
        assert_relative_eq!(out[[0, 0]], -1.5, epsilon = 1e-12);
        assert_relative_eq!(out[[9, 0]], 7.5, epsilon = 1e-12);

        assert!(center_to_window(&data, 4, 4).is_err());
        assert!(center_to_window(&data, 0, 11).is_err());
    }

    #[test]
    fn test_time_derivative_linear_ramp() {
        // Slope 2 per sample at 0.01 s per bin = 200 per second.
        let data = Array2::from_shape_fn((20, 1), |(i, _)| 2.0 * i as f64);
        let out = time_derivative(&data, 0.01);
        for t in 0..20 {
            assert_relative_eq!(out[[t, 0]], 200.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_time_derivative_short_input() {
        let data = Array2::from_elem((1, 3), 7.0);
        let out = time_derivative(&data, 0.01);
        assert!(out.iter().all(|&v| v == 0.0));
    }
}
