//! Long-format tabular flattening for the reporting collaborator.
//!
//! Reporting and visualization consume plain rows of (trial id, time
//! index, value); nothing here plots. Row types derive `serde`
//! serialization when the `serde` feature is enabled.

use crate::dataset::TrialDataset;
use crate::error::{AnalysisError, Result};
use crate::metrics::tangling::TanglingResult;
use crate::metrics::xcorr::CrossCorrelation;
use crate::trial::TrialId;

/// One sample of one signal channel.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SignalRow {
    pub trial_id: TrialId,
    pub time_index: usize,
    /// Time in seconds on the trial's own axis.
    pub time_seconds: f64,
    pub value: f64,
}

/// One per-sample metric value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MetricRow {
    pub trial_id: TrialId,
    pub time_index: usize,
    pub value: f64,
}

/// One aggregated cross-correlation lag.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LagRow {
    pub lag: isize,
    pub value: f64,
    /// Trials contributing to this lag's average.
    pub trials: usize,
}

/// Flatten one channel of a signal across all trials.
///
/// # Errors
///
/// Returns `UnknownSignal` when a trial lacks the signal and
/// `ShapeMismatch` when the channel index is out of range.
pub fn signal_rows(dataset: &TrialDataset, signal: &str, channel: usize) -> Result<Vec<SignalRow>> {
    let mut rows = Vec::new();
    for trial in dataset {
        let sig = trial.signal_required(signal)?;
        if channel >= sig.ncols() {
            return Err(AnalysisError::channel_mismatch(signal, channel + 1, sig.ncols()));
        }
        for (t, &value) in sig.column(channel).iter().enumerate() {
            rows.push(SignalRow {
                trial_id: trial.id(),
                time_index: t,
                time_seconds: trial.time_at(t),
                value,
            });
        }
    }
    Ok(rows)
}

/// Flatten a tangling result into per-sample rows.
#[must_use]
pub fn tangling_rows(result: &TanglingResult) -> Vec<MetricRow> {
    let mut rows = Vec::new();
    for trial in result.per_trial() {
        for (t, &value) in trial.values.iter().enumerate() {
            rows.push(MetricRow {
                trial_id: trial.trial_id,
                time_index: t,
                value,
            });
        }
    }
    rows
}

/// Flatten an aggregated cross-correlation into per-lag rows.
#[must_use]
pub fn correlation_rows(result: &CrossCorrelation) -> Vec<LagRow> {
    result
        .lags
        .iter()
        .zip(result.values.iter())
        .zip(result.trial_counts.iter())
        .map(|((&lag, &value), &trials)| LagRow { lag, value, trials })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::Trial;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_signal_rows() {
        let trial = Trial::new(TrialId(3), 0.01, 4)
            .with_time_origin(-0.02)
            .with_signal(
                "rates",
                Array2::from_shape_fn((4, 2), |(i, j)| i as f64 + 10.0 * j as f64),
            )
            .unwrap();
        let ds = TrialDataset::from_trials(vec![trial]).unwrap();

        let rows = signal_rows(&ds, "rates", 1).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].trial_id, TrialId(3));
        assert_relative_eq!(rows[0].value, 10.0, epsilon = 1e-12);
        assert_relative_eq!(rows[2].time_seconds, 0.0, epsilon = 1e-12);

        assert!(signal_rows(&ds, "rates", 2).is_err());
        assert!(signal_rows(&ds, "absent", 0).is_err());
    }
}
