//! Pointwise state-space tangling.
//!
//! Tangling measures how inconsistent instantaneous dynamics are
//! relative to state-space neighbors: for a state `x(t)` with derivative
//! `d(t)`,
//!
//! ```text
//! Q(t) = max_j  ||d(t) - d(j)||^2 / (||x(t) - x(j)||^2 + epsilon)
//! ```
//!
//! over all other pooled samples `j`. High values flag points where
//! nearby states evolve in very different directions, suggesting an
//! external input rather than autonomous dynamics.
//!
//! Samples are pooled across *single trials*, not trial-averaged
//! trajectories; that pooling is a property of this analysis and is
//! preserved deliberately. The epsilon stabilizer bounds the ratio when
//! two states coincide and results are sensitive to it; see
//! [`TanglingConfig`](crate::TanglingConfig).

use ndarray::Array2;
use rand::seq::index::sample;
use rand::Rng;

use crate::config::TanglingConfig;
use crate::dataset::TrialDataset;
use crate::error::{AnalysisError, Result};
use crate::trial::TrialId;

/// One trial's tangling values, in the trial's original sample order.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TrialTangling {
    pub trial_id: TrialId,
    pub values: Vec<f64>,
}

/// Tangling for every pooled sample, grouped per trial.
#[derive(Debug, Clone)]
pub struct TanglingResult {
    per_trial: Vec<TrialTangling>,
    pooled_samples: usize,
    comparison_samples: usize,
}

impl TanglingResult {
    /// Per-trial values, in dataset order.
    #[must_use]
    pub fn per_trial(&self) -> &[TrialTangling] {
        &self.per_trial
    }

    /// Total number of pooled (state, derivative) samples.
    #[must_use]
    pub fn pooled_samples(&self) -> usize {
        self.pooled_samples
    }

    /// Size of the comparison set each query was scanned against.
    #[must_use]
    pub fn comparison_samples(&self) -> usize {
        self.comparison_samples
    }
}

/// Estimate tangling for every sample of `state_signal`.
///
/// `state_signal` and `derivative_signal` are per-sample vectors (the
/// same low-dimensional projection and its numerical time derivative,
/// see [`signal_ops::time_derivative`]). All trials' samples are pooled
/// into one flat collection of (state, derivative) pairs; every sample
/// is a query and receives a value, returned per trial in original
/// sample order.
///
/// When `config.num_sample_points` is smaller than the pool, the
/// comparison set is a random subsample drawn once per call from `rng`.
/// Reproducibility therefore requires an explicitly seeded generator,
/// e.g. `SmallRng::seed_from_u64`.
///
/// # Errors
///
/// Structural failures: `UnknownSignal`, `ShapeMismatch` (state and
/// derivative shapes differ, or channel counts differ across trials),
/// `IncompatibleBinSize` (mixed bin sizes), `EmptyInput`,
/// `InvalidConfig`.
///
/// [`signal_ops::time_derivative`]: crate::signal_ops::time_derivative
pub fn estimate_tangling<R: Rng + ?Sized>(
    dataset: &TrialDataset,
    state_signal: &str,
    derivative_signal: &str,
    config: &TanglingConfig,
    rng: &mut R,
) -> Result<TanglingResult> {
    config.validate()?;
    dataset.uniform_bin_size()?;

    let (states, derivatives, spans) = pool_samples(dataset, state_signal, derivative_signal)?;
    let total = states.nrows();
    if total == 0 {
        return Err(AnalysisError::empty_input("no samples to pool for tangling"));
    }

    let comparison: Vec<usize> = match config.num_sample_points {
        Some(k) if k < total => sample(rng, total, k).into_vec(),
        _ => (0..total).collect(),
    };

    let eps = config.stability_epsilon;
    let dims = states.ncols();
    let mut values = vec![0.0f64; total];
    for (i, value) in values.iter_mut().enumerate() {
        let mut q = 0.0f64;
        for &j in &comparison {
            if j == i {
                continue;
            }
            let mut dd = 0.0;
            let mut dx = 0.0;
            for c in 0..dims {
                let a = derivatives[[i, c]] - derivatives[[j, c]];
                dd += a * a;
                let b = states[[i, c]] - states[[j, c]];
                dx += b * b;
            }
            let ratio = dd / (dx + eps);
            if ratio > q {
                q = ratio;
            }
        }
        *value = q;
    }

    let per_trial = spans
        .into_iter()
        .map(|(trial_id, start, len)| TrialTangling {
            trial_id,
            values: values[start..start + len].to_vec(),
        })
        .collect();

    Ok(TanglingResult {
        per_trial,
        pooled_samples: total,
        comparison_samples: comparison.len(),
    })
}

/// Stack every trial's state and derivative rows, recording each
/// trial's span in the pooled order.
fn pool_samples(
    dataset: &TrialDataset,
    state_signal: &str,
    derivative_signal: &str,
) -> Result<(Array2<f64>, Array2<f64>, Vec<(TrialId, usize, usize)>)> {
    let mut dims: Option<usize> = None;
    let mut total = 0;
    for trial in dataset {
        let state = trial.signal_required(state_signal)?;
        let derivative = trial.signal_required(derivative_signal)?;
        if state.nrows() != derivative.nrows() {
            return Err(AnalysisError::sample_mismatch(
                derivative_signal,
                state.nrows(),
                derivative.nrows(),
            ));
        }
        if state.ncols() != derivative.ncols() {
            return Err(AnalysisError::channel_mismatch(
                derivative_signal,
                state.ncols(),
                derivative.ncols(),
            ));
        }
        let expected = *dims.get_or_insert_with(|| state.ncols());
        if state.ncols() != expected {
            return Err(AnalysisError::channel_mismatch(
                state_signal,
                expected,
                state.ncols(),
            ));
        }
        total += state.nrows();
    }
    let dims = dims.ok_or_else(|| AnalysisError::empty_input("dataset has no trials"))?;

    let mut states = Array2::zeros((total, dims));
    let mut derivatives = Array2::zeros((total, dims));
    let mut spans = Vec::with_capacity(dataset.len());
    let mut offset = 0;
    for trial in dataset {
        let state = trial.signal_required(state_signal)?;
        let derivative = trial.signal_required(derivative_signal)?;
        let len = state.nrows();
        for t in 0..len {
            for c in 0..dims {
                states[[offset + t, c]] = state[[t, c]];
                derivatives[[offset + t, c]] = derivative[[t, c]];
            }
        }
        spans.push((trial.id(), offset, len));
        offset += len;
    }
    Ok((states, derivatives, spans))
}
