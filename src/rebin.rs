//! Lossy reduction of a dataset's time resolution.
//!
//! Rebinning aggregates consecutive samples into coarser bins and remaps
//! event indices by integer division. Sub-bin event precision is lost and
//! trailing samples that do not fill a whole bin are dropped; the
//! operation is deliberately one-way.

use std::collections::BTreeMap;

use ndarray::Array2;
use tracing::debug;

use crate::config::BinAggregation;
use crate::dataset::TrialDataset;
use crate::error::{AnalysisError, Result};
use crate::trial::{EventMarker, Trial};

/// Relative tolerance for the integer-multiple check on bin sizes.
const RATIO_TOLERANCE: f64 = 1e-9;

/// Resample `dataset` to `new_bin_size` seconds per bin.
///
/// `aggregation` declares, per signal name, whether samples inside a new
/// bin are averaged (continuous signals) or summed (count-like signals);
/// signals not named default to averaging.
///
/// For each trial the new sample count is `floor(old_count / ratio)`;
/// every event index is remapped by integer division by the ratio, so
/// event ordering is preserved but sub-bin precision is lost. An event
/// index landing past the truncated tail clamps to the last retained bin.
///
/// # Errors
///
/// Returns `IncompatibleBinSize` when the dataset's trials do not share
/// one bin size or `new_bin_size` is not an integer multiple of it, and
/// `EmptyInput` for an empty dataset.
pub fn rebin(
    dataset: &TrialDataset,
    new_bin_size: f64,
    aggregation: &BTreeMap<String, BinAggregation>,
) -> Result<TrialDataset> {
    let current = dataset.uniform_bin_size()?;
    let ratio = bin_ratio(current, new_bin_size)?;
    if ratio == 1 {
        return Ok(dataset.clone());
    }

    let mut trials = Vec::with_capacity(dataset.len());
    for trial in dataset {
        trials.push(rebin_trial(trial, ratio, aggregation));
    }
    TrialDataset::from_trials(trials)
}

/// Check that `requested` is an integer multiple of `current` and return
/// the ratio.
fn bin_ratio(current: f64, requested: f64) -> Result<usize> {
    if !(requested > 0.0 && requested.is_finite()) {
        return Err(AnalysisError::invalid_config(
            "new bin size must be positive and finite",
        ));
    }
    let ratio_f = requested / current;
    let ratio = ratio_f.round();
    if ratio < 1.0 || (ratio_f - ratio).abs() > RATIO_TOLERANCE * ratio_f {
        return Err(AnalysisError::incompatible_bin_size(current, requested));
    }
    Ok(ratio as usize)
}

fn rebin_trial(
    trial: &Trial,
    ratio: usize,
    aggregation: &BTreeMap<String, BinAggregation>,
) -> Trial {
    let new_count = trial.sample_count() / ratio;
    let dropped = trial.sample_count() - new_count * ratio;
    if dropped > 0 {
        debug!(trial = %trial.id(), dropped, "rebin dropped trailing samples");
    }

    let mut signals = BTreeMap::new();
    for (name, data) in trial.signals() {
        let policy = aggregation.get(name).copied().unwrap_or_default();
        signals.insert(name.clone(), aggregate_signal(data, ratio, new_count, policy));
    }

    let mut events = BTreeMap::new();
    for (name, marker) in trial.events() {
        let remapped = if new_count == 0 {
            EventMarker::Missing
        } else {
            marker.map_indices(|i| Some((i / ratio).min(new_count - 1)))
        };
        events.insert(name.clone(), remapped);
    }

    Trial::from_parts(
        trial.id(),
        trial.time_origin(),
        trial.bin_size() * ratio as f64,
        new_count,
        signals,
        events,
        trial.metadata_fields().clone(),
    )
}

fn aggregate_signal(
    data: &Array2<f64>,
    ratio: usize,
    new_count: usize,
    policy: BinAggregation,
) -> Array2<f64> {
    let channels = data.ncols();
    let mut out = Array2::zeros((new_count, channels));
    for t in 0..new_count {
        for c in 0..channels {
            let mut acc = 0.0;
            for k in 0..ratio {
                acc += data[[t * ratio + k, c]];
            }
            out[[t, c]] = match policy {
                BinAggregation::Mean => acc / ratio as f64,
                BinAggregation::Sum => acc,
            };
        }
    }
    out
}
