//! Condition-labeled tensor assembly.
//!
//! Groups trials by a condition label and assembles dense
//! `[trial x channel x time]` blocks per condition, with the time
//! dimension equalized by a documented trimming policy. Condition and
//! trial order are stable within one build but carry no semantic meaning.
//!
//! The condition averages produced here are the fitting input for an
//! external dimensionality-reduction method: fit on condition means,
//! then transform every individual trial (see [`crate::projection`]),
//! so that trial-to-trial variability survives in the output while the
//! discovered axes separate condition means.

use ndarray::{concatenate, Array2, Array3, Array4, Axis};
use tracing::{debug, warn};

use crate::dataset::TrialDataset;
use crate::error::{AnalysisError, Result};
use crate::trial::{Trial, TrialId};

/// One condition's dense `[trial x channel x time]` block.
#[derive(Debug, Clone)]
pub struct ConditionBlock {
    /// The condition label value.
    pub condition: String,
    /// Trial ids in block order (slot traceability).
    pub trial_ids: Vec<TrialId>,
    /// `[trial x channel x time]`.
    pub data: Array3<f64>,
}

/// A tensor slot's provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TensorSlot {
    pub condition_index: usize,
    pub trial_index: usize,
    pub trial_id: TrialId,
    pub condition: String,
}

/// Dense condition-grouped trial data for one signal.
#[derive(Debug, Clone)]
pub struct ConditionTensor {
    signal: String,
    condition_label: String,
    blocks: Vec<ConditionBlock>,
    excluded_short: usize,
}

impl ConditionTensor {
    /// The signal this tensor was built from.
    #[must_use]
    pub fn signal(&self) -> &str {
        &self.signal
    }

    /// The metadata field used as the condition label.
    #[must_use]
    pub fn condition_label(&self) -> &str {
        &self.condition_label
    }

    /// Per-condition blocks, in first-appearance order.
    #[must_use]
    pub fn blocks(&self) -> &[ConditionBlock] {
        &self.blocks
    }

    /// Trials excluded for being shorter than a fixed target length.
    #[must_use]
    pub fn excluded_short(&self) -> usize {
        self.excluded_short
    }

    /// Mapping from every tensor slot to its trial and condition value.
    #[must_use]
    pub fn slots(&self) -> Vec<TensorSlot> {
        let mut slots = Vec::new();
        for (ci, block) in self.blocks.iter().enumerate() {
            for (ti, &trial_id) in block.trial_ids.iter().enumerate() {
                slots.push(TensorSlot {
                    condition_index: ci,
                    trial_index: ti,
                    trial_id,
                    condition: block.condition.clone(),
                });
            }
        }
        slots
    }

    /// The single dense `[condition x trial x channel x time]` array.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` when trial counts or equalized time
    /// lengths differ across conditions (use [`Self::blocks`] for the
    /// ragged case).
    pub fn to_array4(&self) -> Result<Array4<f64>> {
        let first = self
            .blocks
            .first()
            .ok_or_else(|| AnalysisError::empty_input("condition tensor has no blocks"))?;
        let (trials, channels, time) = first.data.dim();
        for block in &self.blocks {
            if block.data.dim() != (trials, channels, time) {
                return Err(AnalysisError::sample_mismatch(
                    format!("condition '{}'", block.condition),
                    time,
                    block.data.dim().2,
                ));
            }
        }
        let mut out = Array4::zeros((self.blocks.len(), trials, channels, time));
        for (ci, block) in self.blocks.iter().enumerate() {
            out.index_axis_mut(Axis(0), ci).assign(&block.data);
        }
        Ok(out)
    }

    /// Reduce the trial axis by mean, per condition.
    ///
    /// Returns `[time x channel]` means in block order, matching the
    /// signal layout used everywhere else.
    #[must_use]
    pub fn condition_means(&self) -> Vec<ConditionMean> {
        self.blocks
            .iter()
            .map(|block| {
                let (trials, channels, time) = block.data.dim();
                let mut mean = Array2::zeros((time, channels));
                for k in 0..trials {
                    for c in 0..channels {
                        for t in 0..time {
                            mean[[t, c]] += block.data[[k, c, t]];
                        }
                    }
                }
                mean /= trials as f64;
                ConditionMean {
                    condition: block.condition.clone(),
                    trials,
                    mean,
                }
            })
            .collect()
    }
}

/// A condition's trial-averaged signal.
#[derive(Debug, Clone)]
pub struct ConditionMean {
    pub condition: String,
    /// Number of trials averaged.
    pub trials: usize,
    /// `[time x channel]`.
    pub mean: Array2<f64>,
}

/// Group trials by `condition_label` and assemble dense blocks of
/// `signal`.
///
/// Within each condition the time dimension is equalized to the shortest
/// trial's sample count. When `target_length` is given, shorter trials
/// are excluded (counted on the result) and longer trials truncated, so
/// every block shares that length.
///
/// # Errors
///
/// Structural failures abort the call: a trial missing the signal
/// (`UnknownSignal`), missing the condition label (`KeyMismatch`),
/// disagreeing channel counts (`ShapeMismatch`), mixed bin sizes
/// (`IncompatibleBinSize`), or an empty dataset (`EmptyInput`).
pub fn build_tensor(
    dataset: &TrialDataset,
    signal: &str,
    condition_label: &str,
    target_length: Option<usize>,
) -> Result<ConditionTensor> {
    dataset.uniform_bin_size()?;
    let groups = group_by_condition(dataset, signal, condition_label)?;

    let mut blocks = Vec::new();
    let mut excluded_short = 0;
    for (condition, trials) in groups {
        let (kept, time) = match target_length {
            Some(target) => {
                let kept: Vec<&Trial> = trials
                    .iter()
                    .copied()
                    .filter(|t| {
                        let keep = t.sample_count() >= target;
                        if !keep {
                            excluded_short += 1;
                            debug!(
                                trial = %t.id(),
                                samples = t.sample_count(),
                                target_length = target,
                                "tensor build excluded short trial"
                            );
                        }
                        keep
                    })
                    .collect();
                (kept, target)
            }
            None => {
                let min = trials
                    .iter()
                    .map(|t| t.sample_count())
                    .min()
                    .unwrap_or(0);
                (trials, min)
            }
        };

        if kept.is_empty() || time == 0 {
            warn!(condition = %condition, "tensor build produced no usable trials for condition");
            continue;
        }

        let channels = channel_count(&kept, signal)?;
        let mut data = Array3::zeros((kept.len(), channels, time));
        let mut trial_ids = Vec::with_capacity(kept.len());
        for (k, trial) in kept.iter().enumerate() {
            let sig = trial.signal_required(signal)?;
            for c in 0..channels {
                for t in 0..time {
                    data[[k, c, t]] = sig[[t, c]];
                }
            }
            trial_ids.push(trial.id());
        }

        blocks.push(ConditionBlock {
            condition,
            trial_ids,
            data,
        });
    }

    Ok(ConditionTensor {
        signal: signal.to_owned(),
        condition_label: condition_label.to_owned(),
        blocks,
        excluded_short,
    })
}

/// Condition-averaged `[time x channel]` signals, one per condition.
///
/// Equivalent to [`build_tensor`] followed by
/// [`ConditionTensor::condition_means`].
///
/// # Errors
///
/// Same structural failures as [`build_tensor`].
pub fn condition_average(
    dataset: &TrialDataset,
    signal: &str,
    condition_label: &str,
    target_length: Option<usize>,
) -> Result<Vec<ConditionMean>> {
    Ok(build_tensor(dataset, signal, condition_label, target_length)?.condition_means())
}

/// Concatenate condition means along the time axis into one
/// `[stacked-time x channel]` matrix, the fitting input for an external
/// dimensionality-reduction method.
///
/// # Errors
///
/// Returns `EmptyInput` when no means are supplied.
pub fn stacked_condition_means(means: &[ConditionMean]) -> Result<Array2<f64>> {
    if means.is_empty() {
        return Err(AnalysisError::empty_input("no condition means to stack"));
    }
    let views: Vec<_> = means.iter().map(|m| m.mean.view()).collect();
    concatenate(Axis(0), &views).map_err(|_| {
        AnalysisError::channel_mismatch(
            "condition means",
            means[0].mean.ncols(),
            means.last().map_or(0, |m| m.mean.ncols()),
        )
    })
}

/// Per-trial signal vectors sampled at a fixed offset from an event.
#[derive(Debug, Clone)]
pub struct EventSampleMatrix {
    /// One row per kept trial: the signal's channel vector at
    /// `event index + offset`.
    pub rows: Array2<f64>,
    /// Condition label per row.
    pub labels: Vec<String>,
    /// Trial id per row.
    pub trial_ids: Vec<TrialId>,
    /// Trials dropped for a missing event or an out-of-range sample.
    pub dropped: usize,
}

/// Gather, across trials, the signal vector at `offset` bins from the
/// reference event, labeled by condition.
///
/// This is the input shape taken by at-a-timepoint context models (a
/// discriminant fit on the population state a fixed delay after an
/// event). Trials missing the event or whose sampled index falls outside
/// the recording are dropped and counted, not failed.
///
/// # Errors
///
/// Structural failures only: `UnknownSignal`, `KeyMismatch` (condition
/// label missing), `ShapeMismatch` (channel disagreement), `EmptyInput`
/// when no trial survives.
pub fn event_sample_matrix(
    dataset: &TrialDataset,
    signal: &str,
    reference_event: &str,
    offset: isize,
    condition_label: &str,
) -> Result<EventSampleMatrix> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut labels = Vec::new();
    let mut trial_ids = Vec::new();
    let mut dropped = 0;
    let mut channels: Option<usize> = None;

    for trial in dataset {
        let sig = trial.signal_required(signal)?;
        let label = trial
            .label(condition_label)
            .ok_or_else(|| AnalysisError::key_mismatch(trial.id(), "condition label"))?;

        let expected = *channels.get_or_insert_with(|| sig.ncols());
        if sig.ncols() != expected {
            return Err(AnalysisError::channel_mismatch(signal, expected, sig.ncols()));
        }

        let Some(event_index) = trial.event(reference_event).resolve() else {
            dropped += 1;
            debug!(trial = %trial.id(), event = reference_event, "event sample dropped trial: event missing");
            continue;
        };
        let index = event_index as isize + offset;
        if index < 0 || index >= trial.sample_count() as isize {
            dropped += 1;
            debug!(trial = %trial.id(), index, "event sample dropped trial: sample out of range");
            continue;
        }

        rows.push(sig.row(index as usize).to_vec());
        labels.push(label);
        trial_ids.push(trial.id());
    }

    if rows.is_empty() {
        return Err(AnalysisError::empty_input(
            "no trial provided a sample at the requested event offset",
        ));
    }

    let channels = channels.unwrap_or(0);
    let matrix = Array2::from_shape_fn((rows.len(), channels), |(i, j)| rows[i][j]);

    Ok(EventSampleMatrix {
        rows: matrix,
        labels,
        trial_ids,
        dropped,
    })
}

/// Group trials by the condition label's rendered value, preserving
/// first-appearance order.
fn group_by_condition<'a>(
    dataset: &'a TrialDataset,
    signal: &str,
    condition_label: &str,
) -> Result<Vec<(String, Vec<&'a Trial>)>> {
    if dataset.is_empty() {
        return Err(AnalysisError::empty_input("dataset has no trials"));
    }
    let mut groups: Vec<(String, Vec<&Trial>)> = Vec::new();
    for trial in dataset {
        trial.signal_required(signal)?;
        let label = trial
            .label(condition_label)
            .ok_or_else(|| AnalysisError::key_mismatch(trial.id(), "condition label"))?;
        match groups.iter_mut().find(|(l, _)| *l == label) {
            Some((_, members)) => members.push(trial),
            None => groups.push((label, vec![trial])),
        }
    }
    Ok(groups)
}

fn channel_count(trials: &[&Trial], signal: &str) -> Result<usize> {
    let mut channels: Option<usize> = None;
    for trial in trials {
        let sig = trial.signal_required(signal)?;
        let expected = *channels.get_or_insert_with(|| sig.ncols());
        if sig.ncols() != expected {
            return Err(AnalysisError::channel_mismatch(signal, expected, sig.ncols()));
        }
    }
    channels.ok_or_else(|| AnalysisError::empty_input("no trials in condition group"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::TrialId;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn trial(id: u64, samples: usize, task: &str, fill: f64) -> Trial {
        Trial::new(TrialId(id), 0.01, samples)
            .with_signal("rates", Array2::from_elem((samples, 2), fill))
            .unwrap()
            .with_event("go", crate::trial::EventMarker::Single(4))
            .with_metadata("task", task)
    }

    fn dataset() -> TrialDataset {
        TrialDataset::from_trials(vec![
            trial(1, 10, "A", 1.0),
            trial(2, 12, "A", 3.0),
            trial(3, 8, "B", 5.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_min_length_equalization() {
        let tensor = build_tensor(&dataset(), "rates", "task", None).unwrap();
        assert_eq!(tensor.blocks().len(), 2);

        let a = &tensor.blocks()[0];
        assert_eq!(a.condition, "A");
        assert_eq!(a.data.dim(), (2, 2, 10));

        let b = &tensor.blocks()[1];
        assert_eq!(b.condition, "B");
        assert_eq!(b.data.dim(), (1, 2, 8));
    }

    #[test]
    fn test_fixed_target_excludes_short() {
        let tensor = build_tensor(&dataset(), "rates", "task", Some(9)).unwrap();
        assert_eq!(tensor.excluded_short(), 1);
        // B's only trial (8 samples) is excluded; its block disappears.
        assert_eq!(tensor.blocks().len(), 1);
        assert_eq!(tensor.blocks()[0].data.dim(), (2, 2, 9));
    }

    #[test]
    fn test_slot_traceability() {
        let tensor = build_tensor(&dataset(), "rates", "task", None).unwrap();
        let slots = tensor.slots();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].trial_id, TrialId(1));
        assert_eq!(slots[0].condition, "A");
        assert_eq!(slots[2].trial_id, TrialId(3));
        assert_eq!(slots[2].condition, "B");
    }

    #[test]
    fn test_condition_means() {
        let means = condition_average(&dataset(), "rates", "task", None).unwrap();
        assert_eq!(means.len(), 2);
        // A averages fills 1.0 and 3.0.
        assert_relative_eq!(means[0].mean[[0, 0]], 2.0, epsilon = 1e-12);
        assert_eq!(means[0].trials, 2);
        assert_relative_eq!(means[1].mean[[0, 1]], 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_stacked_means_concatenate_time() {
        let means = condition_average(&dataset(), "rates", "task", None).unwrap();
        let stacked = stacked_condition_means(&means).unwrap();
        assert_eq!(stacked.dim(), (18, 2));
    }

    #[test]
    fn test_to_array4_requires_uniform_blocks() {
        let tensor = build_tensor(&dataset(), "rates", "task", None).unwrap();
        assert!(tensor.to_array4().is_err());

        let uniform = TrialDataset::from_trials(vec![
            trial(1, 10, "A", 1.0),
            trial(2, 10, "B", 2.0),
        ])
        .unwrap();
        let tensor = build_tensor(&uniform, "rates", "task", None).unwrap();
        let arr = tensor.to_array4().unwrap();
        assert_eq!(arr.dim(), (2, 1, 2, 10));
    }

    #[test]
    fn test_missing_label_is_structural() {
        let unlabeled = TrialDataset::from_trials(vec![trial(1, 10, "A", 1.0)])
            .unwrap();
        assert!(matches!(
            build_tensor(&unlabeled, "rates", "target", None),
            Err(AnalysisError::KeyMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_signal_is_structural() {
        assert!(matches!(
            build_tensor(&dataset(), "absent", "task", None),
            Err(AnalysisError::UnknownSignal(_))
        ));
    }

    #[test]
    fn test_event_sample_matrix() {
        let ds = dataset();
        let m = event_sample_matrix(&ds, "rates", "go", 3, "task").unwrap();
        assert_eq!(m.rows.dim(), (3, 2));
        assert_eq!(m.labels, vec!["A", "A", "B"]);
        assert_eq!(m.dropped, 0);

        // Offset pushing past trial 3's 8 samples drops it.
        let m = event_sample_matrix(&ds, "rates", "go", 5, "task").unwrap();
        assert_eq!(m.rows.dim(), (2, 2));
        assert_eq!(m.dropped, 1);
    }
}
