//! Event-anchored epoch extraction.
//!
//! Slices each trial into a fixed relative-time window around a named
//! event, with an explicit per-call policy for trials whose window runs
//! off the recording. Exclusions are never silent: every extraction
//! returns an [`ExtractionReport`] counting dropped and truncated trials.

use std::collections::BTreeMap;

use ndarray::{s, Array2};
use tracing::debug;

use crate::config::{EpochWindow, InclusionPolicy};
use crate::dataset::TrialDataset;
use crate::error::Result;
use crate::trial::{EventMarker, MetaValue, Trial, TrialId};

/// Whether an epoch's window was fully available or clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    Complete,
    Truncated,
}

/// One event-anchored window sliced from a trial.
///
/// Signal arrays are copied out of the parent trial, so an epoch is an
/// independently owned value once extracted.
#[derive(Debug, Clone)]
pub struct Epoch {
    trial_id: TrialId,
    label: String,
    reference_event: String,
    /// Achieved window start relative to the event, in seconds. Equals
    /// the requested `rel_start` unless the window was clamped.
    rel_start: f64,
    bin_size: f64,
    sample_count: usize,
    status: WindowStatus,
    signals: BTreeMap<String, Array2<f64>>,
    events: BTreeMap<String, EventMarker>,
    metadata: BTreeMap<String, MetaValue>,
}

impl Epoch {
    #[must_use]
    pub fn trial_id(&self) -> TrialId {
        self.trial_id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn reference_event(&self) -> &str {
        &self.reference_event
    }

    /// Achieved window start relative to the event, in seconds.
    #[must_use]
    pub fn rel_start(&self) -> f64 {
        self.rel_start
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    #[must_use]
    pub fn status(&self) -> WindowStatus {
        self.status
    }

    /// Look up a sliced signal by name.
    #[must_use]
    pub fn signal(&self, name: &str) -> Option<&Array2<f64>> {
        self.signals.get(name)
    }
}

/// Counts of what happened to each trial during one extraction call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExtractionReport {
    /// Trials examined.
    pub requested: usize,
    /// Epochs produced.
    pub extracted: usize,
    /// Trials dropped because the reference event was absent. These are
    /// dropped under every policy.
    pub dropped_missing_event: usize,
    /// Trials dropped because the window exceeded the recording
    /// (strict policy), or lay entirely outside it (either policy).
    pub dropped_out_of_range: usize,
    /// Epochs clamped to the available samples (clamp policy only).
    pub truncated: usize,
}

/// The epochs extracted for one [`EpochWindow`], plus its report.
#[derive(Debug, Clone)]
pub struct EpochSet {
    window: EpochWindow,
    epochs: Vec<Epoch>,
    report: ExtractionReport,
}

impl EpochSet {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.window.label
    }

    #[must_use]
    pub fn window(&self) -> &EpochWindow {
        &self.window
    }

    #[must_use]
    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    #[must_use]
    pub fn report(&self) -> ExtractionReport {
        self.report
    }

    /// Re-form a [`TrialDataset`] from the epochs.
    ///
    /// Each epoch becomes a trial with the same id, a time origin equal
    /// to the achieved window start (so time zero is the reference
    /// event), event markers remapped into the window (occurrences
    /// outside it read as missing), and the source trial's metadata.
    ///
    /// # Errors
    ///
    /// Propagates `DuplicateTrial` if the same source trial somehow
    /// appears twice, which extraction itself never produces.
    pub fn into_dataset(self) -> Result<TrialDataset> {
        let mut trials = Vec::with_capacity(self.epochs.len());
        for epoch in self.epochs {
            trials.push(Trial::from_parts(
                epoch.trial_id,
                epoch.rel_start,
                epoch.bin_size,
                epoch.sample_count,
                epoch.signals,
                epoch.events,
                epoch.metadata,
            ));
        }
        TrialDataset::from_trials(trials)
    }
}

/// Extract one epoch per trial for the given window.
///
/// The reference event resolves multi-valued markers to their last
/// occurrence. A trial missing the event entirely is always dropped and
/// counted, regardless of policy.
///
/// # Errors
///
/// Returns `InvalidConfig` for an invalid window, `EmptyInput` for an
/// empty dataset, and `IncompatibleBinSize` when trials do not share one
/// bin size (windows are specified in seconds, so alignment across
/// trials requires a uniform resolution).
pub fn extract(dataset: &TrialDataset, window: &EpochWindow) -> Result<EpochSet> {
    window.validate()?;
    let bin_size = dataset.uniform_bin_size()?;

    let start_offset = (window.rel_start / bin_size).round() as isize;
    let end_offset = (window.rel_end / bin_size).round() as isize;

    let mut report = ExtractionReport {
        requested: dataset.len(),
        ..ExtractionReport::default()
    };
    let mut epochs = Vec::new();

    for trial in dataset {
        let Some(event_index) = trial.event(&window.reference_event).resolve() else {
            report.dropped_missing_event += 1;
            debug!(
                trial = %trial.id(),
                event = %window.reference_event,
                "epoch extraction dropped trial: reference event missing"
            );
            continue;
        };

        let n = trial.sample_count() as isize;
        let start = event_index as isize + start_offset;
        let end = event_index as isize + end_offset;

        let (start, end, status) = match window.policy {
            InclusionPolicy::Strict => {
                if start < 0 || end > n {
                    report.dropped_out_of_range += 1;
                    debug!(
                        trial = %trial.id(),
                        start, end, samples = n,
                        "epoch extraction dropped trial: window out of range"
                    );
                    continue;
                }
                (start, end, WindowStatus::Complete)
            }
            InclusionPolicy::Clamp => {
                let cs = start.clamp(0, n);
                let ce = end.clamp(0, n);
                if ce <= cs {
                    report.dropped_out_of_range += 1;
                    debug!(
                        trial = %trial.id(),
                        start, end, samples = n,
                        "epoch extraction dropped trial: window entirely outside recording"
                    );
                    continue;
                }
                let status = if cs == start && ce == end {
                    WindowStatus::Complete
                } else {
                    WindowStatus::Truncated
                };
                (cs, ce, status)
            }
        };

        if status == WindowStatus::Truncated {
            report.truncated += 1;
        }
        report.extracted += 1;
        epochs.push(slice_epoch(trial, window, start as usize, end as usize, status, bin_size));
    }

    Ok(EpochSet {
        window: window.clone(),
        epochs,
        report,
    })
}

/// Extract several independent epoch sets over the same dataset.
///
/// # Errors
///
/// Fails on the first invalid window; per-trial exclusions never fail.
pub fn extract_all(dataset: &TrialDataset, windows: &[EpochWindow]) -> Result<Vec<EpochSet>> {
    windows.iter().map(|w| extract(dataset, w)).collect()
}

fn slice_epoch(
    trial: &Trial,
    window: &EpochWindow,
    start: usize,
    end: usize,
    status: WindowStatus,
    bin_size: f64,
) -> Epoch {
    let len = end - start;

    let mut signals = BTreeMap::new();
    for (name, data) in trial.signals() {
        signals.insert(name.clone(), data.slice(s![start..end, ..]).to_owned());
    }

    // Shift every event into window coordinates; occurrences outside the
    // window are dropped (an event entirely outside reads as missing).
    let mut events = BTreeMap::new();
    for (name, marker) in trial.events() {
        let remapped = marker.map_indices(|i| {
            if i >= start && i < end {
                Some(i - start)
            } else {
                None
            }
        });
        events.insert(name.clone(), remapped);
    }

    let event_index = trial
        .event(&window.reference_event)
        .resolve()
        .unwrap_or(start);

    Epoch {
        trial_id: trial.id(),
        label: window.label.clone(),
        reference_event: window.reference_event.clone(),
        rel_start: (start as f64 - event_index as f64) * bin_size,
        bin_size,
        sample_count: len,
        status,
        signals,
        events,
        metadata: trial.metadata_fields().clone(),
    }
}
