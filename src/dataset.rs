//! Trial collections and pure dataset transformations.
//!
//! A [`TrialDataset`] is an ordered collection of trials with unique
//! identifiers. Every operation returns a new dataset value; the source
//! is never mutated. Chained analyses are therefore plain sequences of
//! dataset-to-dataset calls, each step independent per trial.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::error::{AnalysisError, Result};
use crate::trial::{MetaValue, Trial, TrialId};

/// Relative tolerance for treating two bin sizes as equal.
const BIN_SIZE_TOLERANCE: f64 = 1e-9;

/// An ordered, immutable collection of trials.
#[derive(Debug, Clone, Default)]
pub struct TrialDataset {
    trials: Vec<Trial>,
}

impl TrialDataset {
    /// Build a dataset from trials.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateTrial` if two trials share an identifier.
    pub fn from_trials(trials: Vec<Trial>) -> Result<Self> {
        let mut seen = std::collections::BTreeSet::new();
        for trial in &trials {
            if !seen.insert(trial.id()) {
                return Err(AnalysisError::DuplicateTrial(trial.id()));
            }
        }
        Ok(Self { trials })
    }

    /// Number of trials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trials.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Iterate over trials in dataset order.
    pub fn iter(&self) -> impl Iterator<Item = &Trial> {
        self.trials.iter()
    }

    /// Look up a trial by id.
    #[must_use]
    pub fn trial(&self, id: TrialId) -> Option<&Trial> {
        self.trials.iter().find(|t| t.id() == id)
    }

    /// Identifiers of all trials, in dataset order.
    #[must_use]
    pub fn trial_ids(&self) -> Vec<TrialId> {
        self.trials.iter().map(Trial::id).collect()
    }

    /// The single bin size shared by every trial.
    ///
    /// Cross-trial operations (rebinning, tensor assembly, metric
    /// pooling) require a uniform time resolution and call this first.
    ///
    /// # Errors
    ///
    /// Returns `EmptyInput` for an empty dataset and
    /// `IncompatibleBinSize` when trials disagree.
    pub fn uniform_bin_size(&self) -> Result<f64> {
        let first = self
            .trials
            .first()
            .ok_or_else(|| AnalysisError::empty_input("dataset has no trials"))?
            .bin_size();
        for trial in &self.trials {
            let b = trial.bin_size();
            if (b - first).abs() > BIN_SIZE_TOLERANCE * first.abs() {
                return Err(AnalysisError::incompatible_bin_size(first, b));
            }
        }
        Ok(first)
    }

    /// Keep only trials matching `predicate`.
    #[must_use]
    pub fn filter(&self, predicate: impl Fn(&Trial) -> bool) -> Self {
        Self {
            trials: self
                .trials
                .iter()
                .filter(|t| predicate(t))
                .cloned()
                .collect(),
        }
    }

    /// Replace or add the signal `name` on every trial.
    ///
    /// The transform sees the whole trial (all of its signals, events
    /// and metadata), which makes this the integration point for
    /// externally computed derived channels: a projection, a smoothed
    /// rate, a gradient.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if the transform's output row count
    /// differs from a trial's sample count, or any error the transform
    /// itself raises. Either aborts the whole call.
    pub fn map_signal(
        &self,
        name: &str,
        transform: impl Fn(&Trial) -> Result<Array2<f64>>,
    ) -> Result<Self> {
        let mut trials = Vec::with_capacity(self.trials.len());
        for trial in &self.trials {
            let derived = transform(trial)?;
            let mut out = trial.clone();
            out.replace_signal(name, derived)?;
            trials.push(out);
        }
        Ok(Self { trials })
    }

    /// Merge extra per-trial metadata fields, keyed by trial id.
    ///
    /// # Errors
    ///
    /// Returns `KeyMismatch` if any trial in the dataset has no entry in
    /// `extra`. Entries for unknown trial ids are ignored.
    pub fn join_metadata(
        &self,
        extra: &BTreeMap<TrialId, BTreeMap<String, MetaValue>>,
    ) -> Result<Self> {
        let mut trials = Vec::with_capacity(self.trials.len());
        for trial in &self.trials {
            let fields = extra
                .get(&trial.id())
                .ok_or_else(|| AnalysisError::key_mismatch(trial.id(), "metadata join"))?;
            let mut out = trial.clone();
            out.merge_metadata(fields);
            trials.push(out);
        }
        Ok(Self { trials })
    }
}

impl<'a> IntoIterator for &'a TrialDataset {
    type Item = &'a Trial;
    type IntoIter = std::slice::Iter<'a, Trial>;

    fn into_iter(self) -> Self::IntoIter {
        self.trials.iter()
    }
}
