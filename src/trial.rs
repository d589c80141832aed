//! Single-trial value types.
//!
//! A [`Trial`] is one complete behavioral episode: a uniform time axis,
//! named `[time x channel]` signal arrays, named event markers, and
//! scalar/categorical metadata. Trials are plain values; every dataset
//! operation produces new trials rather than mutating existing ones.

use std::collections::BTreeMap;
use std::fmt;

use ndarray::Array2;

use crate::error::{AnalysisError, Result};

/// Unique trial identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrialId(pub u64);

impl fmt::Display for TrialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named event's time-sample indices within one trial.
///
/// Source recordings store events as either a scalar or a list of
/// indices, and sometimes omit them entirely. That ambiguity is made
/// explicit here. Consumption points that need a single index use
/// [`EventMarker::resolve`], which takes the *last* occurrence, the rule
/// used to disambiguate compound hold events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventMarker {
    /// The event did not occur in this trial.
    Missing,
    /// The event occurred once.
    Single(usize),
    /// The event occurred repeatedly; indices are sorted ascending.
    Multiple(Vec<usize>),
}

impl EventMarker {
    /// Build a marker from a list of sample indices.
    ///
    /// Indices are sorted and deduplicated; zero indices yield
    /// [`EventMarker::Missing`], one yields [`EventMarker::Single`].
    #[must_use]
    pub fn from_indices(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        match indices.len() {
            0 => Self::Missing,
            1 => Self::Single(indices[0]),
            _ => Self::Multiple(indices),
        }
    }

    /// Resolve to a single sample index: the last occurrence, or `None`
    /// when the event is missing.
    #[must_use]
    pub fn resolve(&self) -> Option<usize> {
        match self {
            Self::Missing => None,
            Self::Single(i) => Some(*i),
            Self::Multiple(v) => v.last().copied(),
        }
    }

    /// Whether the event is absent.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// All occurrence indices, in ascending order.
    #[must_use]
    pub fn indices(&self) -> Vec<usize> {
        match self {
            Self::Missing => Vec::new(),
            Self::Single(i) => vec![*i],
            Self::Multiple(v) => v.clone(),
        }
    }

    /// Apply `f` to every occurrence index, keeping only the indices for
    /// which `f` returns `Some`. Collapses duplicates produced by `f`.
    #[must_use]
    pub fn map_indices(&self, f: impl Fn(usize) -> Option<usize>) -> Self {
        Self::from_indices(self.indices().into_iter().filter_map(f).collect())
    }
}

/// A scalar or categorical metadata value attached to a trial.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MetaValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Flag(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for MetaValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        Self::Flag(b)
    }
}

static MISSING: EventMarker = EventMarker::Missing;

/// One complete behavioral episode with its own time axis.
///
/// Invariant: every attached signal has exactly `sample_count` rows, and
/// all signals share the trial's bin size. Construction enforces this.
#[derive(Debug, Clone)]
pub struct Trial {
    id: TrialId,
    time_origin: f64,
    bin_size: f64,
    sample_count: usize,
    signals: BTreeMap<String, Array2<f64>>,
    events: BTreeMap<String, EventMarker>,
    metadata: BTreeMap<String, MetaValue>,
}

impl Trial {
    /// Create an empty trial with the given time axis.
    ///
    /// `bin_size` is in seconds; the time origin defaults to zero (the
    /// time of sample 0).
    #[must_use]
    pub fn new(id: TrialId, bin_size: f64, sample_count: usize) -> Self {
        Self {
            id,
            time_origin: 0.0,
            bin_size,
            sample_count,
            signals: BTreeMap::new(),
            events: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Set the time of sample 0, in seconds.
    #[must_use]
    pub fn with_time_origin(mut self, origin: f64) -> Self {
        self.time_origin = origin;
        self
    }

    /// Attach a `[time x channel]` signal array.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if the array's row count differs from the
    /// trial's sample count.
    pub fn with_signal(mut self, name: impl Into<String>, data: Array2<f64>) -> Result<Self> {
        let name = name.into();
        if data.nrows() != self.sample_count {
            return Err(AnalysisError::sample_mismatch(
                name,
                self.sample_count,
                data.nrows(),
            ));
        }
        self.signals.insert(name, data);
        Ok(self)
    }

    /// Attach an event marker.
    #[must_use]
    pub fn with_event(mut self, name: impl Into<String>, marker: EventMarker) -> Self {
        self.events.insert(name.into(), marker);
        self
    }

    /// Attach a metadata field.
    #[must_use]
    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    /// Rebuild a trial from already-validated parts. Used by operations
    /// that derive new trials (rebinning, epoch export).
    pub(crate) fn from_parts(
        id: TrialId,
        time_origin: f64,
        bin_size: f64,
        sample_count: usize,
        signals: BTreeMap<String, Array2<f64>>,
        events: BTreeMap<String, EventMarker>,
        metadata: BTreeMap<String, MetaValue>,
    ) -> Self {
        debug_assert!(signals.values().all(|s| s.nrows() == sample_count));
        Self {
            id,
            time_origin,
            bin_size,
            sample_count,
            signals,
            events,
            metadata,
        }
    }

    /// Replace or add a signal, keeping the sample-count invariant.
    pub(crate) fn replace_signal(&mut self, name: &str, data: Array2<f64>) -> Result<()> {
        if data.nrows() != self.sample_count {
            return Err(AnalysisError::sample_mismatch(
                name,
                self.sample_count,
                data.nrows(),
            ));
        }
        self.signals.insert(name.to_owned(), data);
        Ok(())
    }

    pub(crate) fn signals(&self) -> &BTreeMap<String, Array2<f64>> {
        &self.signals
    }

    pub(crate) fn merge_metadata(&mut self, extra: &BTreeMap<String, MetaValue>) {
        for (k, v) in extra {
            self.metadata.insert(k.clone(), v.clone());
        }
    }

    #[must_use]
    pub fn id(&self) -> TrialId {
        self.id
    }

    /// Time of sample 0, in seconds.
    #[must_use]
    pub fn time_origin(&self) -> f64 {
        self.time_origin
    }

    /// Bin size in seconds, shared by every signal of this trial.
    #[must_use]
    pub fn bin_size(&self) -> f64 {
        self.bin_size
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Time of sample `index`, in seconds.
    #[must_use]
    pub fn time_at(&self, index: usize) -> f64 {
        self.time_origin + index as f64 * self.bin_size
    }

    /// Look up a signal by name.
    #[must_use]
    pub fn signal(&self, name: &str) -> Option<&Array2<f64>> {
        self.signals.get(name)
    }

    /// Look up a signal by name, failing with `UnknownSignal`.
    pub fn signal_required(&self, name: &str) -> Result<&Array2<f64>> {
        self.signals
            .get(name)
            .ok_or_else(|| AnalysisError::unknown_signal(name))
    }

    /// Names of all attached signals.
    pub fn signal_names(&self) -> impl Iterator<Item = &str> {
        self.signals.keys().map(String::as_str)
    }

    /// Look up an event marker; absent entries read as `Missing`.
    #[must_use]
    pub fn event(&self, name: &str) -> &EventMarker {
        self.events.get(name).unwrap_or(&MISSING)
    }

    /// All event markers of this trial.
    #[must_use]
    pub fn events(&self) -> &BTreeMap<String, EventMarker> {
        &self.events
    }

    /// Look up a metadata field.
    #[must_use]
    pub fn metadata(&self, name: &str) -> Option<&MetaValue> {
        self.metadata.get(name)
    }

    /// All metadata fields of this trial.
    #[must_use]
    pub fn metadata_fields(&self) -> &BTreeMap<String, MetaValue> {
        &self.metadata
    }

    /// A metadata field rendered as a condition-label string.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<String> {
        self.metadata.get(name).map(ToString::to_string)
    }
}
