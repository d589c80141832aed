//! Error types for trial-dynamics operations.
//!
//! Only *structural* failures (caller contract violations) surface as
//! errors and abort a call. Per-trial data-quality conditions (a missing
//! reference event, a truncated window, a degenerate correlation lag) are
//! reported as counts and flags on the operation's result instead, so a
//! batch never fails because one trial is bad.

use crate::trial::TrialId;
use thiserror::Error;

/// Main error type for trial-dynamics operations.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// A signal array does not have the expected shape.
    #[error("shape mismatch for '{name}': expected {expected} {axis}, got {actual}")]
    ShapeMismatch {
        name: String,
        axis: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Requested bin size is not an integer multiple of the current one.
    #[error("incompatible bin size: {requested} is not an integer multiple of {current}")]
    IncompatibleBinSize { current: f64, requested: f64 },

    /// A per-trial lookup (metadata join, condition label) has no entry
    /// for a trial that is present in the dataset.
    #[error("missing entry for trial {trial}: {context}")]
    KeyMismatch { trial: TrialId, context: String },

    /// A named signal is not present on a trial.
    #[error("unknown signal '{0}'")]
    UnknownSignal(String),

    /// Two trials in one dataset share an identifier.
    #[error("duplicate trial id {0}")]
    DuplicateTrial(TrialId),

    /// Every lag of a cross-correlation is undefined.
    #[error("degenerate series: {0}")]
    DegenerateSeries(String),

    /// Parameter validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An operation received no usable input.
    #[error("empty input: {0}")]
    EmptyInput(String),
}

/// Result type alias for trial-dynamics operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    /// Create a shape mismatch error for a sample-count violation.
    #[must_use]
    pub fn sample_mismatch(name: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            name: name.into(),
            axis: "samples",
            expected,
            actual,
        }
    }

    /// Create a shape mismatch error for a channel-count violation.
    #[must_use]
    pub fn channel_mismatch(name: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            name: name.into(),
            axis: "channels",
            expected,
            actual,
        }
    }

    /// Create an incompatible bin size error.
    #[must_use]
    pub const fn incompatible_bin_size(current: f64, requested: f64) -> Self {
        Self::IncompatibleBinSize { current, requested }
    }

    /// Create a key mismatch error.
    #[must_use]
    pub fn key_mismatch(trial: TrialId, context: impl Into<String>) -> Self {
        Self::KeyMismatch {
            trial,
            context: context.into(),
        }
    }

    /// Create an unknown signal error.
    #[must_use]
    pub fn unknown_signal(name: impl Into<String>) -> Self {
        Self::UnknownSignal(name.into())
    }

    /// Create a degenerate series error.
    #[must_use]
    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateSeries(msg.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an empty input error.
    #[must_use]
    pub fn empty_input(msg: impl Into<String>) -> Self {
        Self::EmptyInput(msg.into())
    }
}
