//! Tunable parameters for trial-dynamics operations.
//!
//! All parameters are passed explicitly into each operation; nothing is
//! read from the environment or from global state.
//!
//! # Example
//!
//! ```
//! use trial_dynamics::{EpochWindow, InclusionPolicy, TanglingConfig};
//!
//! let window = EpochWindow::new("move", "go", -0.2, 0.3, InclusionPolicy::Strict);
//! assert!(window.validate().is_ok());
//!
//! let config = TanglingConfig::default().with_num_sample_points(2000);
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{AnalysisError, Result};

/// Parameters for tangling estimation.
///
/// The `stability_epsilon` denominator stabilizer is the sensitive knob:
/// it bounds the tangling value when two pooled states coincide, and
/// results scale with it. Choose it relative to the squared scale of the
/// state signal (the default assumes soft-normalized rates of order one).
#[derive(Debug, Clone, PartialEq)]
pub struct TanglingConfig {
    /// Size of the random comparison subsample. `None` compares every
    /// query against the full pooled collection; set this when the pool
    /// is large enough that the quadratic scan becomes intractable.
    pub num_sample_points: Option<usize>,

    /// Denominator stabilizer preventing divide-by-near-zero blow-ups
    /// when two pooled states coincide. Mandatory and tunable; tangling
    /// values are sensitive to it.
    pub stability_epsilon: f64,
}

impl Default for TanglingConfig {
    fn default() -> Self {
        Self {
            num_sample_points: None,
            stability_epsilon: 1e-6,
        }
    }
}

impl TanglingConfig {
    /// Create a configuration with the default stabilizer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the stabilizer is not positive and finite, or
    /// if a zero-sized subsample is requested.
    pub fn validate(&self) -> Result<()> {
        if !(self.stability_epsilon > 0.0 && self.stability_epsilon.is_finite()) {
            return Err(AnalysisError::invalid_config(
                "stability_epsilon must be positive and finite",
            ));
        }
        if self.num_sample_points == Some(0) {
            return Err(AnalysisError::invalid_config(
                "num_sample_points must be at least 1",
            ));
        }
        Ok(())
    }

    /// Set the comparison subsample size.
    #[must_use]
    pub const fn with_num_sample_points(mut self, n: usize) -> Self {
        self.num_sample_points = Some(n);
        self
    }

    /// Set the denominator stabilizer.
    #[must_use]
    pub const fn with_stability_epsilon(mut self, eps: f64) -> Self {
        self.stability_epsilon = eps;
        self
    }
}

/// Policy for trials whose event-anchored window exceeds the recorded
/// samples on either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InclusionPolicy {
    /// Drop the trial (counted in the extraction report).
    Strict,
    /// Clamp the window to the available samples and flag the epoch as
    /// truncated.
    Clamp,
}

/// An event-anchored relative time window for epoch extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochWindow {
    /// Name of the produced epoch set.
    pub label: String,

    /// Event marker the window is anchored to. Multi-valued markers
    /// resolve to their last occurrence.
    pub reference_event: String,

    /// Window start relative to the event, in seconds (usually negative).
    pub rel_start: f64,

    /// Window end relative to the event, in seconds (exclusive).
    pub rel_end: f64,

    /// What to do with trials whose window runs off the recording.
    pub policy: InclusionPolicy,
}

impl EpochWindow {
    /// Create a new epoch window.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        reference_event: impl Into<String>,
        rel_start: f64,
        rel_end: f64,
        policy: InclusionPolicy,
    ) -> Self {
        Self {
            label: label.into(),
            reference_event: reference_event.into(),
            rel_start,
            rel_end,
            policy,
        }
    }

    /// Validate the window.
    ///
    /// # Errors
    ///
    /// Returns an error if the bounds are not finite or the window is
    /// empty or inverted.
    pub fn validate(&self) -> Result<()> {
        if !self.rel_start.is_finite() || !self.rel_end.is_finite() {
            return Err(AnalysisError::invalid_config(
                "epoch window bounds must be finite",
            ));
        }
        if self.rel_end <= self.rel_start {
            return Err(AnalysisError::invalid_config(
                "epoch window end must be after its start",
            ));
        }
        Ok(())
    }
}

/// Per-signal aggregation rule used when rebinning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinAggregation {
    /// Average the samples inside each new bin (continuous signals).
    #[default]
    Mean,
    /// Sum the samples inside each new bin (count-like signals).
    Sum,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tangling_config() {
        let config = TanglingConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.num_sample_points.is_none());
    }

    #[test]
    fn test_tangling_validation() {
        let mut config = TanglingConfig::default();

        config.stability_epsilon = 0.0;
        assert!(config.validate().is_err());

        config.stability_epsilon = 1e-6;
        config.num_sample_points = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_pattern() {
        let config = TanglingConfig::new()
            .with_num_sample_points(500)
            .with_stability_epsilon(1e-4);
        assert_eq!(config.num_sample_points, Some(500));
        assert_eq!(config.stability_epsilon, 1e-4);
    }

    #[test]
    fn test_window_validation() {
        let window = EpochWindow::new("move", "go", -0.2, 0.3, InclusionPolicy::Clamp);
        assert!(window.validate().is_ok());

        let inverted = EpochWindow::new("move", "go", 0.3, -0.2, InclusionPolicy::Strict);
        assert!(inverted.validate().is_err());

        let empty = EpochWindow::new("move", "go", 0.1, 0.1, InclusionPolicy::Strict);
        assert!(empty.validate().is_err());
    }
}
