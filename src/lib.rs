//! Trial-aligned neural time-series processing and dynamics metrics.
//!
//! This library models trial-structured recordings (variable-length,
//! multi-channel, multi-trial) paired with behavioral kinematics, and
//! computes the derived quantities used to study deterministic neural
//! dynamics and task-context separability:
//!
//! - [`TrialDataset`]: immutable trial collections with named signals,
//!   tagged event markers, and metadata; pure `filter` / `map_signal` /
//!   `join_metadata` transformations
//! - [`rebin`]: lossy time-resolution reduction with per-signal
//!   sum/average aggregation and event-index remapping
//! - [`epoch`]: event-anchored window extraction with explicit
//!   strict/clamp inclusion policies and countable exclusions
//! - [`tensor`]: condition-grouped dense tensors and condition averages
//!   for downstream dimensionality reduction
//! - [`projection`]: the fit-on-condition-means /
//!   transform-every-trial seam for external projection methods
//! - [`metrics`]: state-space tangling and boundary-corrected
//!   normalized cross-correlation
//!
//! Dataset ingestion, the dimensionality-reduction algorithms
//! themselves, plotting, and significance testing live outside this
//! crate; everything here is synchronous, allocation-owned, and free of
//! global state.
//!
//! # Quick start
//!
//! ```
//! use ndarray::Array2;
//! use trial_dynamics::{
//!     epoch, EpochWindow, EventMarker, InclusionPolicy, Trial, TrialDataset, TrialId,
//! };
//!
//! // Two trials at 10 ms resolution with a "go" cue.
//! let trials = (0..2)
//!     .map(|i| {
//!         Trial::new(TrialId(i), 0.01, 100)
//!             .with_signal(
//!                 "rates",
//!                 Array2::from_shape_fn((100, 3), |(t, c)| (t + c) as f64),
//!             )?
//!             .with_event("go", EventMarker::Single(40))
//!             .with_metadata("task", if i == 0 { "CST" } else { "RTT" })
//!             .with_signal("extra", Array2::zeros((100, 1)))
//!     })
//!     .collect::<Result<Vec<_>, _>>()?;
//! let dataset = TrialDataset::from_trials(trials)?;
//!
//! // A 500 ms movement window around the go cue.
//! let window = EpochWindow::new("move", "go", -0.2, 0.3, InclusionPolicy::Strict);
//! let set = epoch::extract(&dataset, &window)?;
//! assert_eq!(set.len(), 2);
//! assert_eq!(set.epochs()[0].sample_count(), 50);
//! # Ok::<(), trial_dynamics::AnalysisError>(())
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod dataset;
pub mod epoch;
pub mod error;
pub mod export;
pub mod metrics;
pub mod projection;
pub mod rebin;
pub mod signal_ops;
pub mod tensor;
pub mod trial;

// Re-exports for convenient access
pub use config::{BinAggregation, EpochWindow, InclusionPolicy, TanglingConfig};
pub use dataset::TrialDataset;
pub use epoch::{Epoch, EpochSet, ExtractionReport, WindowStatus};
pub use error::{AnalysisError, Result};
pub use export::{correlation_rows, signal_rows, tangling_rows, LagRow, MetricRow, SignalRow};
pub use metrics::tangling::{estimate_tangling, TanglingResult, TrialTangling};
pub use metrics::xcorr::{
    cross_correlate, cross_correlate_pair, CrossCorrelation, LagCorrelation,
};
pub use projection::{append_projection, LinearMap, PrincipalAxes, SubspaceProjector};
pub use rebin::rebin;
pub use tensor::{
    build_tensor, condition_average, event_sample_matrix, stacked_condition_means,
    ConditionBlock, ConditionMean, ConditionTensor, EventSampleMatrix, TensorSlot,
};
pub use trial::{EventMarker, MetaValue, Trial, TrialId};
