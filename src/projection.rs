//! The dimensionality-reduction seam.
//!
//! The analysis consumes projection methods as opaque fit/transform
//! capabilities; the methods themselves live outside this crate. What is
//! fixed here is the contract: fit on stacked condition means, transform
//! every individual trial, and preserve the sample count along the time
//! axis. [`LinearMap`] wraps externally computed axes;
//! [`PrincipalAxes`] is a minimal in-crate reference projector used to
//! exercise the seam.

use ndarray::{Array1, Array2, ArrayView2};

use nalgebra::{DMatrix, SymmetricEigen};

use crate::dataset::TrialDataset;
use crate::error::{AnalysisError, Result};
use crate::tensor::{condition_average, stacked_condition_means};

/// An opaque projection consumed by the analysis.
///
/// `transform` must preserve the row (time) count of its input; callers
/// treat any channel count coming out of it as the derived dimension.
pub trait SubspaceProjector {
    /// Fit the projection to `[stacked-time x channel]` data.
    fn fit(&mut self, data: ArrayView2<'_, f64>) -> Result<()>;

    /// Project `[time x channel]` data into the derived space.
    fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>>;
}

/// A fixed linear projection with externally computed weights.
///
/// The weight matrix is `[channel x component]`; transforming a
/// `[time x channel]` signal yields `[time x component]`. This is the
/// integration point for axes produced by an external method (a joint
/// subspace, a discriminant axis, a demixed component).
#[derive(Debug, Clone)]
pub struct LinearMap {
    weights: Array2<f64>,
}

impl LinearMap {
    /// Wrap a `[channel x component]` weight matrix.
    #[must_use]
    pub fn from_weights(weights: Array2<f64>) -> Self {
        Self { weights }
    }

    /// Wrap a single `[channel]` axis, normalized to unit length, as a
    /// one-component projection.
    ///
    /// # Errors
    ///
    /// Returns `EmptyInput` for an empty or zero-norm axis.
    pub fn from_unit_axis(axis: &[f64]) -> Result<Self> {
        let norm = axis.iter().map(|v| v * v).sum::<f64>().sqrt();
        if axis.is_empty() || norm == 0.0 {
            return Err(AnalysisError::empty_input("projection axis has no magnitude"));
        }
        let weights = Array2::from_shape_fn((axis.len(), 1), |(i, _)| axis[i] / norm);
        Ok(Self { weights })
    }

    #[must_use]
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }
}

impl SubspaceProjector for LinearMap {
    fn fit(&mut self, _data: ArrayView2<'_, f64>) -> Result<()> {
        // Weights are externally computed; nothing to fit.
        Ok(())
    }

    fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if data.ncols() != self.weights.nrows() {
            return Err(AnalysisError::channel_mismatch(
                "linear map input",
                self.weights.nrows(),
                data.ncols(),
            ));
        }
        Ok(data.dot(&self.weights))
    }
}

/// A minimal principal-axes projector.
///
/// Centers the fitting data, eigendecomposes its covariance, and keeps
/// the top `components` axes in descending eigenvalue order with a
/// deterministic sign convention (largest-magnitude entry positive).
/// This is a reference implementation of the seam, not a substitute for
/// the external dimensionality-reduction family.
#[derive(Debug, Clone)]
pub struct PrincipalAxes {
    components: usize,
    mean: Option<Array1<f64>>,
    axes: Option<Array2<f64>>,
    eigenvalues: Vec<f64>,
}

impl PrincipalAxes {
    /// Create an unfitted projector keeping `components` axes.
    #[must_use]
    pub fn new(components: usize) -> Self {
        Self {
            components,
            mean: None,
            axes: None,
            eigenvalues: Vec::new(),
        }
    }

    /// Eigenvalues of the kept axes, descending. Empty before fitting.
    #[must_use]
    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }

    /// The fitted `[channel x component]` axes.
    #[must_use]
    pub fn axes(&self) -> Option<&Array2<f64>> {
        self.axes.as_ref()
    }
}

impl SubspaceProjector for PrincipalAxes {
    fn fit(&mut self, data: ArrayView2<'_, f64>) -> Result<()> {
        let (n, channels) = data.dim();
        if n < 2 {
            return Err(AnalysisError::empty_input(
                "principal axes need at least two samples",
            ));
        }
        if self.components == 0 || self.components > channels {
            return Err(AnalysisError::invalid_config(format!(
                "components must be in 1..={channels}"
            )));
        }

        let mut mean = Array1::zeros(channels);
        for row in data.rows() {
            mean += &row;
        }
        mean /= n as f64;

        // Covariance of the centered data.
        let mut cov = DMatrix::zeros(channels, channels);
        for row in data.rows() {
            for i in 0..channels {
                let di = row[i] - mean[i];
                for j in i..channels {
                    cov[(i, j)] += di * (row[j] - mean[j]);
                }
            }
        }
        for i in 0..channels {
            for j in 0..i {
                cov[(i, j)] = cov[(j, i)];
            }
        }
        cov /= (n - 1) as f64;

        let eigen = SymmetricEigen::new(cov);

        // Sort eigenpairs descending.
        let mut order: Vec<usize> = (0..channels).collect();
        order.sort_by(|&a, &b| {
            eigen.eigenvalues[b]
                .partial_cmp(&eigen.eigenvalues[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut axes = Array2::zeros((channels, self.components));
        let mut eigenvalues = Vec::with_capacity(self.components);
        for (k, &idx) in order.iter().take(self.components).enumerate() {
            let column = eigen.eigenvectors.column(idx);

            // Deterministic sign: largest-magnitude entry positive.
            let dominant = (0..channels)
                .max_by(|&a, &b| {
                    column[a]
                        .abs()
                        .partial_cmp(&column[b].abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(0);
            let sign = if column[dominant] < 0.0 { -1.0 } else { 1.0 };

            for c in 0..channels {
                axes[[c, k]] = sign * column[c];
            }
            eigenvalues.push(eigen.eigenvalues[idx]);
        }

        self.mean = Some(mean);
        self.axes = Some(axes);
        self.eigenvalues = eigenvalues;
        Ok(())
    }

    fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let (axes, mean) = match (&self.axes, &self.mean) {
            (Some(a), Some(m)) => (a, m),
            _ => {
                return Err(AnalysisError::invalid_config(
                    "principal axes must be fitted before transforming",
                ))
            }
        };
        if data.ncols() != axes.nrows() {
            return Err(AnalysisError::channel_mismatch(
                "principal axes input",
                axes.nrows(),
                data.ncols(),
            ));
        }
        let centered = &data - &mean.view().insert_axis(ndarray::Axis(0));
        Ok(centered.dot(axes))
    }
}

/// Append a derived signal produced by the two-step projection contract.
///
/// Fits `projector` on the stacked condition means of `source` (grouped
/// by `condition_label`), then transforms every individual trial and
/// attaches the result as `derived`. Fitting on means makes the
/// discovered axes separate condition means; transforming raw trials
/// preserves trial-to-trial variability in the output.
///
/// # Errors
///
/// Propagates structural errors from tensor assembly, fitting and
/// transforming; `map_signal`'s sample-count check enforces that the
/// projector preserved the time axis.
pub fn append_projection(
    dataset: &TrialDataset,
    projector: &mut dyn SubspaceProjector,
    source: &str,
    derived: &str,
    condition_label: &str,
) -> Result<TrialDataset> {
    let means = condition_average(dataset, source, condition_label, None)?;
    let fit_input = stacked_condition_means(&means)?;
    projector.fit(fit_input.view())?;

    let projector: &dyn SubspaceProjector = projector;
    dataset.map_signal(derived, |trial| {
        let sig = trial.signal_required(source)?;
        projector.transform(sig.view())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::{Trial, TrialId};
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    #[test]
    fn test_linear_map_projects() {
        let map = LinearMap::from_weights(array![[1.0, 0.0], [0.0, 2.0], [0.0, 0.0]]);
        let data = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let out = map.transform(data.view()).unwrap();
        assert_eq!(out.dim(), (2, 2));
        assert_relative_eq!(out[[0, 0]], 1.0);
        assert_relative_eq!(out[[1, 1]], 10.0);
    }

    #[test]
    fn test_linear_map_channel_check() {
        let map = LinearMap::from_weights(Array2::zeros((4, 2)));
        let data = Array2::zeros((5, 3));
        assert!(map.transform(data.view()).is_err());
    }

    #[test]
    fn test_unit_axis_normalizes() {
        let map = LinearMap::from_unit_axis(&[3.0, 4.0]).unwrap();
        let w = map.weights();
        assert_relative_eq!(w[[0, 0]], 0.6, epsilon = 1e-12);
        assert_relative_eq!(w[[1, 0]], 0.8, epsilon = 1e-12);
        assert!(LinearMap::from_unit_axis(&[0.0, 0.0]).is_err());
    }

    #[test]
    fn test_principal_axes_finds_variance_direction() {
        // Variance concentrated on the first channel.
        let data = Array2::from_shape_fn((50, 3), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                0.1 * (i as f64 * 0.7).sin()
            }
        });
        let mut pca = PrincipalAxes::new(2);
        pca.fit(data.view()).unwrap();

        let axes = pca.axes().unwrap();
        assert!(axes[[0, 0]].abs() > 0.99);
        assert!(pca.eigenvalues()[0] > pca.eigenvalues()[1]);

        let out = pca.transform(data.view()).unwrap();
        assert_eq!(out.dim(), (50, 2));
    }

    #[test]
    fn test_principal_axes_requires_fit() {
        let pca = PrincipalAxes::new(1);
        assert!(pca.transform(Array2::zeros((3, 2)).view()).is_err());
    }

    #[test]
    fn test_append_projection_two_step() {
        let make = |id: u64, task: &str, scale: f64| {
            Trial::new(TrialId(id), 0.01, 20)
                .with_signal(
                    "rates",
                    Array2::from_shape_fn((20, 3), |(i, j)| {
                        scale * (i as f64 + 1.0) * (j as f64 + 1.0)
                    }),
                )
                .unwrap()
                .with_metadata("task", task)
        };
        let ds = crate::dataset::TrialDataset::from_trials(vec![
            make(1, "CST", 1.0),
            make(2, "CST", 1.1),
            make(3, "RTT", -1.0),
        ])
        .unwrap();

        let mut pca = PrincipalAxes::new(2);
        let out = append_projection(&ds, &mut pca, "rates", "rates_pca", "task").unwrap();

        for trial in &out {
            let derived = trial.signal("rates_pca").unwrap();
            assert_eq!(derived.dim(), (20, 2));
        }
        // Source dataset untouched.
        assert!(ds.iter().all(|t| t.signal("rates_pca").is_none()));
    }
}
