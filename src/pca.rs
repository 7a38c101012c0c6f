use crate::algorithm::{Algorithm, StopFlag, Unsupervised};
use crate::linalg::{svd, svd_flip};
use crate::{DecompositionError, InvalidSetting};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Principal component analysis.
///
/// This reduces the dimensionality of the input data using Singular Value
/// Decomposition (SVD). The data is centered for each feature before applying
/// SVD unless centering is disabled. Unlike the partial least squares
/// algorithms, the projection can be reversed with
/// [`inverse_transform`](Algorithm::inverse_transform).
///
/// # Examples
///
/// ```
/// use petal_pls::{PcaBuilder, Unsupervised};
///
/// let x = ndarray::arr2(&[[0_f64, 0_f64], [1_f64, 1_f64], [2_f64, 2_f64]]);
/// let y = PcaBuilder::new(1).build().unwrap().configure_and_transform(&x).unwrap();  // [-2_f64.sqrt(), 0_f64, 2_f64.sqrt()]
/// assert!((y[(0, 0)].abs() - 2_f64.sqrt()).abs() < 1e-8);
/// assert!(y[(1, 0)].abs() < 1e-8);
/// assert!((y[(2, 0)].abs() - 2_f64.sqrt()).abs() < 1e-8);
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug)]
pub struct Pca {
    n_components: usize,
    centering: bool,
    #[cfg_attr(feature = "serde", serde(skip))]
    stop: StopFlag,
    fitted: Option<PcaModel>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
struct PcaModel {
    components: Array2<f64>,
    means: Array1<f64>,
    total_variance: f64,
    singular: Array1<f64>,
}

impl Pca {
    /// Creates an unconfigured PCA with the given number of components and
    /// centering enabled.
    ///
    /// # Errors
    ///
    /// Rejects zero components.
    pub fn new(n_components: usize) -> Result<Self, InvalidSetting> {
        PcaBuilder::new(n_components).build()
    }

    /// Returns the principal axes in feature space, one per row.
    #[inline]
    pub fn components(&self) -> Option<&Array2<f64>> {
        self.fitted.as_ref().map(|model| &model.components)
    }

    /// Returns the per-feature empirical mean, which is all zeros if
    /// centering is disabled.
    #[inline]
    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|model| &model.means)
    }

    #[inline]
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Sets the number of components and resets the algorithm.
    ///
    /// # Errors
    ///
    /// Rejects zero, keeping the current value.
    pub fn set_n_components(&mut self, n_components: usize) -> Result<(), InvalidSetting> {
        if n_components == 0 {
            return Err(InvalidSetting::new(
                "n_components",
                "at least one component is required",
            ));
        }
        self.n_components = n_components;
        self.reset();
        Ok(())
    }

    #[inline]
    pub fn centering(&self) -> bool {
        self.centering
    }

    /// Enables or disables mean-centering and resets the algorithm.
    pub fn set_centering(&mut self, centering: bool) {
        self.centering = centering;
        self.reset();
    }

    /// Returns singular values.
    #[inline]
    pub fn singular_values(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|model| &model.singular)
    }

    /// Returns the ratio of explained variance for each component.
    ///
    /// The ratios are all zero if the training data has no variance.
    pub fn explained_variance_ratio(&self) -> Option<Array1<f64>> {
        self.fitted.as_ref().map(|model| {
            if model.total_variance > 0. {
                model.singular.mapv(|s| s * s / model.total_variance)
            } else {
                Array1::zeros(model.singular.len())
            }
        })
    }

    fn model(&self) -> Result<&PcaModel, DecompositionError> {
        self.fitted.as_ref().ok_or(DecompositionError::Unconfigured)
    }
}

impl Algorithm for Pca {
    fn is_configured(&self) -> bool {
        self.fitted.is_some()
    }

    fn reset(&mut self) {
        self.fitted = None;
    }

    fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    /// Applies dimensionality reduction to `input`.
    ///
    /// # Errors
    ///
    /// * [`DecompositionError::InvalidInput`] if the number of features in
    ///   `input` does not match that of the training data.
    fn do_transform(&self, input: ArrayView2<'_, f64>) -> Result<Array2<f64>, DecompositionError> {
        let model = self.model()?;
        if input.ncols() != model.means.len() {
            return Err(DecompositionError::InvalidInput(format!(
                "# of columns should be {}",
                model.means.len()
            )));
        }

        let transformed = if self.centering {
            let x = &input - &model.means;
            x.dot(&model.components.t())
        } else {
            input.dot(&model.components.t())
        };
        Ok(transformed)
    }

    /// Transforms data back to its original space.
    ///
    /// # Errors
    ///
    /// Returns [`DecompositionError::InvalidInput`] if the number of columns of
    /// `input` is different from the number of components.
    fn do_inverse_transform(
        &self,
        input: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, DecompositionError> {
        let model = self.model()?;
        if input.ncols() != model.components.nrows() {
            return Err(DecompositionError::InvalidInput(format!(
                "# of columns should be {}",
                model.components.nrows()
            )));
        }

        let inverse_transformed = if self.centering {
            input.dot(&model.components) + &model.means
        } else {
            input.dot(&model.components)
        };
        Ok(inverse_transformed)
    }
}

impl Unsupervised for Pca {
    /// Fits the model with `input`.
    ///
    /// # Errors
    ///
    /// * [`DecompositionError::InvalidInput`] if any of the dimensions of
    ///   `input` is less than the number of components.
    /// * [`DecompositionError::LinalgError`] if the underlying Singular Vector
    ///   Decomposition routine fails.
    /// * [`DecompositionError::Stopped`] if the stop flag was raised.
    fn do_configure(&mut self, input: ArrayView2<'_, f64>) -> Result<(), DecompositionError> {
        if input.shape().iter().any(|v| *v < self.n_components) {
            return Err(DecompositionError::InvalidInput(format!(
                "every dimension should be at least {}",
                self.n_components
            )));
        }
        self.stop.check()?;

        let means = if self.centering {
            input
                .mean_axis(Axis(0))
                .ok_or_else(|| DecompositionError::InvalidInput("empty input".to_string()))?
        } else {
            Array1::zeros(input.ncols())
        };

        let (mut u, sigma, mut vt) = if self.centering {
            svd(&(&input - &means))?
        } else {
            svd(&input)?
        };
        svd_flip(&mut u, &mut vt);
        log::debug!(
            "PCA: kept {} of {} singular values",
            self.n_components,
            sigma.len()
        );

        self.fitted = Some(PcaModel {
            components: vt.slice(s![0..self.n_components, ..]).into_owned(),
            means,
            total_variance: sigma.dot(&sigma),
            singular: sigma.slice(s![0..self.n_components]).into_owned(),
        });
        Ok(())
    }
}

/// Builder for [`Pca`].
///
/// # Examples
///
/// ```
/// use petal_pls::{PcaBuilder, Unsupervised};
///
/// let x = ndarray::arr2(&[[0_f64, 0_f64], [1_f64, 1_f64]]);
/// let mut pca = PcaBuilder::new(1).build().unwrap();
/// pca.configure(&x).unwrap();
/// ```
#[allow(clippy::module_name_repetitions)]
pub struct PcaBuilder {
    n_components: usize,
    centering: bool,
}

impl PcaBuilder {
    /// Sets the number of components for PCA.
    #[must_use]
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            centering: true,
        }
    }

    /// Indicates whether or not to perform mean-centering on input data. It is
    /// enabled by default. If the inputs are already centered, set `centering`
    /// to `false`. *Note* [`Pca::mean()`] will return an [`Array1`] of 0's if
    /// `centering` is `false`.
    #[must_use]
    pub fn centering(mut self, centering: bool) -> Self {
        self.centering = centering;
        self
    }

    /// Creates an unconfigured instance of [`Pca`].
    ///
    /// # Errors
    ///
    /// Rejects zero components.
    pub fn build(self) -> Result<Pca, InvalidSetting> {
        let mut pca = Pca {
            n_components: 1,
            centering: self.centering,
            stop: StopFlag::new(),
            fitted: None,
        };
        pca.set_n_components(self.n_components)?;
        Ok(pca)
    }
}
