use crate::algorithm::StopFlag;
use crate::linalg::{self, outer, svd_flip};
use crate::pls::{Pls, PlsBuilder, PlsEngine};
use crate::scale::{Scale, Standardize};
use crate::{DecompositionError, InvalidSetting};
use ndarray::{Array1, Array2, ArrayView2, Axis};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const EPS: f64 = f64::EPSILON;

/// How the targets are deflated after a component has been extracted.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeflationMode {
    /// Deflates the targets with their own scores.
    Canonical,
    /// Deflates the targets with the feature scores.
    #[default]
    Regression,
}

/// How weight vectors are computed in the inner loop.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WeightMode {
    /// Projection onto the covariance with the other block ("mode A").
    #[default]
    Pls,
    /// Projection through the pseudo-inverse of the block ("mode B").
    Cca,
}

/// Partial least squares by nonlinear iterative partial least squares.
///
/// # Examples
///
/// ```
/// use petal_pls::{Algorithm, DeflationMode, NipalsBuilder, Supervised};
///
/// let x = ndarray::arr2(&[[0_f64, 0., 1.], [1., 0., 0.], [2., 2., 2.], [2., 5., 4.]]);
/// let y = ndarray::arr2(&[[0.1_f64, -0.2], [0.9, 1.1], [6.2, 5.9], [11.9, 12.3]]);
/// let mut pls = NipalsBuilder::new()
///     .n_components(2)
///     .deflation_mode(DeflationMode::Canonical)
///     .build()
///     .unwrap();
/// let scores = pls.configure_and_transform(&x, &y).unwrap();
/// assert_eq!(scores.ncols(), 2);
/// ```
pub type Nipals = Pls<NipalsEngine>;

/// Builder for [`Nipals`].
pub type NipalsBuilder = PlsBuilder<NipalsEngine>;

/// The NIPALS decomposition.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct NipalsEngine {
    pub(crate) tol: f64,
    pub(crate) max_iter: usize,
    pub(crate) norm_y_weights: bool,
    pub(crate) deflation_mode: DeflationMode,
    pub(crate) weight_mode: WeightMode,
}

impl Default for NipalsEngine {
    fn default() -> Self {
        Self {
            tol: 1e-6,
            max_iter: 500,
            norm_y_weights: false,
            deflation_mode: DeflationMode::default(),
            weight_mode: WeightMode::default(),
        }
    }
}

/// A model learned by [`NipalsEngine`].
///
/// Every per-component matrix has one column per requested component;
/// columns of components that were not extracted are zero.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct NipalsModel {
    x_scores: Array2<f64>,
    y_scores: Array2<f64>,
    x_weights: Array2<f64>,
    y_weights: Array2<f64>,
    x_loadings: Array2<f64>,
    y_loadings: Array2<f64>,
    x_rotations: Array2<f64>,
    y_rotations: Array2<f64>,
    coef: Array2<f64>,
    residual: Array2<f64>,
    input_scaler: Standardize,
    response_scaler: Standardize,
    n_iter: Vec<usize>,
}

impl NipalsModel {
    /// Returns the x-scores (T).
    pub fn x_scores(&self) -> &Array2<f64> {
        &self.x_scores
    }

    /// Returns the y-scores (U).
    pub fn y_scores(&self) -> &Array2<f64> {
        &self.y_scores
    }

    /// Returns the x-weights (W).
    pub fn x_weights(&self) -> &Array2<f64> {
        &self.x_weights
    }

    /// Returns the y-weights (C).
    pub fn y_weights(&self) -> &Array2<f64> {
        &self.y_weights
    }

    /// Returns the x-loadings (P).
    pub fn x_loadings(&self) -> &Array2<f64> {
        &self.x_loadings
    }

    /// Returns the y-loadings (Q).
    pub fn y_loadings(&self) -> &Array2<f64> {
        &self.y_loadings
    }

    pub fn x_rotations(&self) -> &Array2<f64> {
        &self.x_rotations
    }

    pub fn y_rotations(&self) -> &Array2<f64> {
        &self.y_rotations
    }

    /// Returns the regression coefficients, one column per target.
    pub fn coef(&self) -> &Array2<f64> {
        &self.coef
    }

    /// Returns the standardized features left after deflation.
    pub fn residual(&self) -> &Array2<f64> {
        &self.residual
    }

    /// Returns the number of inner iterations for each extracted component.
    pub fn n_iter(&self) -> &[usize] {
        &self.n_iter
    }

    /// Returns the number of components actually extracted.
    pub fn n_extracted(&self) -> usize {
        self.n_iter.len()
    }
}

const MATRIX_NAMES: &[&str] = &[
    "XScores",
    "YScores",
    "XWeights",
    "YWeights",
    "XLoadings",
    "YLoadings",
    "XRotations",
    "YRotations",
    "Coef",
    "X",
];

impl NipalsEngine {
    pub fn tol(&self) -> f64 {
        self.tol
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    pub fn norm_y_weights(&self) -> bool {
        self.norm_y_weights
    }

    pub fn deflation_mode(&self) -> DeflationMode {
        self.deflation_mode
    }

    pub fn weight_mode(&self) -> WeightMode {
        self.weight_mode
    }

    pub(crate) fn set_tol(&mut self, tol: f64) -> Result<(), InvalidSetting> {
        check_tol(tol)?;
        self.tol = tol;
        Ok(())
    }

    pub(crate) fn set_max_iter(&mut self, max_iter: usize) -> Result<(), InvalidSetting> {
        check_max_iter(max_iter)?;
        self.max_iter = max_iter;
        Ok(())
    }

    pub(crate) fn model_matrix<'a>(model: &'a NipalsModel, name: &str) -> Option<&'a Array2<f64>> {
        let matrix = match name {
            "XScores" | "T" => &model.x_scores,
            "YScores" | "U" => &model.y_scores,
            "XWeights" | "W" => &model.x_weights,
            "YWeights" | "C" => &model.y_weights,
            "XLoadings" | "P" => &model.x_loadings,
            "YLoadings" | "Q" => &model.y_loadings,
            "XRotations" => &model.x_rotations,
            "YRotations" => &model.y_rotations,
            "Coef" => &model.coef,
            "X" => &model.residual,
            _ => return None,
        };
        Some(matrix)
    }

    /// Computes a pair of x- and y-weights for the current (deflated)
    /// matrices.
    ///
    /// Returns the weights and the number of iterations.
    fn inner_loop(
        &self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        stop: &StopFlag,
    ) -> Result<(Array1<f64>, Array1<f64>, usize), DecompositionError> {
        let pinvs = match self.weight_mode {
            WeightMode::Pls => None,
            WeightMode::Cca => Some((
                linalg::pinv(x).map_err(DecompositionError::InversionFailed)?,
                linalg::pinv(y).map_err(DecompositionError::InversionFailed)?,
            )),
        };

        let mut y_score = y.column(0).to_owned();
        let mut x_weights_old = Array1::<f64>::zeros(x.ncols());
        let mut n_iter = 1;
        loop {
            stop.check()?;

            let mut x_weights = if let Some((x_pinv, _)) = &pinvs {
                x_pinv.dot(&y_score)
            } else {
                x.t().dot(&y_score) / nonzero(y_score.dot(&y_score))
            };
            if x_weights.dot(&x_weights) < EPS {
                x_weights += EPS;
            }
            x_weights /= x_weights.dot(&x_weights).sqrt() + EPS;

            let x_score = x.dot(&x_weights);
            if x_score.dot(&x_score) < EPS {
                // no variance left in `x`; the caller stops extracting
                return Ok((x_weights, Array1::zeros(y.ncols()), n_iter));
            }

            let mut y_weights = if let Some((_, y_pinv)) = &pinvs {
                y_pinv.dot(&x_score)
            } else {
                y.t().dot(&x_score) / x_score.dot(&x_score)
            };
            if self.norm_y_weights {
                y_weights /= y_weights.dot(&y_weights).sqrt() + EPS;
            }

            y_score = y.dot(&y_weights) / (y_weights.dot(&y_weights) + EPS);

            let diff = &x_weights - &x_weights_old;
            if diff.dot(&diff) < self.tol || y.ncols() == 1 {
                return Ok((x_weights, y_weights, n_iter));
            }
            if n_iter >= self.max_iter {
                log::debug!("NIPALS reached the maximum of {} iterations", self.max_iter);
                return Ok((x_weights, y_weights, n_iter));
            }
            x_weights_old = x_weights;
            n_iter += 1;
        }
    }
}

impl PlsEngine for NipalsEngine {
    type Model = NipalsModel;

    fn validate(&self) -> Result<(), InvalidSetting> {
        check_tol(self.tol)?;
        check_max_iter(self.max_iter)
    }

    fn fit(
        &self,
        input: Array2<f64>,
        response: Array2<f64>,
        n_components: usize,
        stop: &StopFlag,
    ) -> Result<NipalsModel, DecompositionError> {
        let input_scaler = Standardize::new(&input)?;
        let response_scaler = Standardize::new(&response)?;
        let mut x = input_scaler.scale(&input);
        let mut y = response_scaler.scale(&response);
        let (n, p) = x.dim();
        let q = y.ncols();

        let mut x_scores = Array2::zeros((n, n_components));
        let mut y_scores = Array2::zeros((n, n_components));
        let mut x_weights = Array2::zeros((p, n_components));
        let mut y_weights = Array2::zeros((q, n_components));
        let mut x_loadings = Array2::zeros((p, n_components));
        let mut y_loadings = Array2::zeros((q, n_components));
        let mut n_iter = Vec::with_capacity(n_components);

        for k in 0..n_components {
            stop.check()?;
            if y.t().dot(&y).iter().all(|&e| e < EPS) {
                log::debug!("NIPALS: target residual is constant at component {k}");
                break;
            }

            let (w, c, iterations) = self.inner_loop(&x, &y, stop)?;
            let mut w = w.insert_axis(Axis(1));
            let mut c = c.insert_axis(Axis(0));
            svd_flip(&mut w, &mut c);
            let w = w.remove_axis(Axis(1));
            let c = c.remove_axis(Axis(0));

            let x_score = x.dot(&w);
            let tt = x_score.dot(&x_score);
            if tt < EPS {
                log::debug!("NIPALS: feature scores are null at component {k}");
                break;
            }
            let y_score = y.dot(&c) / nonzero(c.dot(&c));

            let x_loading = x.t().dot(&x_score) / tt;
            x -= &outer(&x_score, &x_loading);

            let y_loading = match self.deflation_mode {
                DeflationMode::Canonical => {
                    let y_loading = y.t().dot(&y_score) / nonzero(y_score.dot(&y_score));
                    y -= &outer(&y_score, &y_loading);
                    y_loading
                }
                DeflationMode::Regression => {
                    let y_loading = y.t().dot(&x_score) / tt;
                    y -= &outer(&x_score, &y_loading);
                    y_loading
                }
            };

            x_scores.column_mut(k).assign(&x_score);
            y_scores.column_mut(k).assign(&y_score);
            x_weights.column_mut(k).assign(&w);
            y_weights.column_mut(k).assign(&c);
            x_loadings.column_mut(k).assign(&x_loading);
            y_loadings.column_mut(k).assign(&y_loading);
            n_iter.push(iterations);
        }

        let x_rotations = x_weights.dot(
            &linalg::pinv(&x_loadings.t().dot(&x_weights))
                .map_err(DecompositionError::InversionFailed)?,
        );
        let y_rotations = if q > 1 {
            y_weights.dot(
                &linalg::pinv(&y_loadings.t().dot(&y_weights))
                    .map_err(DecompositionError::InversionFailed)?,
            )
        } else {
            Array2::eye(1)
        };
        let coef = x_rotations.dot(&y_loadings.t()) * &response_scaler.std_devs;

        Ok(NipalsModel {
            x_scores,
            y_scores,
            x_weights,
            y_weights,
            x_loadings,
            y_loadings,
            x_rotations,
            y_rotations,
            coef,
            residual: x,
            input_scaler,
            response_scaler,
            n_iter,
        })
    }

    fn transform(&self, model: &NipalsModel, input: ArrayView2<'_, f64>) -> Array2<f64> {
        model.input_scaler.scale(&input).dot(&model.x_rotations)
    }

    fn predict(&self, model: &NipalsModel, input: ArrayView2<'_, f64>) -> Array2<f64> {
        model.input_scaler.scale(&input).dot(&model.coef) + &model.response_scaler.means
    }

    fn matrix_names(&self) -> &'static [&'static str] {
        MATRIX_NAMES
    }

    fn matrix<'a>(&self, model: &'a NipalsModel, name: &str) -> Option<&'a Array2<f64>> {
        Self::model_matrix(model, name)
    }

    fn loadings<'a>(&self, model: &'a NipalsModel) -> Option<&'a Array2<f64>> {
        Some(&model.x_loadings)
    }
}

/// Replaces a vanishing denominator by one.
fn nonzero(d: f64) -> f64 {
    if d < EPS {
        1.
    } else {
        d
    }
}

pub(crate) fn check_tol(tol: f64) -> Result<(), InvalidSetting> {
    if tol > 0. && tol.is_finite() {
        Ok(())
    } else {
        Err(InvalidSetting::new("tol", format!("{tol} is not positive")))
    }
}

pub(crate) fn check_max_iter(max_iter: usize) -> Result<(), InvalidSetting> {
    if max_iter == 0 {
        Err(InvalidSetting::new(
            "max_iter",
            "at least one iteration is required",
        ))
    } else {
        Ok(())
    }
}

impl Nipals {
    /// Creates an unconfigured NIPALS algorithm with the given number of
    /// components and default parameters.
    ///
    /// # Errors
    ///
    /// Rejects zero components.
    pub fn new(n_components: usize) -> Result<Self, InvalidSetting> {
        NipalsBuilder::new().n_components(n_components).build()
    }

    /// Sets the deflation mode of the targets and resets the algorithm.
    pub fn set_deflation_mode(&mut self, mode: DeflationMode) {
        let _ = self.update_engine(|engine| {
            engine.deflation_mode = mode;
            Ok(())
        });
    }

    /// Sets the convergence tolerance of the inner loop and resets the
    /// algorithm.
    ///
    /// # Errors
    ///
    /// Rejects a tolerance that is not a positive number, keeping the current
    /// value.
    pub fn set_tol(&mut self, tol: f64) -> Result<(), InvalidSetting> {
        self.update_engine(|engine| engine.set_tol(tol))
    }

    /// Sets the iteration limit of the inner loop and resets the algorithm.
    ///
    /// # Errors
    ///
    /// Rejects zero, keeping the current value.
    pub fn set_max_iter(&mut self, max_iter: usize) -> Result<(), InvalidSetting> {
        self.update_engine(|engine| engine.set_max_iter(max_iter))
    }

    /// Sets whether y-weights are normalized to unit length and resets the
    /// algorithm.
    pub fn set_norm_y_weights(&mut self, norm_y_weights: bool) {
        let _ = self.update_engine(|engine| {
            engine.norm_y_weights = norm_y_weights;
            Ok(())
        });
    }

    /// Returns the number of inner iterations for each extracted component,
    /// or `None` if unconfigured.
    pub fn n_iter(&self) -> Option<&[usize]> {
        self.model().map(NipalsModel::n_iter)
    }
}

impl NipalsBuilder {
    #[must_use]
    pub fn deflation_mode(mut self, mode: DeflationMode) -> Self {
        self.engine.deflation_mode = mode;
        self
    }

    #[must_use]
    pub fn tol(mut self, tol: f64) -> Self {
        self.engine.tol = tol;
        self
    }

    #[must_use]
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.engine.max_iter = max_iter;
        self
    }

    #[must_use]
    pub fn norm_y_weights(mut self, norm_y_weights: bool) -> Self {
        self.engine.norm_y_weights = norm_y_weights;
        self
    }
}
