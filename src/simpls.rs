use crate::algorithm::StopFlag;
use crate::linalg::{self, flip_sign, outer};
use crate::pls::{Pls, PlsBuilder, PlsEngine};
use crate::{DecompositionError, InvalidSetting};
use ndarray::{Array2, ArrayView2};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const EPS: f64 = f64::EPSILON;

/// Partial least squares by the SIMPLS algorithm of de Jong (1993).
///
/// Instead of deflating the features, SIMPLS deflates the cross-product
/// `XᵀY` against the loadings found so far. The scores `X·W` are orthonormal.
/// The decomposition assumes centered data, so it is normally used with
/// [`Preprocessing::Center`] or [`Preprocessing::Standardize`].
///
/// [`Preprocessing::Center`]: crate::Preprocessing::Center
/// [`Preprocessing::Standardize`]: crate::Preprocessing::Standardize
///
/// # Examples
///
/// ```
/// use petal_pls::{Algorithm, Preprocessing, SimplsBuilder, Supervised};
///
/// let x = ndarray::arr2(&[[0_f64, 0., 1.], [1., 0., 0.], [2., 2., 2.], [2., 5., 4.]]);
/// let y = ndarray::arr2(&[[0.1_f64, -0.2], [0.9, 1.1], [6.2, 5.9], [11.9, 12.3]]);
/// let mut simpls = SimplsBuilder::new()
///     .n_components(2)
///     .preprocessing(Preprocessing::Center)
///     .build()
///     .unwrap();
/// let scores = simpls.configure_and_transform(&x, &y).unwrap();
/// assert_eq!(scores.dim(), (4, 2));
/// ```
pub type Simpls = Pls<SimplsEngine>;

/// Builder for [`Simpls`].
pub type SimplsBuilder = PlsBuilder<SimplsEngine>;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default)]
pub struct SimplsEngine;

/// A model learned by [`SimplsEngine`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct SimplsModel {
    x_scores: Array2<f64>,
    x_weights: Array2<f64>,
    x_loadings: Array2<f64>,
    y_loadings: Array2<f64>,
    coef: Array2<f64>,
    n_extracted: usize,
}

impl SimplsModel {
    pub fn x_weights(&self) -> &Array2<f64> {
        &self.x_weights
    }

    pub fn x_loadings(&self) -> &Array2<f64> {
        &self.x_loadings
    }

    pub fn y_loadings(&self) -> &Array2<f64> {
        &self.y_loadings
    }

    pub fn coef(&self) -> &Array2<f64> {
        &self.coef
    }

    pub fn n_extracted(&self) -> usize {
        self.n_extracted
    }
}

const MATRIX_NAMES: &[&str] = &["XScores", "XWeights", "XLoadings", "YLoadings", "Coef"];

impl PlsEngine for SimplsEngine {
    type Model = SimplsModel;

    fn fit(
        &self,
        input: Array2<f64>,
        response: Array2<f64>,
        n_components: usize,
        stop: &StopFlag,
    ) -> Result<SimplsModel, DecompositionError> {
        let x = input;
        let y = response;
        let (n, p) = x.dim();
        let q = y.ncols();

        let covariance = x.t().dot(&y);
        let mut a = covariance.clone();
        let m = x.t().dot(&x);
        let mut c = Array2::<f64>::eye(p);

        let mut x_scores = Array2::zeros((n, n_components));
        let mut x_weights = Array2::zeros((p, n_components));
        let mut x_loadings = Array2::zeros((p, n_components));
        let mut y_loadings = Array2::zeros((q, n_components));
        let mut n_extracted = 0;

        for k in 0..n_components {
            stop.check()?;
            let (values, vectors) = linalg::eigh(&a.t().dot(&a))?;
            if values[0] < EPS {
                log::debug!("SIMPLS: no covariance left at component {k}");
                break;
            }
            let mut w = a.dot(&vectors.column(0));
            let ww = w.dot(&m.dot(&w));
            if ww < EPS {
                log::debug!("SIMPLS: feature scores are null at component {k}");
                break;
            }
            w /= ww.sqrt();
            flip_sign(&mut w);

            let t = x.dot(&w);
            let p_k = m.dot(&w);
            let q_k = covariance.t().dot(&w);

            let mut v = c.dot(&p_k);
            let norm = v.dot(&v).sqrt();
            if norm >= EPS {
                v /= norm;
                c -= &outer(&v, &v);
            }
            a = c.dot(&covariance);

            x_scores.column_mut(k).assign(&t);
            x_weights.column_mut(k).assign(&w);
            x_loadings.column_mut(k).assign(&p_k);
            y_loadings.column_mut(k).assign(&q_k);
            n_extracted += 1;
        }

        let coef = x_weights.dot(&y_loadings.t());
        Ok(SimplsModel {
            x_scores,
            x_weights,
            x_loadings,
            y_loadings,
            coef,
            n_extracted,
        })
    }

    fn transform(&self, model: &SimplsModel, input: ArrayView2<'_, f64>) -> Array2<f64> {
        input.dot(&model.x_weights)
    }

    fn predict(&self, model: &SimplsModel, input: ArrayView2<'_, f64>) -> Array2<f64> {
        input.dot(&model.coef)
    }

    fn matrix_names(&self) -> &'static [&'static str] {
        MATRIX_NAMES
    }

    fn matrix<'a>(&self, model: &'a SimplsModel, name: &str) -> Option<&'a Array2<f64>> {
        let matrix = match name {
            "XScores" | "T" => &model.x_scores,
            "XWeights" | "W" => &model.x_weights,
            "XLoadings" | "P" => &model.x_loadings,
            "YLoadings" | "Q" => &model.y_loadings,
            "Coef" => &model.coef,
            _ => return None,
        };
        Some(matrix)
    }

    fn loadings<'a>(&self, model: &'a SimplsModel) -> Option<&'a Array2<f64>> {
        Some(&model.x_loadings)
    }
}

impl Simpls {
    /// Creates an unconfigured SIMPLS algorithm with the given number of
    /// components.
    ///
    /// # Errors
    ///
    /// Rejects zero components.
    pub fn new(n_components: usize) -> Result<Self, InvalidSetting> {
        SimplsBuilder::new().n_components(n_components).build()
    }
}

#[cfg(test)]
mod test {
    use super::{Simpls, SimplsBuilder};
    use crate::linalg::random_normal;
    use crate::{
        Algorithm, DecompositionError, Pls1Builder, Predictor, Preprocessing, Supervised,
    };
    use approx::assert_abs_diff_eq;
    use ndarray::{arr2, s, Array2};

    const RNG_SEED: u128 = 1234567891011121314;

    fn dataset() -> (Array2<f64>, Array2<f64>) {
        let x = random_normal(30, 5, RNG_SEED);
        let noise = random_normal(30, 2, RNG_SEED + 11);
        let mut y = Array2::zeros((30, 2));
        for i in 0..30 {
            y[(i, 0)] = 2. * x[(i, 0)] - x[(i, 1)] + 0.3 * noise[(i, 0)] + 5.;
            y[(i, 1)] = x[(i, 2)] + 0.5 * x[(i, 4)] + 0.3 * noise[(i, 1)] - 1.;
        }
        (x, y)
    }

    #[test]
    fn agrees_with_pls1_on_single_response() {
        let (x, y) = dataset();
        let y = y.slice(s![.., 0..1]).to_owned();
        let mut simpls = SimplsBuilder::new()
            .n_components(3)
            .preprocessing(Preprocessing::Center)
            .build()
            .unwrap();
        let mut pls1 = Pls1Builder::new()
            .n_components(3)
            .preprocessing(Preprocessing::Center)
            .build()
            .unwrap();
        let predicted = simpls.configure_and_predict(&x, &y).unwrap();
        let expected = pls1.configure_and_predict(&x, &y).unwrap();
        assert!(predicted.abs_diff_eq(&expected, 1e-8));
    }

    #[test]
    fn scores_are_orthonormal() {
        let (x, y) = dataset();
        let mut simpls = SimplsBuilder::new()
            .n_components(3)
            .preprocessing(Preprocessing::Center)
            .build()
            .unwrap();
        let scores = simpls.configure_and_transform(&x, &y).unwrap();
        assert_eq!(scores.dim(), (30, 3));
        assert!(scores.t().dot(&scores).abs_diff_eq(&Array2::eye(3), 1e-8));

        let t = simpls.matrix("T").unwrap();
        assert!(t.abs_diff_eq(&scores, 1e-10));
    }

    #[test]
    fn multi_response_shapes() {
        let (x, y) = dataset();
        let mut simpls = SimplsBuilder::new()
            .n_components(4)
            .preprocessing(Preprocessing::Standardize)
            .build()
            .unwrap();
        simpls.configure(&x, &y).unwrap();
        assert_eq!(simpls.matrix("Coef").unwrap().dim(), (5, 2));
        assert_eq!(simpls.matrix("YLoadings").unwrap().dim(), (2, 4));
        assert_eq!(simpls.loadings().unwrap().dim(), (5, 4));
        assert_eq!(simpls.predict(&x).unwrap().dim(), (30, 2));
        assert!(simpls.matrix("C").is_none());

        let predicted = simpls.predict(&x).unwrap();
        let residual = &predicted - &y;
        #[allow(clippy::cast_precision_loss)]
        let rmse = (residual.mapv(|e| e * e).sum() / residual.len() as f64).sqrt();
        assert!(rmse < 0.6, "rmse = {rmse}");
    }

    #[test]
    fn collinear_input_is_recovered() {
        let x = arr2(&[[1., 2.], [2., 4.], [3., 6.], [4., 8.]]);
        let y = arr2(&[[3.], [6.], [9.], [12.]]);
        let mut simpls = SimplsBuilder::new()
            .n_components(2)
            .preprocessing(Preprocessing::Center)
            .build()
            .unwrap();
        simpls.configure(&x, &y).unwrap();
        assert_eq!(simpls.model().unwrap().n_extracted(), 1);
        let predicted = simpls.predict(&x).unwrap();
        assert!(predicted.abs_diff_eq(&y, 1e-8));
        let w = simpls.matrix("W").unwrap();
        assert_abs_diff_eq!(w[(0, 1)], 0.);
        assert_abs_diff_eq!(w[(1, 1)], 0.);
    }

    #[test]
    fn stop_before_configure() {
        let (x, y) = dataset();
        let mut simpls = Simpls::new(2).unwrap();
        simpls.stop();
        assert!(matches!(
            simpls.configure(&x, &y),
            Err(DecompositionError::Stopped)
        ));
        simpls.stop_flag().clear();
        assert!(simpls.configure(&x, &y).is_ok());
    }
}
