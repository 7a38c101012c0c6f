use crate::algorithm::StopFlag;
use crate::linalg::{self, flip_sign, outer};
use crate::pls::{Pls, PlsBuilder, PlsEngine};
use crate::{DecompositionError, InvalidSetting};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const EPS: f64 = f64::EPSILON;

/// Single-response partial least squares.
///
/// # Examples
///
/// ```
/// use petal_pls::{Pls1Builder, Predictor, Preprocessing, Supervised};
///
/// let x = ndarray::arr2(&[[1_f64, 0.], [2., 1.], [3., 0.], [4., 1.]]);
/// let y = ndarray::arr2(&[[2_f64], [4.], [6.], [8.]]);
/// let mut pls = Pls1Builder::new()
///     .n_components(2)
///     .preprocessing(Preprocessing::Center)
///     .build()
///     .unwrap();
/// let predicted = pls.configure_and_predict(&x, &y).unwrap();
/// assert!((predicted[(3, 0)] - 8.).abs() < 1e-8);
/// ```
pub type Pls1 = Pls<Pls1Engine>;

/// Builder for [`Pls1`].
pub type Pls1Builder = PlsBuilder<Pls1Engine>;

/// The PLS1 decomposition; it accepts exactly one target column.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default)]
pub struct Pls1Engine;

/// A model learned by [`Pls1Engine`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct Pls1Model {
    x_scores: Array2<f64>,
    x_weights: Array2<f64>,
    x_loadings: Array2<f64>,
    y_loadings: Array2<f64>,
    x_rotations: Array2<f64>,
    coef: Array2<f64>,
    n_extracted: usize,
}

impl Pls1Model {
    pub fn x_weights(&self) -> &Array2<f64> {
        &self.x_weights
    }

    pub fn x_loadings(&self) -> &Array2<f64> {
        &self.x_loadings
    }

    pub fn coef(&self) -> &Array2<f64> {
        &self.coef
    }

    /// Returns the number of components actually extracted.
    pub fn n_extracted(&self) -> usize {
        self.n_extracted
    }
}

const MATRIX_NAMES: &[&str] = &[
    "XScores",
    "XWeights",
    "XLoadings",
    "YLoadings",
    "XRotations",
    "Coef",
];

impl PlsEngine for Pls1Engine {
    type Model = Pls1Model;

    fn response_bounds(&self) -> (usize, Option<usize>) {
        (1, Some(1))
    }

    fn fit(
        &self,
        input: Array2<f64>,
        response: Array2<f64>,
        n_components: usize,
        stop: &StopFlag,
    ) -> Result<Pls1Model, DecompositionError> {
        let mut x = input;
        let mut y = response.column(0).to_owned();
        let (n, p) = x.dim();

        let mut x_scores = Array2::zeros((n, n_components));
        let mut x_weights = Array2::zeros((p, n_components));
        let mut x_loadings = Array2::zeros((p, n_components));
        let mut y_loadings = Array1::zeros(n_components);
        let mut n_extracted = 0;

        for k in 0..n_components {
            stop.check()?;
            let mut w = x.t().dot(&y);
            let norm = w.dot(&w).sqrt();
            if norm < EPS {
                log::debug!("PLS1: no covariance left at component {k}");
                break;
            }
            w /= norm;
            flip_sign(&mut w);
            let t = x.dot(&w);
            let tt = t.dot(&t);
            if tt < EPS {
                log::debug!("PLS1: feature scores are null at component {k}");
                break;
            }
            let p_k = x.t().dot(&t) / tt;
            let b_k = y.dot(&t) / tt;
            x -= &outer(&t, &p_k);
            y.scaled_add(-b_k, &t);

            x_scores.column_mut(k).assign(&t);
            x_weights.column_mut(k).assign(&w);
            x_loadings.column_mut(k).assign(&p_k);
            y_loadings[k] = b_k;
            n_extracted += 1;
        }

        let mut x_rotations = Array2::zeros((p, n_components));
        if n_extracted > 0 {
            // P'W is unit upper triangular over the extracted components
            let w = x_weights.slice(s![.., ..n_extracted]);
            let pw = x_loadings.slice(s![.., ..n_extracted]).t().dot(&w);
            let pw_inv = linalg::inv(&pw).map_err(DecompositionError::InversionFailed)?;
            x_rotations
                .slice_mut(s![.., ..n_extracted])
                .assign(&w.dot(&pw_inv));
        }
        let coef = x_rotations.dot(&y_loadings).insert_axis(Axis(1));

        Ok(Pls1Model {
            x_scores,
            x_weights,
            x_loadings,
            y_loadings: y_loadings.insert_axis(Axis(0)),
            x_rotations,
            coef,
            n_extracted,
        })
    }

    fn transform(&self, model: &Pls1Model, input: ArrayView2<'_, f64>) -> Array2<f64> {
        input.dot(&model.x_rotations)
    }

    fn predict(&self, model: &Pls1Model, input: ArrayView2<'_, f64>) -> Array2<f64> {
        input.dot(&model.coef)
    }

    fn matrix_names(&self) -> &'static [&'static str] {
        MATRIX_NAMES
    }

    fn matrix<'a>(&self, model: &'a Pls1Model, name: &str) -> Option<&'a Array2<f64>> {
        let matrix = match name {
            "XScores" | "T" => &model.x_scores,
            "XWeights" | "W" => &model.x_weights,
            "XLoadings" | "P" => &model.x_loadings,
            "YLoadings" | "Q" => &model.y_loadings,
            "XRotations" => &model.x_rotations,
            "Coef" => &model.coef,
            _ => return None,
        };
        Some(matrix)
    }

    fn loadings<'a>(&self, model: &'a Pls1Model) -> Option<&'a Array2<f64>> {
        Some(&model.x_loadings)
    }
}

impl Pls1 {
    /// Creates an unconfigured PLS1 algorithm with the given number of
    /// components.
    ///
    /// # Errors
    ///
    /// Rejects zero components.
    pub fn new(n_components: usize) -> Result<Self, InvalidSetting> {
        Pls1Builder::new().n_components(n_components).build()
    }
}

#[cfg(test)]
mod test {
    use super::Pls1;
    use crate::linalg::random_normal;
    use crate::{
        Algorithm, DecompositionError, NipalsBuilder, Pls1Builder, Predictor, Preprocessing,
        Supervised,
    };
    use approx::assert_abs_diff_eq;
    use ndarray::{arr2, s, Array2};

    const RNG_SEED: u128 = 1234567891011121314;

    fn dataset() -> (Array2<f64>, Array2<f64>) {
        let x = random_normal(25, 5, RNG_SEED);
        let noise = random_normal(25, 1, RNG_SEED + 3);
        let y = Array2::from_shape_fn((25, 1), |(i, _)| {
            1.5 * x[(i, 0)] - 2. * x[(i, 3)] + x[(i, 4)] + 0.2 * noise[(i, 0)] + 10.
        });
        (x, y)
    }

    #[test]
    fn two_responses_are_rejected() {
        let (x, y) = dataset();
        let mut pls = Pls1::new(2).unwrap();
        pls.configure(&x, &y).unwrap();

        let y2 = ndarray::concatenate![ndarray::Axis(1), y, y];
        match pls.configure(&x, &y2) {
            Err(DecompositionError::ResponseCount { min, max, actual }) => {
                assert_eq!((min, max, actual), (1, Some(1), 2));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(!pls.is_configured());
        assert!(matches!(
            pls.transform(&x),
            Err(DecompositionError::Unconfigured)
        ));
    }

    #[test]
    fn matches_nipals_on_single_response() {
        let (x, y) = dataset();
        let mut pls1 = Pls1Builder::new()
            .n_components(3)
            .preprocessing(Preprocessing::Standardize)
            .build()
            .unwrap();
        let mut nipals = NipalsBuilder::new()
            .n_components(3)
            .preprocessing(Preprocessing::Standardize)
            .build()
            .unwrap();
        pls1.configure(&x, &y).unwrap();
        nipals.configure(&x, &y).unwrap();

        let predicted = pls1.predict(&x).unwrap();
        assert!(predicted.abs_diff_eq(&nipals.predict(&x).unwrap(), 1e-8));
        let scores = pls1.transform(&x).unwrap();
        assert!(scores.abs_diff_eq(&nipals.transform(&x).unwrap(), 1e-8));
    }

    #[test]
    fn weights_are_orthonormal() {
        let (x, y) = dataset();
        let mut pls = Pls1Builder::new()
            .n_components(4)
            .preprocessing(Preprocessing::Center)
            .build()
            .unwrap();
        pls.configure(&x, &y).unwrap();
        let w = pls.matrix("W").unwrap();
        let gram = w.t().dot(w);
        assert!(gram.abs_diff_eq(&Array2::eye(4), 1e-10));
        let t = pls.matrix("T").unwrap();
        let gram = t.t().dot(t);
        for i in 0..4 {
            for j in 0..4 {
                if i != j {
                    assert_abs_diff_eq!(gram[(i, j)], 0., epsilon = 1e-8);
                }
            }
        }
    }

    #[test]
    fn exact_fit_with_all_components() {
        let x = arr2(&[[1., 0.], [2., 1.], [3., 0.], [4., 1.], [5., 3.]]);
        let y = arr2(&[[3.], [6.], [7.], [10.], [14.]]);
        let mut pls = Pls1Builder::new()
            .n_components(2)
            .preprocessing(Preprocessing::Center)
            .build()
            .unwrap();
        let predicted = pls.configure_and_predict(&x, &y).unwrap();
        // y = 1 + 2 x1 + x2
        assert!(predicted.abs_diff_eq(&y, 1e-8));
    }

    #[test]
    fn early_exit_pads_with_zeros() {
        let x = arr2(&[[1., 2.], [2., 4.], [3., 6.], [4., 8.]]);
        let y = arr2(&[[3.], [6.], [9.], [12.]]);
        let mut pls = Pls1Builder::new()
            .n_components(2)
            .preprocessing(Preprocessing::Center)
            .build()
            .unwrap();
        pls.configure(&x, &y).unwrap();
        assert_eq!(pls.model().unwrap().n_extracted(), 1);
        let rotations = pls.matrix("XRotations").unwrap();
        assert!(rotations.slice(s![.., 1]).iter().all(|&e| e == 0.));
        assert_eq!(pls.transform(&x).unwrap().ncols(), 2);
        assert!(pls.predict(&x).unwrap().abs_diff_eq(&y, 1e-8));
    }

    #[test]
    fn stop_before_configure() {
        let (x, y) = dataset();
        let mut pls = Pls1::new(2).unwrap();
        pls.stop();
        assert!(matches!(
            pls.configure(&x, &y),
            Err(DecompositionError::Stopped)
        ));
    }
}
