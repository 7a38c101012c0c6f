use crate::algorithm::StopFlag;
use crate::nipals::{DeflationMode, NipalsEngine, NipalsModel, WeightMode};
use crate::pls::{Pls, PlsBuilder, PlsEngine};
use crate::{DecompositionError, InvalidSetting};
use ndarray::{Array2, ArrayView2};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Canonical correlation analysis on top of the NIPALS decomposition.
///
/// Weights are computed through the pseudo-inverses of the feature and
/// target blocks, and the targets are always deflated canonically.
///
/// # Examples
///
/// ```
/// use petal_pls::{Algorithm, Cca, Supervised};
///
/// let x = ndarray::arr2(&[[0_f64, 0., 1.], [1., 0., 0.], [2., 2., 2.], [3., 5., 4.]]);
/// let y = ndarray::arr2(&[[0.1_f64, -0.2], [0.9, 1.1], [6.2, 5.9], [11.9, 12.3]]);
/// let mut cca = Cca::new(1).unwrap();
/// cca.configure(&x, &y).unwrap();
/// assert_eq!(cca.transform(&x).unwrap().ncols(), 1);
/// ```
pub type Cca = Pls<CcaEngine>;

/// Builder for [`Cca`].
pub type CcaBuilder = PlsBuilder<CcaEngine>;

/// The NIPALS decomposition fixed to pseudo-inverse weights and canonical
/// deflation.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct CcaEngine {
    nipals: NipalsEngine,
}

impl Default for CcaEngine {
    fn default() -> Self {
        Self {
            nipals: NipalsEngine {
                norm_y_weights: true,
                deflation_mode: DeflationMode::Canonical,
                weight_mode: WeightMode::Cca,
                ..NipalsEngine::default()
            },
        }
    }
}

impl CcaEngine {
    /// Returns the underlying NIPALS parameters.
    pub fn nipals(&self) -> &NipalsEngine {
        &self.nipals
    }
}

impl PlsEngine for CcaEngine {
    type Model = NipalsModel;

    fn validate(&self) -> Result<(), InvalidSetting> {
        self.nipals.validate()
    }

    fn fit(
        &self,
        input: Array2<f64>,
        response: Array2<f64>,
        n_components: usize,
        stop: &StopFlag,
    ) -> Result<NipalsModel, DecompositionError> {
        self.nipals.fit(input, response, n_components, stop)
    }

    fn transform(&self, model: &NipalsModel, input: ArrayView2<'_, f64>) -> Array2<f64> {
        self.nipals.transform(model, input)
    }

    fn predict(&self, model: &NipalsModel, input: ArrayView2<'_, f64>) -> Array2<f64> {
        self.nipals.predict(model, input)
    }

    fn matrix_names(&self) -> &'static [&'static str] {
        self.nipals.matrix_names()
    }

    fn matrix<'a>(&self, model: &'a NipalsModel, name: &str) -> Option<&'a Array2<f64>> {
        NipalsEngine::model_matrix(model, name)
    }

    fn loadings<'a>(&self, model: &'a NipalsModel) -> Option<&'a Array2<f64>> {
        self.nipals.loadings(model)
    }
}

impl Cca {
    /// Creates an unconfigured CCA algorithm with the given number of
    /// components and default parameters.
    ///
    /// # Errors
    ///
    /// Rejects zero components.
    pub fn new(n_components: usize) -> Result<Self, InvalidSetting> {
        CcaBuilder::new().n_components(n_components).build()
    }

    /// Accepts only [`DeflationMode::Canonical`].
    ///
    /// Any other mode is ignored; the algorithm keeps its model and canonical
    /// deflation.
    ///
    /// # Errors
    ///
    /// Returns the rejected setting for any mode other than canonical.
    pub fn set_deflation_mode(&mut self, mode: DeflationMode) -> Result<(), InvalidSetting> {
        if mode == DeflationMode::Canonical {
            return Ok(());
        }
        Err(InvalidSetting::new(
            "deflation_mode",
            format!("{mode:?} is not supported, only Canonical"),
        ))
    }

    /// Sets the convergence tolerance of the inner loop and resets the
    /// algorithm.
    ///
    /// # Errors
    ///
    /// Rejects a tolerance that is not a positive number, keeping the current
    /// value.
    pub fn set_tol(&mut self, tol: f64) -> Result<(), InvalidSetting> {
        self.update_engine(|engine| engine.nipals.set_tol(tol))
    }

    /// Sets the iteration limit of the inner loop and resets the algorithm.
    ///
    /// # Errors
    ///
    /// Rejects zero, keeping the current value.
    pub fn set_max_iter(&mut self, max_iter: usize) -> Result<(), InvalidSetting> {
        self.update_engine(|engine| engine.nipals.set_max_iter(max_iter))
    }

    pub fn set_norm_y_weights(&mut self, norm_y_weights: bool) {
        let _ = self.update_engine(|engine| {
            engine.nipals.norm_y_weights = norm_y_weights;
            Ok(())
        });
    }
}

impl CcaBuilder {
    #[must_use]
    pub fn tol(mut self, tol: f64) -> Self {
        self.engine.nipals.tol = tol;
        self
    }

    #[must_use]
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.engine.nipals.max_iter = max_iter;
        self
    }

    #[must_use]
    pub fn norm_y_weights(mut self, norm_y_weights: bool) -> Self {
        self.engine.nipals.norm_y_weights = norm_y_weights;
        self
    }
}

#[cfg(test)]
mod test {
    use super::{Cca, CcaBuilder};
    use crate::linalg::random_normal;
    use crate::{
        Algorithm, DecompositionError, DeflationMode, NipalsBuilder, Predictor, Preprocessing,
        Supervised, WeightMode,
    };
    use approx::assert_abs_diff_eq;
    use ndarray::{s, Array2};

    const RNG_SEED: u128 = 1234567891011121314;

    fn dataset() -> (Array2<f64>, Array2<f64>) {
        let x = random_normal(40, 4, RNG_SEED);
        let noise = random_normal(40, 3, RNG_SEED + 7);
        let mut y = Array2::zeros((40, 3));
        for i in 0..40 {
            y[(i, 0)] = x[(i, 0)] + 0.5 * noise[(i, 0)];
            y[(i, 1)] = x[(i, 1)] - x[(i, 2)] + 0.5 * noise[(i, 1)];
            y[(i, 2)] = noise[(i, 2)];
        }
        (x, y)
    }

    #[test]
    fn modes_are_fixed() {
        let cca = Cca::new(2).unwrap();
        assert_eq!(cca.engine().nipals().weight_mode(), WeightMode::Cca);
        assert_eq!(
            cca.engine().nipals().deflation_mode(),
            DeflationMode::Canonical
        );
        assert!(cca.engine().nipals().norm_y_weights());
    }

    #[test]
    fn regression_deflation_is_ignored() {
        let (x, y) = dataset();
        let mut cca = Cca::new(2).unwrap();
        cca.configure(&x, &y).unwrap();

        let rejected = cca.set_deflation_mode(DeflationMode::Regression);
        assert_eq!(rejected.unwrap_err().parameter, "deflation_mode");
        assert_eq!(
            cca.engine().nipals().deflation_mode(),
            DeflationMode::Canonical
        );
        // the request is a no-op, not a reset
        assert!(cca.is_configured());
        assert!(cca.set_deflation_mode(DeflationMode::Canonical).is_ok());
    }

    #[test]
    fn first_component_maximizes_correlation() {
        let (x, y) = dataset();
        let mut cca = CcaBuilder::new().n_components(2).build().unwrap();
        cca.configure(&x, &y).unwrap();
        assert_eq!(cca.transform(&x).unwrap().dim(), (40, 2));

        let t = cca.matrix("T").unwrap().column(0).to_owned();
        let u = cca.matrix("U").unwrap().column(0).to_owned();
        let correlation = t.dot(&u) / (t.dot(&t).sqrt() * u.dot(&u).sqrt());
        assert!(correlation > 0.8, "correlation = {correlation}");

        // no PLS pair correlates better than the canonical pair
        let mut pls = NipalsBuilder::new().n_components(1).build().unwrap();
        pls.configure(&x, &y).unwrap();
        let t_pls = pls.matrix("T").unwrap().column(0).to_owned();
        let u_pls = pls.matrix("U").unwrap().column(0).to_owned();
        let correlation_pls =
            t_pls.dot(&u_pls) / (t_pls.dot(&t_pls).sqrt() * u_pls.dot(&u_pls).sqrt());
        assert!(correlation >= correlation_pls - 1e-6);
    }

    #[test]
    fn y_weights_are_normalized() {
        let (x, y) = dataset();
        let mut cca = Cca::new(2).unwrap();
        cca.configure(&x, &y).unwrap();
        let c = cca.matrix("YWeights").unwrap();
        for col in c.columns() {
            assert_abs_diff_eq!(col.dot(&col), 1., epsilon = 1e-8);
        }
    }

    #[test]
    fn predicts_in_target_scale() {
        let (x, y) = dataset();
        let mut cca = CcaBuilder::new()
            .n_components(3)
            .preprocessing(Preprocessing::Standardize)
            .build()
            .unwrap();
        let predicted = cca.configure_and_predict(&x, &y).unwrap();
        assert_eq!(predicted.dim(), (40, 3));
        let mean_predicted = predicted.slice(s![.., 0]).mean().unwrap();
        let mean_actual = y.slice(s![.., 0]).mean().unwrap();
        assert_abs_diff_eq!(mean_predicted, mean_actual, epsilon = 1e-8);
    }

    #[test]
    fn stop_is_observed() {
        let (x, y) = dataset();
        let mut cca = Cca::new(2).unwrap();
        let handle = cca.stop_flag().clone();
        handle.stop();
        assert!(matches!(
            cca.configure(&x, &y),
            Err(DecompositionError::Stopped)
        ));
    }

    #[test]
    fn invalid_settings() {
        let mut cca = Cca::new(2).unwrap();
        assert!(cca.set_tol(0.).is_err());
        assert!(cca.set_max_iter(0).is_err());
        assert!(cca.set_tol(1e-8).is_ok());
        assert_abs_diff_eq!(cca.engine().nipals().tol(), 1e-8);
        cca.set_norm_y_weights(false);
        assert!(!cca.engine().nipals().norm_y_weights());
    }
}
