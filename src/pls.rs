use crate::algorithm::{Algorithm, Predictor, StopFlag, Supervised};
use crate::scale::{Preprocessing, Scale, Scaler};
use crate::{DecompositionError, InvalidSetting};
use ndarray::{Array2, ArrayView2};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const DEFAULT_N_COMPONENTS: usize = 5;

/// The algorithm-specific part of a partial least squares method.
///
/// An engine receives preprocessed data and returns its model; the
/// surrounding [`Pls`] takes care of preprocessing, the configuration state
/// and cancellation.
pub trait PlsEngine {
    type Model;

    /// The inclusive range of response columns the engine accepts.
    fn response_bounds(&self) -> (usize, Option<usize>) {
        (1, None)
    }

    /// Checks the engine parameters.
    ///
    /// # Errors
    ///
    /// Returns the first rejected parameter.
    fn validate(&self) -> Result<(), InvalidSetting> {
        Ok(())
    }

    /// Learns a model with `n_components` components.
    ///
    /// # Errors
    ///
    /// * [`DecompositionError::Stopped`] if `stop` was raised.
    /// * [`DecompositionError::InversionFailed`] or
    ///   [`DecompositionError::LinalgError`] if a decomposition fails.
    fn fit(
        &self,
        input: Array2<f64>,
        response: Array2<f64>,
        n_components: usize,
        stop: &StopFlag,
    ) -> Result<Self::Model, DecompositionError>;

    /// Projects preprocessed `input` onto the latent components.
    fn transform(&self, model: &Self::Model, input: ArrayView2<'_, f64>) -> Array2<f64>;

    /// Predicts preprocessed targets from preprocessed `input`.
    fn predict(&self, model: &Self::Model, input: ArrayView2<'_, f64>) -> Array2<f64>;

    fn can_predict(&self) -> bool {
        true
    }

    /// Names accepted by [`matrix`](Self::matrix).
    fn matrix_names(&self) -> &'static [&'static str];

    fn matrix<'a>(&self, model: &'a Self::Model, name: &str) -> Option<&'a Array2<f64>>;

    /// The matrix reported as the loadings of the model, if any.
    fn loadings<'a>(&self, _model: &'a Self::Model) -> Option<&'a Array2<f64>> {
        None
    }
}

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "M: Serialize",
        deserialize = "M: Deserialize<'de>"
    ))
)]
#[derive(Clone, Debug)]
struct Fitted<M> {
    input_scaler: Scaler,
    response_scaler: Scaler,
    n_features: usize,
    model: M,
}

/// A partial least squares algorithm: the shared scaffold around a
/// [`PlsEngine`].
///
/// Features and targets are preprocessed independently with the configured
/// [`Preprocessing`]; predictions are mapped back to the scale of the
/// targets. The projection is lossy, so [`inverse_transform`] always fails.
///
/// [`inverse_transform`]: Algorithm::inverse_transform
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "E: Serialize, E::Model: Serialize",
        deserialize = "E: Deserialize<'de>, E::Model: Deserialize<'de>"
    ))
)]
pub struct Pls<E>
where
    E: PlsEngine,
{
    preprocessing: Preprocessing,
    n_components: usize,
    engine: E,
    #[cfg_attr(feature = "serde", serde(skip))]
    stop: StopFlag,
    fitted: Option<Fitted<E::Model>>,
}

impl<E> Pls<E>
where
    E: PlsEngine,
{
    /// Creates an unconfigured algorithm with five components and no
    /// preprocessing.
    #[must_use]
    pub fn with_engine(engine: E) -> Self {
        Self {
            preprocessing: Preprocessing::default(),
            n_components: DEFAULT_N_COMPONENTS,
            engine,
            stop: StopFlag::new(),
            fitted: None,
        }
    }

    #[inline]
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Sets the number of components to extract and resets the algorithm.
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
    pub fn preprocessing(&self) -> Preprocessing {
        self.preprocessing
    }

    /// Sets the preprocessing of features and targets and resets the
    /// algorithm.
    pub fn set_preprocessing(&mut self, preprocessing: Preprocessing) {
        self.preprocessing = preprocessing;
        self.reset();
    }

    #[inline]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Returns the learned model, or `None` if unconfigured.
    pub fn model(&self) -> Option<&E::Model> {
        self.fitted.as_ref().map(|fitted| &fitted.model)
    }

    /// Names of the matrices available through [`matrix`](Self::matrix).
    pub fn matrix_names(&self) -> &'static [&'static str] {
        self.engine.matrix_names()
    }

    /// Returns the named internal matrix, or `None` if the name is unknown
    /// or the algorithm is unconfigured.
    pub fn matrix(&self, name: &str) -> Option<&Array2<f64>> {
        self.fitted
            .as_ref()
            .and_then(|fitted| self.engine.matrix(&fitted.model, name))
    }

    pub fn has_loadings(&self) -> bool {
        self.loadings().is_some()
    }

    pub fn loadings(&self) -> Option<&Array2<f64>> {
        self.fitted
            .as_ref()
            .and_then(|fitted| self.engine.loadings(&fitted.model))
    }

    pub fn can_predict(&self) -> bool {
        self.engine.can_predict()
    }

    /// Applies a change to the engine parameters; the algorithm is reset if
    /// the change is accepted.
    pub(crate) fn update_engine<F>(&mut self, update: F) -> Result<(), InvalidSetting>
    where
        F: FnOnce(&mut E) -> Result<(), InvalidSetting>,
    {
        update(&mut self.engine)?;
        self.reset();
        Ok(())
    }

    fn fitted(&self) -> Result<&Fitted<E::Model>, DecompositionError> {
        self.fitted.as_ref().ok_or(DecompositionError::Unconfigured)
    }

    fn scaled_input(
        fitted: &Fitted<E::Model>,
        input: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, DecompositionError> {
        if input.ncols() != fitted.n_features {
            return Err(DecompositionError::InvalidInput(format!(
                "# of columns should be {}",
                fitted.n_features
            )));
        }
        Ok(fitted.input_scaler.scale(&input))
    }
}

impl<E> Default for Pls<E>
where
    E: PlsEngine + Default,
{
    fn default() -> Self {
        Self::with_engine(E::default())
    }
}

impl<E> Algorithm for Pls<E>
where
    E: PlsEngine,
{
    fn is_configured(&self) -> bool {
        self.fitted.is_some()
    }

    fn reset(&mut self) {
        self.fitted = None;
    }

    fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    fn is_non_invertible(&self) -> bool {
        true
    }

    fn do_transform(&self, input: ArrayView2<'_, f64>) -> Result<Array2<f64>, DecompositionError> {
        let fitted = self.fitted()?;
        let x = Self::scaled_input(fitted, input)?;
        Ok(self.engine.transform(&fitted.model, x.view()))
    }
}

impl<E> Supervised for Pls<E>
where
    E: PlsEngine,
{
    fn response_bounds(&self) -> (usize, Option<usize>) {
        self.engine.response_bounds()
    }

    fn do_configure(
        &mut self,
        input: ArrayView2<'_, f64>,
        response: ArrayView2<'_, f64>,
    ) -> Result<(), DecompositionError> {
        let input_scaler = Scaler::fit(self.preprocessing, &input)?;
        let response_scaler = Scaler::fit(self.preprocessing, &response)?;
        let x = input_scaler.scale(&input);
        let y = response_scaler.scale(&response);
        let model = self.engine.fit(x, y, self.n_components, &self.stop)?;
        self.fitted = Some(Fitted {
            input_scaler,
            response_scaler,
            n_features: input.ncols(),
            model,
        });
        Ok(())
    }
}

impl<E> Predictor for Pls<E>
where
    E: PlsEngine,
{
    fn do_predict(&self, input: ArrayView2<'_, f64>) -> Result<Array2<f64>, DecompositionError> {
        let fitted = self.fitted()?;
        let x = Self::scaled_input(fitted, input)?;
        let y = self.engine.predict(&fitted.model, x.view());
        Ok(fitted.response_scaler.inverse_scale(&y))
    }
}

/// Builder for [`Pls`] algorithms.
///
/// Engine-specific options are provided by the aliases such as
/// [`NipalsBuilder`](crate::NipalsBuilder).
pub struct PlsBuilder<E> {
    n_components: usize,
    preprocessing: Preprocessing,
    pub(crate) engine: E,
}

impl<E> PlsBuilder<E>
where
    E: PlsEngine + Default,
{
    /// Starts from five components, no preprocessing and the default engine
    /// parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::with_engine(E::default())
    }
}

impl<E> Default for PlsBuilder<E>
where
    E: PlsEngine + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> PlsBuilder<E>
where
    E: PlsEngine,
{
    #[must_use]
    pub fn with_engine(engine: E) -> Self {
        Self {
            n_components: DEFAULT_N_COMPONENTS,
            preprocessing: Preprocessing::default(),
            engine,
        }
    }

    /// Sets the number of components to extract.
    #[must_use]
    pub fn n_components(mut self, n_components: usize) -> Self {
        self.n_components = n_components;
        self
    }

    /// Sets the preprocessing applied to both features and targets.
    #[must_use]
    pub fn preprocessing(mut self, preprocessing: Preprocessing) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    /// Creates an unconfigured algorithm.
    ///
    /// # Errors
    ///
    /// Returns the first invalid parameter.
    pub fn build(self) -> Result<Pls<E>, InvalidSetting> {
        self.engine.validate()?;
        let mut pls = Pls::with_engine(self.engine);
        pls.set_n_components(self.n_components)?;
        pls.preprocessing = self.preprocessing;
        Ok(pls)
    }
}
