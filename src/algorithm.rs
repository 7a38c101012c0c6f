use crate::DecompositionError;
use ndarray::{Array2, ArrayBase, ArrayView2, Data, Ix2};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative cancellation flag.
///
/// Clones share the same flag, so a handle obtained from
/// [`Algorithm::stop_flag`] can stop a long-running `configure` from another
/// thread. Algorithms check the flag at the top of every outer and inner
/// iteration and abort with [`DecompositionError::Stopped`].
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the algorithm to stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Withdraws a stop request so that the algorithm can be configured again.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub(crate) fn check(&self) -> Result<(), DecompositionError> {
        if self.is_stopped() {
            Err(DecompositionError::Stopped)
        } else {
            Ok(())
        }
    }
}

/// The lifecycle shared by every algorithm.
///
/// An algorithm starts unconfigured, learns a model through the `configure`
/// of [`Supervised`] or [`Unsupervised`], and can then transform data. The
/// `do_*` methods are the hooks implementors provide; callers use the
/// methods without the prefix, which check the configuration state first.
pub trait Algorithm {
    fn is_configured(&self) -> bool;

    /// Discards the learned model.
    fn reset(&mut self);

    fn stop_flag(&self) -> &StopFlag;

    fn stop(&self) {
        self.stop_flag().stop();
    }

    fn is_stopped(&self) -> bool {
        self.stop_flag().is_stopped()
    }

    /// Returns `true` if the transformation cannot be reversed.
    fn is_non_invertible(&self) -> bool {
        false
    }

    /// # Errors
    ///
    /// Returns [`DecompositionError::Unconfigured`] if no model has been
    /// learned yet.
    fn ensure_configured(&self) -> Result<(), DecompositionError> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(DecompositionError::Unconfigured)
        }
    }

    /// # Errors
    ///
    /// Returns an error if `input` does not match the learned model.
    fn do_transform(&self, input: ArrayView2<'_, f64>) -> Result<Array2<f64>, DecompositionError>;

    /// # Errors
    ///
    /// Returns [`DecompositionError::Uninvertible`] unless overridden.
    fn do_inverse_transform(
        &self,
        _input: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, DecompositionError> {
        Err(DecompositionError::Uninvertible)
    }

    /// Applies the learned transformation to `input`.
    ///
    /// # Errors
    ///
    /// * [`DecompositionError::Unconfigured`] if no model has been learned.
    /// * [`DecompositionError::InvalidInput`] if the number of columns of
    ///   `input` does not match the training data.
    fn transform<S>(&self, input: &ArrayBase<S, Ix2>) -> Result<Array2<f64>, DecompositionError>
    where
        S: Data<Elem = f64>,
    {
        self.ensure_configured()?;
        self.do_transform(input.view())
    }

    /// Maps transformed data back to its original space.
    ///
    /// # Errors
    ///
    /// * [`DecompositionError::Uninvertible`] if the algorithm cannot be
    ///   inverted.
    /// * [`DecompositionError::Unconfigured`] if no model has been learned.
    fn inverse_transform<S>(
        &self,
        input: &ArrayBase<S, Ix2>,
    ) -> Result<Array2<f64>, DecompositionError>
    where
        S: Data<Elem = f64>,
    {
        if self.is_non_invertible() {
            return Err(DecompositionError::Uninvertible);
        }
        self.ensure_configured()?;
        self.do_inverse_transform(input.view())
    }
}

/// An algorithm learning from features and targets.
pub trait Supervised: Algorithm {
    /// The inclusive range of response columns accepted by `configure`;
    /// `None` as the upper bound means unbounded.
    fn response_bounds(&self) -> (usize, Option<usize>) {
        (1, None)
    }

    /// Learns the model and installs it. Called only with validated input.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be learned.
    fn do_configure(
        &mut self,
        input: ArrayView2<'_, f64>,
        response: ArrayView2<'_, f64>,
    ) -> Result<(), DecompositionError>;

    /// Learns a model from features `input` and targets `response`,
    /// replacing any previous model.
    ///
    /// The algorithm is reset first, so it is unconfigured if this fails.
    ///
    /// # Errors
    ///
    /// * [`DecompositionError::ResponseCount`] if the number of columns of
    ///   `response` is outside [`response_bounds`](Self::response_bounds).
    /// * [`DecompositionError::InvalidInput`] if `input` and `response` have
    ///   different numbers of rows.
    /// * [`DecompositionError::Stopped`] if the stop flag was raised.
    fn configure<S, T>(
        &mut self,
        input: &ArrayBase<S, Ix2>,
        response: &ArrayBase<T, Ix2>,
    ) -> Result<(), DecompositionError>
    where
        S: Data<Elem = f64>,
        T: Data<Elem = f64>,
    {
        self.reset();
        let (min, max) = self.response_bounds();
        let actual = response.ncols();
        if actual < min || max.map_or(false, |max| actual > max) {
            return Err(DecompositionError::ResponseCount { min, max, actual });
        }
        if input.nrows() != response.nrows() {
            return Err(DecompositionError::InvalidInput(format!(
                "# of rows should be equal: {} != {}",
                input.nrows(),
                response.nrows()
            )));
        }
        self.do_configure(input.view(), response.view())
    }

    /// Configures the algorithm unless it already is, then transforms
    /// `input`.
    ///
    /// # Errors
    ///
    /// Returns any error of [`configure`](Self::configure) or
    /// [`transform`](Algorithm::transform).
    fn configure_and_transform<S, T>(
        &mut self,
        input: &ArrayBase<S, Ix2>,
        response: &ArrayBase<T, Ix2>,
    ) -> Result<Array2<f64>, DecompositionError>
    where
        S: Data<Elem = f64>,
        T: Data<Elem = f64>,
    {
        if !self.is_configured() {
            self.configure(input, response)?;
        }
        self.transform(input)
    }
}

/// A supervised algorithm that predicts targets.
pub trait Predictor: Supervised {
    /// # Errors
    ///
    /// Returns an error if `input` does not match the learned model.
    fn do_predict(&self, input: ArrayView2<'_, f64>) -> Result<Array2<f64>, DecompositionError>;

    /// Predicts targets for `input`.
    ///
    /// # Errors
    ///
    /// * [`DecompositionError::Unconfigured`] if no model has been learned.
    /// * [`DecompositionError::InvalidInput`] if the number of columns of
    ///   `input` does not match the training data.
    fn predict<S>(&self, input: &ArrayBase<S, Ix2>) -> Result<Array2<f64>, DecompositionError>
    where
        S: Data<Elem = f64>,
    {
        self.ensure_configured()?;
        self.do_predict(input.view())
    }

    /// Configures the algorithm unless it already is, then predicts targets
    /// for `input`.
    ///
    /// # Errors
    ///
    /// Returns any error of [`configure`](Supervised::configure) or
    /// [`predict`](Self::predict).
    fn configure_and_predict<S, T>(
        &mut self,
        input: &ArrayBase<S, Ix2>,
        response: &ArrayBase<T, Ix2>,
    ) -> Result<Array2<f64>, DecompositionError>
    where
        S: Data<Elem = f64>,
        T: Data<Elem = f64>,
    {
        if !self.is_configured() {
            self.configure(input, response)?;
        }
        self.predict(input)
    }
}

/// An algorithm learning from features alone.
pub trait Unsupervised: Algorithm {
    /// Learns the model and installs it.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be learned.
    fn do_configure(&mut self, input: ArrayView2<'_, f64>) -> Result<(), DecompositionError>;

    /// Learns a model from `input`, replacing any previous model.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be learned; the algorithm is
    /// left unconfigured.
    fn configure<S>(&mut self, input: &ArrayBase<S, Ix2>) -> Result<(), DecompositionError>
    where
        S: Data<Elem = f64>,
    {
        self.reset();
        self.do_configure(input.view())
    }

    /// Configures the algorithm unless it already is, then transforms
    /// `input`.
    ///
    /// # Errors
    ///
    /// Returns any error of [`configure`](Self::configure) or
    /// [`transform`](Algorithm::transform).
    fn configure_and_transform<S>(
        &mut self,
        input: &ArrayBase<S, Ix2>,
    ) -> Result<Array2<f64>, DecompositionError>
    where
        S: Data<Elem = f64>,
    {
        if !self.is_configured() {
            self.configure(input)?;
        }
        self.transform(input)
    }
}
