use crate::DecompositionError;
use itertools::izip;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Trait for implementing column-wise scalings on [`Array2`] data.
pub trait Scale {
    /// Scale an input dataset.
    fn scale<S>(&self, input: &ArrayBase<S, Ix2>) -> Array2<f64>
    where
        S: Data<Elem = f64>;

    /// Reverse the scaling.
    fn inverse_scale<S>(&self, input: &ArrayBase<S, Ix2>) -> Array2<f64>
    where
        S: Data<Elem = f64>;
}

/// The kind of scaling applied to features and targets before modeling.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Preprocessing {
    /// Leaves the data unchanged.
    #[default]
    None,
    /// Subtracts the column means.
    Center,
    /// Subtracts the column means and divides by the column standard
    /// deviations.
    Standardize,
}

/// Implements a mean centered scaling.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct Center {
    /// The computed means for [`Axis`] 0 of the input data.
    pub means: Array1<f64>,
}

impl Center {
    /// Compute the [`Axis`] 0 means on input data and create a [`Center`].
    ///
    /// # Errors
    ///
    /// * `DecompositionError::InvalidInput` if the number of rows in the input is 0
    ///
    /// # Examples
    ///
    /// ```
    /// use petal_pls::{Center, Scale};
    /// let x = ndarray::arr2(&[[0_f64, 0_f64], [1_f64, 1_f64], [2_f64, 2_f64]]);
    /// let center = Center::new(&x).unwrap();
    /// assert_eq!(center.means[0], 1.);
    /// assert_eq!(center.means[1], 1.);
    ///
    /// let scaled_x = center.scale(&x);
    /// assert_eq!(scaled_x[(0, 0)], -1.);
    /// assert_eq!(scaled_x[(1, 0)], 0.);
    /// assert_eq!(scaled_x[(2, 0)], 1.);
    /// ```
    pub fn new<S>(input: &ArrayBase<S, Ix2>) -> Result<Self, DecompositionError>
    where
        S: Data<Elem = f64>,
    {
        let Some(means) = input.mean_axis(Axis(0)) else {
            return Err(DecompositionError::InvalidInput(
                "at least one row is required".to_string(),
            ));
        };
        Ok(Self { means })
    }
}

impl Scale for Center {
    fn scale<S>(&self, input: &ArrayBase<S, Ix2>) -> Array2<f64>
    where
        S: Data<Elem = f64>,
    {
        input - &self.means
    }

    fn inverse_scale<S>(&self, input: &ArrayBase<S, Ix2>) -> Array2<f64>
    where
        S: Data<Elem = f64>,
    {
        input + &self.means
    }
}

/// Implements a scaling to zero mean and unit variance.
///
/// Columns whose sample standard deviation is zero (or undefined, for a
/// single row) are only centered.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct Standardize {
    /// The computed means for [`Axis`] 0 of the input data.
    pub means: Array1<f64>,
    /// The sample standard deviations for [`Axis`] 0 of the input data.
    pub std_devs: Array1<f64>,
}

impl Standardize {
    /// Compute the [`Axis`] 0 means and standard deviations on input data
    /// and create a [`Standardize`].
    ///
    /// # Errors
    ///
    /// * `DecompositionError::InvalidInput` if the number of rows in the input is 0
    pub fn new<S>(input: &ArrayBase<S, Ix2>) -> Result<Self, DecompositionError>
    where
        S: Data<Elem = f64>,
    {
        let Center { means } = Center::new(input)?;
        let mut std_devs = Array1::zeros(input.ncols());
        for (std_dev, col, &mean) in izip!(&mut std_devs, input.lanes(Axis(0)), &means) {
            let n = col.len();
            let sum_sq = col.iter().map(|&e| (e - mean) * (e - mean)).sum::<f64>();
            #[allow(clippy::cast_precision_loss)]
            let sd = if n > 1 {
                (sum_sq / (n - 1) as f64).sqrt()
            } else {
                0.
            };
            *std_dev = if sd > 0. && sd.is_finite() { sd } else { 1. };
        }
        Ok(Self { means, std_devs })
    }
}

impl Scale for Standardize {
    fn scale<S>(&self, input: &ArrayBase<S, Ix2>) -> Array2<f64>
    where
        S: Data<Elem = f64>,
    {
        (input - &self.means) / &self.std_devs
    }

    fn inverse_scale<S>(&self, input: &ArrayBase<S, Ix2>) -> Array2<f64>
    where
        S: Data<Elem = f64>,
    {
        input * &self.std_devs + &self.means
    }
}

/// A fitted scaling of one of the [`Preprocessing`] kinds.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub enum Scaler {
    Identity,
    Center(Center),
    Standardize(Standardize),
}

impl Scaler {
    /// Fits a fresh scaling of the given kind to `input`.
    ///
    /// # Errors
    ///
    /// * `DecompositionError::InvalidInput` if the number of rows in the input is 0
    pub fn fit<S>(kind: Preprocessing, input: &ArrayBase<S, Ix2>) -> Result<Self, DecompositionError>
    where
        S: Data<Elem = f64>,
    {
        match kind {
            Preprocessing::None => Ok(Self::Identity),
            Preprocessing::Center => Ok(Self::Center(Center::new(input)?)),
            Preprocessing::Standardize => Ok(Self::Standardize(Standardize::new(input)?)),
        }
    }
}

impl Scale for Scaler {
    fn scale<S>(&self, input: &ArrayBase<S, Ix2>) -> Array2<f64>
    where
        S: Data<Elem = f64>,
    {
        match self {
            Self::Identity => input.to_owned(),
            Self::Center(center) => center.scale(input),
            Self::Standardize(standardize) => standardize.scale(input),
        }
    }

    fn inverse_scale<S>(&self, input: &ArrayBase<S, Ix2>) -> Array2<f64>
    where
        S: Data<Elem = f64>,
    {
        match self {
            Self::Identity => input.to_owned(),
            Self::Center(center) => center.inverse_scale(input),
            Self::Standardize(standardize) => standardize.inverse_scale(input),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::DecompositionError;

    use super::{Center, Preprocessing, Scale, Scaler, Standardize};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::{arr2, Array2};

    #[test]
    fn center() {
        let x = arr2(&[[0_f64, 0_f64], [1_f64, 1_f64], [2_f64, 2_f64]]);
        let center = Center::new(&x).unwrap();
        assert_relative_eq!(center.means[0], 1.);
        assert_relative_eq!(center.means[1], 1.);

        let scaled_x = center.scale(&x);
        assert_relative_eq!(scaled_x[(0, 0)], -1.);
        assert_relative_eq!(scaled_x[(1, 0)], 0.);
        assert_relative_eq!(scaled_x[(2, 0)], 1.);

        assert_relative_eq!(x, center.inverse_scale(&scaled_x));
    }

    #[test]
    fn center_zeros() {
        let x = Array2::<f64>::zeros((0, 5));
        match Center::new(&x) {
            Ok(_) => panic!("Mean on zero size matrix should error."),
            Err(DecompositionError::InvalidInput(_)) => {}
            Err(e) => panic!("Unexpected error type {e:?} for mean"),
        };
    }

    #[test]
    fn standardize() {
        let x = arr2(&[[1_f64, 10_f64], [2_f64, 10_f64], [3_f64, 10_f64]]);
        let standardize = Standardize::new(&x).unwrap();
        assert_abs_diff_eq!(standardize.means[0], 2., epsilon = 1e-12);
        assert_abs_diff_eq!(standardize.std_devs[0], 1., epsilon = 1e-12);
        // constant column
        assert_abs_diff_eq!(standardize.std_devs[1], 1., epsilon = 1e-12);

        let scaled_x = standardize.scale(&x);
        assert_abs_diff_eq!(scaled_x[(0, 0)], -1., epsilon = 1e-12);
        assert_abs_diff_eq!(scaled_x[(2, 0)], 1., epsilon = 1e-12);
        assert_abs_diff_eq!(scaled_x[(1, 1)], 0., epsilon = 1e-12);
        assert!(standardize.inverse_scale(&scaled_x).abs_diff_eq(&x, 1e-12));
    }

    #[test]
    fn standardize_unit_variance() {
        let x = arr2(&[[2_f64], [4.], [4.], [4.], [5.], [5.], [7.], [9.]]);
        let standardize = Standardize::new(&x).unwrap();
        let scaled = standardize.scale(&x);
        let var = scaled.iter().map(|e| e * e).sum::<f64>() / 7.;
        assert_abs_diff_eq!(var, 1., epsilon = 1e-12);
    }

    #[test]
    fn standardize_single_row() {
        let x = arr2(&[[3_f64, -1_f64]]);
        let standardize = Standardize::new(&x).unwrap();
        assert_eq!(standardize.std_devs, ndarray::arr1(&[1., 1.]));
        assert_eq!(standardize.scale(&x), arr2(&[[0., 0.]]));
    }

    #[test]
    fn scaler_none_is_identity() {
        let x = arr2(&[[1_f64, 2.], [3., 4.]]);
        let scaler = Scaler::fit(Preprocessing::None, &x).unwrap();
        assert_eq!(scaler.scale(&x), x);
        assert_eq!(scaler.inverse_scale(&x), x);
    }
}
