//! Multivariate calibration and dimensionality reduction algorithms.
//!
//! Every algorithm shares one lifecycle: it is created unconfigured, learns
//! its model in `configure`, and then maps new data with `transform` (and,
//! for the supervised ones, `predict`). The partial least squares family
//! ([`Nipals`], [`Cca`], [`Pls1`], [`Simpls`]) is built on the common
//! [`Pls`] scaffold; [`Pca`] is the unsupervised, invertible member.
//!
//! # Examples
//!
//! ```
//! use petal_pls::{NipalsBuilder, Predictor, Preprocessing, Supervised};
//!
//! let x = ndarray::arr2(&[[1_f64, 2.], [2., 4.], [3., 6.], [4., 8.]]);
//! let y = ndarray::arr2(&[[3_f64], [6.], [9.], [12.]]);
//! let mut pls = NipalsBuilder::new()
//!     .n_components(1)
//!     .preprocessing(Preprocessing::Standardize)
//!     .build()
//!     .unwrap();
//! pls.configure(&x, &y).unwrap();
//! let predicted = pls.predict(&x).unwrap();
//! assert!((predicted[(2, 0)] - 9.).abs() < 1e-6);
//! ```

mod algorithm;
mod cca;
pub mod linalg;
mod nipals;
mod pca;
mod pls;
mod pls1;
mod scale;
mod simpls;

pub use algorithm::{Algorithm, Predictor, StopFlag, Supervised, Unsupervised};
pub use cca::{Cca, CcaBuilder, CcaEngine};
pub use nipals::{DeflationMode, Nipals, NipalsBuilder, NipalsEngine, NipalsModel, WeightMode};
pub use pca::{Pca, PcaBuilder};
pub use pls::{Pls, PlsBuilder, PlsEngine};
pub use pls1::{Pls1, Pls1Builder, Pls1Engine, Pls1Model};
pub use scale::{Center, Preprocessing, Scale, Scaler, Standardize};
pub use simpls::{Simpls, SimplsBuilder, SimplsEngine, SimplsModel};
use thiserror::Error;

/// The error type for configuring and applying an algorithm.
#[derive(Debug, Error)]
pub enum DecompositionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("number of response columns should be {}, got {actual}", expected_range(.min, .max))]
    ResponseCount {
        min: usize,
        max: Option<usize>,
        actual: usize,
    },
    #[error("algorithm has not been configured")]
    Unconfigured,
    #[error("algorithm cannot be inverted")]
    Uninvertible,
    #[error("matrix inversion failed")]
    InversionFailed(#[source] linalg::Error),
    #[error("linear algebra operation failed")]
    LinalgError(#[from] linalg::Error),
    #[error("algorithm was stopped")]
    Stopped,
}

fn expected_range(min: &usize, max: &Option<usize>) -> String {
    match max {
        Some(max) if max == min => format!("exactly {min}"),
        Some(max) => format!("between {min} and {max}"),
        None => format!("at least {min}"),
    }
}

/// A parameter value that was rejected by a setter.
///
/// The algorithm keeps the value it had before the call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid value for `{parameter}`: {reason}")]
pub struct InvalidSetting {
    pub parameter: &'static str,
    pub reason: String,
}

impl InvalidSetting {
    pub(crate) fn new(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self {
            parameter,
            reason: reason.into(),
        }
    }
}
