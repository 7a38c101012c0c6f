//! Dense decompositions consumed by the algorithms.
//!
//! Inputs and outputs are [`ndarray`] matrices; the decompositions themselves
//! are carried out by [`nalgebra`].

use nalgebra::{DMatrix, SymmetricEigen, SVD};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
#[cfg(target_pointer_width = "32")]
use rand_pcg::Lcg64Xsh32 as Pcg;
#[cfg(not(target_pointer_width = "32"))]
use rand_pcg::Mcg128Xsl64 as Pcg;
use std::cmp::Ordering;

/// Upper bound on the iterations of the SVD and eigen solvers.
const MAX_ITERATIONS: usize = 10_000;

/// The error type for linear algebra operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("matrix is not square: {0} x {1}")]
    NotSquare(usize, usize),
    #[error("matrix is singular")]
    Singular,
    #[error("{0} did not converge")]
    NoConvergence(&'static str),
}

pub type SvdOutput = (Array2<f64>, Array1<f64>, Array2<f64>);

/// Computes the thin singular value decomposition `a = u * diag(sigma) * vt`.
///
/// Singular values are sorted in descending order.
///
/// # Errors
///
/// Returns [`Error::NoConvergence`] if the iterative solver does not converge.
pub fn svd<S>(a: &ArrayBase<S, Ix2>) -> Result<SvdOutput, Error>
where
    S: Data<Elem = f64>,
{
    let (nrows, ncols) = a.dim();
    if nrows == 0 || ncols == 0 {
        return Ok((
            Array2::zeros((nrows, 0)),
            Array1::zeros(0),
            Array2::zeros((0, ncols)),
        ));
    }
    let decomposition = SVD::try_new(to_dmatrix(a), true, true, f64::EPSILON, MAX_ITERATIONS)
        .ok_or(Error::NoConvergence("singular value decomposition"))?;
    let (Some(u), Some(v_t)) = (decomposition.u.as_ref(), decomposition.v_t.as_ref()) else {
        return Err(Error::NoConvergence("singular value decomposition"));
    };

    let sigma = &decomposition.singular_values;
    let mut order: Vec<usize> = (0..sigma.len()).collect();
    order.sort_by(|&i, &j| sigma[j].partial_cmp(&sigma[i]).unwrap_or(Ordering::Equal));

    let u = Array2::from_shape_fn((nrows, order.len()), |(i, j)| u[(i, order[j])]);
    let vt = Array2::from_shape_fn((order.len(), ncols), |(i, j)| v_t[(order[i], j)]);
    let sigma = order.iter().map(|&i| sigma[i]).collect();
    Ok((u, sigma, vt))
}

/// Computes the Moore-Penrose pseudo-inverse of `a`.
///
/// Singular values below `max(nrows, ncols) * eps * largest singular value`
/// are treated as zero.
///
/// # Errors
///
/// Returns [`Error::NoConvergence`] if the underlying SVD fails.
pub fn pinv<S>(a: &ArrayBase<S, Ix2>) -> Result<Array2<f64>, Error>
where
    S: Data<Elem = f64>,
{
    let (u, sigma, vt) = svd(a)?;
    let largest = sigma.iter().fold(0_f64, |max, &s| max.max(s));
    #[allow(clippy::cast_precision_loss)]
    let cutoff = a.nrows().max(a.ncols()) as f64 * f64::EPSILON * largest;

    let mut v = vt.reversed_axes();
    for (mut col, &s) in v.axis_iter_mut(Axis(1)).zip(sigma.iter()) {
        if s > cutoff {
            col.mapv_inplace(|e| e / s);
        } else {
            col.fill(0.);
        }
    }
    Ok(v.dot(&u.t()))
}

/// Computes the inverse of a square matrix.
///
/// # Errors
///
/// * [`Error::NotSquare`] if `a` is not square.
/// * [`Error::Singular`] if `a` cannot be inverted.
pub fn inv<S>(a: &ArrayBase<S, Ix2>) -> Result<Array2<f64>, Error>
where
    S: Data<Elem = f64>,
{
    if !a.is_square() {
        return Err(Error::NotSquare(a.nrows(), a.ncols()));
    }
    let inverse = to_dmatrix(a).try_inverse().ok_or(Error::Singular)?;
    let inverse = from_dmatrix(&inverse);
    if inverse.iter().all(|e| e.is_finite()) {
        Ok(inverse)
    } else {
        Err(Error::Singular)
    }
}

/// Computes eigenvalues and eigenvectors of a symmetric matrix.
///
/// Eigenvalues are sorted in descending order; the eigenvector for the
/// `i`-th eigenvalue is the `i`-th column of the returned matrix.
///
/// # Errors
///
/// * [`Error::NotSquare`] if `a` is not square.
/// * [`Error::NoConvergence`] if the iterative solver does not converge.
pub fn eigh<S>(a: &ArrayBase<S, Ix2>) -> Result<(Array1<f64>, Array2<f64>), Error>
where
    S: Data<Elem = f64>,
{
    if !a.is_square() {
        return Err(Error::NotSquare(a.nrows(), a.ncols()));
    }
    let n = a.nrows();
    if n == 0 {
        return Ok((Array1::zeros(0), Array2::zeros((0, 0))));
    }
    let eigen = SymmetricEigen::try_new(to_dmatrix(a), f64::EPSILON, MAX_ITERATIONS)
        .ok_or(Error::NoConvergence("eigen decomposition"))?;

    let values = &eigen.eigenvalues;
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| values[j].partial_cmp(&values[i]).unwrap_or(Ordering::Equal));

    let vectors = Array2::from_shape_fn((n, n), |(i, j)| eigen.eigenvectors[(i, order[j])]);
    let values = order.iter().map(|&i| values[i]).collect();
    Ok((values, vectors))
}

/// Creates a matrix of standard normal samples from a PCG random number
/// generator seeded with `seed`.
///
/// It uses the XSL 128/64 (MCG) variant on a 64-bit CPU and the XSH RR 64/32
/// (LCG) variant on a 32-bit CPU, so the same seed always yields the same
/// matrix on a given platform.
#[must_use]
pub fn random_normal(nrows: usize, ncols: usize, seed: u128) -> Array2<f64> {
    let mut rng = Pcg::from_seed(seed.to_be_bytes());
    Array2::from_shape_fn((nrows, ncols), |_| rng.sample(StandardNormal))
}

/// Makes `SVD`'s output deterministic using the columns of `u` as the basis for
/// sign flipping.
pub(crate) fn svd_flip(u: &mut Array2<f64>, v: &mut Array2<f64>) {
    for (u_col, v_row) in u.lanes_mut(Axis(0)).into_iter().zip(v.lanes_mut(Axis(1))) {
        let mut absmax = 0.;
        let mut signum = 1.;
        for e in &u_col {
            if e.abs() > absmax {
                absmax = e.abs();
                signum = e.signum();
            }
        }
        if signum < 0. {
            for e in u_col {
                *e = -*e;
            }
            for e in v_row {
                *e = -*e;
            }
        }
    }
}

/// Flips the sign of `v` so that its entry with the largest magnitude is
/// positive.
pub(crate) fn flip_sign(v: &mut Array1<f64>) {
    let mut absmax = 0.;
    let mut signum = 1.;
    for e in v.iter() {
        if e.abs() > absmax {
            absmax = e.abs();
            signum = e.signum();
        }
    }
    if signum < 0. {
        v.mapv_inplace(|e| -e);
    }
}

/// Outer product `a * bᵀ`.
pub(crate) fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j])
}

fn to_dmatrix<S>(a: &ArrayBase<S, Ix2>) -> DMatrix<f64>
where
    S: Data<Elem = f64>,
{
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[(i, j)])
}

fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}
