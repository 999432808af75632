//! Linear operator interface.
//!
//! Every map the engines touch (projector, composite chain, subset projector,
//! finite differences) goes through [`LinearOperator`]. Buffers are flat
//! row-major slices; the operator carries the logical shapes.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::vector::{dot, norm2, scale};
use crate::error::{ReconError, ReconResult};

/// Relative tolerance used to stop power iteration early.
const POWER_ITER_TOL: f64 = 1e-10;

/// Seed for the power-iteration start vector, so norm estimates are reproducible.
const POWER_ITER_SEED: u64 = 0x5EED_0F_A11;

/// Linear map between an image space and a measurement space.
///
/// # Contract
///
/// - `apply_into` and `adjoint_into` overwrite their output buffer.
/// - They assume buffer lengths equal `in_len()` / `out_len()`; the checked
///   [`apply`](LinearOperator::apply) / [`adjoint`](LinearOperator::adjoint)
///   wrappers verify this and return [`ReconError::ShapeMismatch`].
/// - `adjoint_into` must be the exact adjoint of `apply_into` up to rounding:
///   `<A u, v> == <u, Aᵀ v>` (see [`adjointness_gap`]).
pub trait LinearOperator: Send + Sync {
    /// Logical shape of the input (image) space.
    fn in_shape(&self) -> &[usize];

    /// Logical shape of the output (measurement) space.
    fn out_shape(&self) -> &[usize];

    /// y ← A x
    fn apply_into(&self, x: &[f64], y: &mut [f64]);

    /// x ← Aᵀ y
    fn adjoint_into(&self, y: &[f64], x: &mut [f64]);

    /// Number of input elements.
    fn in_len(&self) -> usize {
        self.in_shape().iter().product()
    }

    /// Number of output elements.
    fn out_len(&self) -> usize {
        self.out_shape().iter().product()
    }

    /// Checked forward application.
    fn apply(&self, x: &[f64]) -> ReconResult<Vec<f64>> {
        if x.len() != self.in_len() {
            return Err(ReconError::length("apply input", self.in_len(), x.len()));
        }
        let mut y = vec![0.0; self.out_len()];
        self.apply_into(x, &mut y);
        Ok(y)
    }

    /// Checked adjoint application.
    fn adjoint(&self, y: &[f64]) -> ReconResult<Vec<f64>> {
        if y.len() != self.out_len() {
            return Err(ReconError::length("adjoint input", self.out_len(), y.len()));
        }
        let mut x = vec![0.0; self.in_len()];
        self.adjoint_into(y, &mut x);
        Ok(x)
    }

    /// Estimate ||A||₂ by power iteration on AᵀA.
    ///
    /// Stops after `iterations` rounds or once the eigenvalue estimate changes
    /// by less than a relative 1e-10. Returns 0 for the zero operator.
    fn estimate_norm(&self, iterations: usize) -> f64 {
        power_iteration(self, iterations)
    }
}

/// Power iteration shared by the default `estimate_norm`.
pub fn power_iteration<A: LinearOperator + ?Sized>(op: &A, iterations: usize) -> f64 {
    let mut rng = ChaCha8Rng::seed_from_u64(POWER_ITER_SEED);
    let mut x: Vec<f64> = (0..op.in_len()).map(|_| rng.gen_range(0.5..1.5)).collect();
    let mut y = vec![0.0; op.out_len()];

    let x_norm = norm2(&x);
    if x_norm == 0.0 {
        return 0.0;
    }
    scale(1.0 / x_norm, &mut x);

    let mut lambda = 0.0_f64;
    let mut x_next = vec![0.0; x.len()];
    for _ in 0..iterations {
        op.apply_into(&x, &mut y);
        op.adjoint_into(&y, &mut x_next);

        let lambda_next = norm2(&x_next);
        if lambda_next == 0.0 || !lambda_next.is_finite() {
            return 0.0;
        }
        scale(1.0 / lambda_next, &mut x_next);
        std::mem::swap(&mut x, &mut x_next);

        let converged = (lambda_next - lambda).abs() <= POWER_ITER_TOL * lambda_next;
        lambda = lambda_next;
        if converged {
            break;
        }
    }

    lambda.sqrt()
}

/// Relative defect of the adjoint identity for a pair of test vectors.
///
/// Returns `|<A u, v> - <u, Aᵀ v>| / max(1, |<A u, v>|)`.
pub fn adjointness_gap<A: LinearOperator + ?Sized>(op: &A, u: &[f64], v: &[f64]) -> ReconResult<f64> {
    let au = op.apply(u)?;
    let atv = op.adjoint(v)?;
    let lhs = dot(&au, v);
    let rhs = dot(u, &atv);
    Ok((lhs - rhs).abs() / lhs.abs().max(1.0))
}

impl<T: LinearOperator + ?Sized> LinearOperator for Box<T> {
    fn in_shape(&self) -> &[usize] {
        (**self).in_shape()
    }

    fn out_shape(&self) -> &[usize] {
        (**self).out_shape()
    }

    fn apply_into(&self, x: &[f64], y: &mut [f64]) {
        (**self).apply_into(x, y)
    }

    fn adjoint_into(&self, y: &[f64], x: &mut [f64]) {
        (**self).adjoint_into(y, x)
    }

    fn estimate_norm(&self, iterations: usize) -> f64 {
        (**self).estimate_norm(iterations)
    }
}
