//! Element-wise multiplication operator.

use super::operator::LinearOperator;
use crate::error::{ReconError, ReconResult};

/// `x ↦ d ⊙ x` on a fixed shape. Self-adjoint.
///
/// Typical use is a multiplicative correction (attenuation or detector
/// efficiency weights) chained after a geometric projector.
#[derive(Debug, Clone)]
pub struct DiagonalOperator {
    shape: Vec<usize>,
    weights: Vec<f64>,
}

impl DiagonalOperator {
    pub fn new(shape: &[usize], weights: Vec<f64>) -> ReconResult<Self> {
        let n: usize = shape.iter().product();
        if weights.len() != n {
            return Err(ReconError::length("diagonal weights", n, weights.len()));
        }
        Ok(Self {
            shape: shape.to_vec(),
            weights,
        })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

impl LinearOperator for DiagonalOperator {
    fn in_shape(&self) -> &[usize] {
        &self.shape
    }

    fn out_shape(&self) -> &[usize] {
        &self.shape
    }

    fn apply_into(&self, x: &[f64], y: &mut [f64]) {
        for ((yi, &xi), &wi) in y.iter_mut().zip(x.iter()).zip(self.weights.iter()) {
            *yi = wi * xi;
        }
    }

    fn adjoint_into(&self, y: &[f64], x: &mut [f64]) {
        self.apply_into(y, x);
    }

    fn estimate_norm(&self, _iterations: usize) -> f64 {
        self.weights.iter().fold(0.0_f64, |m, w| m.max(w.abs()))
    }
}
