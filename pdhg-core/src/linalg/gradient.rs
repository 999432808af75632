//! Finite-difference gradient operator.
//!
//! Forward differences along every axis of a row-major N-D image, with a
//! Neumann (zero-flux) boundary: the difference at the last index of an axis
//! is zero. The output stacks one full image per direction, shape
//! `[ndim, shape...]`. The adjoint is the negative backward divergence.

use super::operator::LinearOperator;
use crate::error::{ReconError, ReconResult};

/// Forward-difference gradient ∇ with per-axis voxel spacing.
#[derive(Debug, Clone)]
pub struct FiniteDifference {
    in_shape: Vec<usize>,
    out_shape: Vec<usize>,
    strides: Vec<usize>,
    inv_spacing: Vec<f64>,
}

impl FiniteDifference {
    /// Gradient on `shape` with voxel `spacing` per axis.
    pub fn new(shape: &[usize], spacing: &[f64]) -> ReconResult<Self> {
        if shape.is_empty() || shape.iter().any(|&s| s == 0) {
            return Err(ReconError::InvalidInput(format!(
                "gradient shape {:?} must be non-empty with positive extents",
                shape
            )));
        }
        if spacing.len() != shape.len() {
            return Err(ReconError::length("gradient spacing", shape.len(), spacing.len()));
        }
        if spacing.iter().any(|&h| !(h.is_finite() && h > 0.0)) {
            return Err(ReconError::InvalidInput(format!(
                "voxel spacing {:?} must be positive",
                spacing
            )));
        }

        let ndim = shape.len();
        let mut strides = vec![1usize; ndim];
        for d in (0..ndim - 1).rev() {
            strides[d] = strides[d + 1] * shape[d + 1];
        }

        let mut out_shape = Vec::with_capacity(ndim + 1);
        out_shape.push(ndim);
        out_shape.extend_from_slice(shape);

        Ok(Self {
            in_shape: shape.to_vec(),
            out_shape,
            strides,
            inv_spacing: spacing.iter().map(|h| 1.0 / h).collect(),
        })
    }

    /// Unit voxel spacing.
    pub fn isotropic(shape: &[usize]) -> ReconResult<Self> {
        Self::new(shape, &vec![1.0; shape.len()])
    }

    /// Number of directions (= image dimensionality).
    pub fn num_directions(&self) -> usize {
        self.in_shape.len()
    }

    /// Analytic upper bound ||∇|| ≤ 2·sqrt(Σ 1/h²).
    pub fn norm_bound(&self) -> f64 {
        2.0 * self.inv_spacing.iter().map(|h| h * h).sum::<f64>().sqrt()
    }

    #[inline]
    fn has_forward_neighbour(&self, idx: usize, d: usize) -> bool {
        (idx / self.strides[d]) % self.in_shape[d] + 1 < self.in_shape[d]
    }

    #[inline]
    fn has_backward_neighbour(&self, idx: usize, d: usize) -> bool {
        (idx / self.strides[d]) % self.in_shape[d] > 0
    }
}

impl LinearOperator for FiniteDifference {
    fn in_shape(&self) -> &[usize] {
        &self.in_shape
    }

    fn out_shape(&self) -> &[usize] {
        &self.out_shape
    }

    fn apply_into(&self, x: &[f64], g: &mut [f64]) {
        let n = x.len();
        for d in 0..self.num_directions() {
            let stride = self.strides[d];
            let h = self.inv_spacing[d];
            let gd = &mut g[d * n..(d + 1) * n];
            for idx in 0..n {
                gd[idx] = if self.has_forward_neighbour(idx, d) {
                    (x[idx + stride] - x[idx]) * h
                } else {
                    0.0
                };
            }
        }
    }

    fn adjoint_into(&self, g: &[f64], x: &mut [f64]) {
        let n = x.len();
        x.fill(0.0);
        for d in 0..self.num_directions() {
            let stride = self.strides[d];
            let h = self.inv_spacing[d];
            let gd = &g[d * n..(d + 1) * n];
            for idx in 0..n {
                let mut acc = 0.0;
                if self.has_backward_neighbour(idx, d) {
                    acc += gd[idx - stride];
                }
                if self.has_forward_neighbour(idx, d) {
                    acc -= gd[idx];
                }
                x[idx] += acc * h;
            }
        }
    }
}
