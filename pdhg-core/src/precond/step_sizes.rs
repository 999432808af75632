//! Diagonal step sizes (preconditioners) for PDHG and LM-SPDHG.
//!
//! The data operators get element-wise steps derived from their row and
//! column sums:
//!
//! ```text
//! S_i = γ ρ / (A_i 1)                  dual, one entry per measurement
//! T_i = ρ p_i / (γ A_iᵀ w_i)           primal, w_i = 1/μ_i
//! ```
//!
//! The gradient operator only has a norm estimate, so its steps are scalars:
//!
//! ```text
//! S_G = γ ρ / ||∇||        T_G = ρ p_g / (γ ||∇||)
//! ```
//!
//! The primal step actually used is the pointwise minimum of every `T_i` and
//! `T_G`. Taking anything larger at any voxel voids the convergence bound.

use crate::error::{ReconError, ReconResult};
use crate::linalg::vector::{min_in_place, min_positive};
use crate::linalg::{LinearOperator, OperatorSequence};
use crate::listmode::SubsetProbabilities;

/// Replace zero, negative and non-finite sensitivities by the smallest
/// positive finite entry.
///
/// Returns the number of substituted entries. Fails with
/// [`ReconError::DegenerateSensitivity`] only if no positive entry exists.
pub fn replace_degenerate(values: &mut [f64]) -> ReconResult<usize> {
    let floor = min_positive(values).ok_or_else(|| {
        ReconError::DegenerateSensitivity(format!(
            "no positive sensitivity among {} entries",
            values.len()
        ))
    })?;

    let mut replaced = 0;
    for v in values.iter_mut() {
        if !(v.is_finite() && *v > 0.0) {
            *v = floor;
            replaced += 1;
        }
    }
    if replaced > 0 {
        log::debug!(
            "replaced {} degenerate sensitivities with {:.3e}",
            replaced,
            floor
        );
    }
    Ok(replaced)
}

/// Dual step `S = γρ / (A·1)` for one data operator.
pub fn dual_step<A: LinearOperator + ?Sized>(op: &A, gamma: f64, rho: f64) -> ReconResult<Vec<f64>> {
    let mut row_sums = op.apply(&vec![1.0; op.in_len()])?;
    replace_degenerate(&mut row_sums)?;
    Ok(row_sums.into_iter().map(|r| gamma * rho / r).collect())
}

/// Primal step `T = ρ p / (γ Aᵀw)` for one data operator.
///
/// `weights` is the per-measurement weight `1/μ`; `None` means all ones
/// (the full-batch case).
pub fn primal_step<A: LinearOperator + ?Sized>(
    op: &A,
    weights: Option<&[f64]>,
    probability: f64,
    gamma: f64,
    rho: f64,
) -> ReconResult<Vec<f64>> {
    let mut col_sums = match weights {
        Some(w) => op.adjoint(w)?,
        None => op.adjoint(&vec![1.0; op.out_len()])?,
    };
    replace_degenerate(&mut col_sums)?;
    Ok(col_sums
        .into_iter()
        .map(|c| rho * probability / (gamma * c))
        .collect())
}

/// Scalar steps `(S_G, T_G)` of the gradient operator.
///
/// A zero norm (every image axis of extent 1) means `∇x ≡ 0`: `T_G` is
/// infinite so it drops out of [`combine_primal`], and `S_G` falls back to
/// the unit-norm value.
pub fn gradient_steps(norm: f64, probability: f64, gamma: f64, rho: f64) -> ReconResult<(f64, f64)> {
    if !(norm.is_finite() && norm >= 0.0) {
        return Err(ReconError::DegenerateSensitivity(format!(
            "gradient operator norm must be finite and >= 0, got {}",
            norm
        )));
    }
    if norm == 0.0 {
        log::debug!("gradient operator norm is 0, gradient block does not bound the primal step");
        return Ok((gamma * rho, f64::INFINITY));
    }
    Ok((gamma * rho / norm, rho * probability / (gamma * norm)))
}

/// Pointwise minimum of the per-operator primal steps and the scalar
/// gradient step.
pub fn combine_primal(parts: &[Vec<f64>], t_grad: f64) -> Vec<f64> {
    let n = parts.first().map_or(0, Vec::len);
    let mut t = vec![t_grad; n];
    for part in parts {
        min_in_place(&mut t, part);
    }
    t
}

/// All step sizes of one reconstruction run.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSizes {
    /// Dual steps per data block (one block for full-batch PDHG).
    pub data: Vec<Vec<f64>>,
    /// Dual step of the gradient block.
    pub gradient_dual: f64,
    /// Combined primal step.
    pub primal: Vec<f64>,
}

impl StepSizes {
    /// Full-batch steps: `μ ≡ 1`, `p = p_g = 1`.
    pub fn for_histogram<A: LinearOperator + ?Sized>(
        operator: &A,
        gradient_norm: f64,
        gamma: f64,
        rho: f64,
    ) -> ReconResult<Self> {
        let s = dual_step(operator, gamma, rho)?;
        let t = primal_step(operator, None, 1.0, gamma, rho)?;
        let (s_grad, t_grad) = gradient_steps(gradient_norm, 1.0, gamma, rho)?;

        Ok(Self {
            data: vec![s],
            gradient_dual: s_grad,
            primal: combine_primal(&[t], t_grad),
        })
    }

    /// Subset steps; `inv_multiplicity[i]` holds `1/μ` for the events of subset `i`.
    pub fn for_listmode(
        sequence: &OperatorSequence,
        inv_multiplicity: &[Vec<f64>],
        probabilities: &SubsetProbabilities,
        gradient_norm: f64,
        gamma: f64,
        rho: f64,
    ) -> ReconResult<Self> {
        if inv_multiplicity.len() != sequence.len() {
            return Err(ReconError::InvalidPartition(format!(
                "{} multiplicity blocks for {} subset operators",
                inv_multiplicity.len(),
                sequence.len()
            )));
        }
        probabilities.validate(sequence.len())?;

        let mut data = Vec::with_capacity(sequence.len());
        let mut primal_parts = Vec::with_capacity(sequence.len());
        for (i, op) in sequence.iter().enumerate() {
            data.push(dual_step(op, gamma, rho)?);
            primal_parts.push(primal_step(
                op,
                Some(&inv_multiplicity[i]),
                probabilities.data[i],
                gamma,
                rho,
            )?);
        }
        let (s_grad, t_grad) = gradient_steps(gradient_norm, probabilities.gradient, gamma, rho)?;

        Ok(Self {
            data,
            gradient_dual: s_grad,
            primal: combine_primal(&primal_parts, t_grad),
        })
    }
}
