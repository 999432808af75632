//! Objective evaluation for monitoring and tests.
//!
//! These functions never drive the iteration; the engines run a fixed
//! number of steps. A bin with positive count and non-positive expectation
//! makes the objective `+∞`.

use crate::error::{ReconError, ReconResult};
use crate::linalg::vector::dot;
use crate::linalg::LinearOperator;
use crate::problem::ListModeProblem;
use crate::prox::group_norms;

/// Isotropic total variation `Σ_v ||(∇x)_v||₂`.
pub fn tv_seminorm<G: LinearOperator + ?Sized>(gradient: &G, x: &[f64]) -> ReconResult<f64> {
    let g = gradient.apply(x)?;
    let num_directions = gradient.out_len() / gradient.in_len().max(1);
    Ok(group_norms(&g, num_directions).iter().sum())
}

/// Histogram objective `Σ_j (Ā_j − d_j log Ā_j) + β TV(x)`, `Ā = A x + s`.
pub fn poisson_tv_cost<A, G>(
    operator: &A,
    gradient: &G,
    x: &[f64],
    counts: &[f64],
    contamination: &[f64],
    beta: f64,
) -> ReconResult<f64>
where
    A: LinearOperator + ?Sized,
    G: LinearOperator + ?Sized,
{
    let ybar = operator.apply(x)?;
    if counts.len() != ybar.len() {
        return Err(ReconError::length("counts", ybar.len(), counts.len()));
    }
    if contamination.len() != ybar.len() {
        return Err(ReconError::length("contamination", ybar.len(), contamination.len()));
    }

    let mut data = 0.0;
    for ((&ax, &s), &d) in ybar.iter().zip(contamination).zip(counts) {
        let e = ax + s;
        if d == 0.0 {
            data += e;
        } else if e > 0.0 {
            data += e - d * e.ln();
        } else {
            return Ok(f64::INFINITY);
        }
    }

    let reg = if beta > 0.0 { beta * tv_seminorm(gradient, x)? } else { 0.0 };
    Ok(data + reg)
}

/// List-mode objective
/// `⟨Aᵀ1, x⟩ + Σ s_bins − Σ_e log(A_e x + s_e) + β TV(x)`.
///
/// `total_contamination` is the contamination summed over all histogram bins.
/// When the events are an expansion of binned counts this equals
/// [`poisson_tv_cost`] on those counts.
pub fn listmode_cost(
    problem: &ListModeProblem<'_>,
    x: &[f64],
    total_contamination: f64,
    beta: f64,
) -> ReconResult<f64> {
    if x.len() != problem.adjoint_ones.len() {
        return Err(ReconError::length("image", problem.adjoint_ones.len(), x.len()));
    }

    let mut log_sum = 0.0;
    for (i, op) in problem.sequence.iter().enumerate() {
        let ax = op.apply(x)?;
        let subset = problem.partition.subset(i);
        for (&a, &e) in ax.iter().zip(subset) {
            let expectation = a + problem.contamination[e];
            if expectation <= 0.0 {
                return Ok(f64::INFINITY);
            }
            log_sum += expectation.ln();
        }
    }

    let reg = if beta > 0.0 { beta * tv_seminorm(problem.gradient, x)? } else { 0.0 };
    Ok(dot(problem.adjoint_ones, x) + total_contamination - log_sum + reg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{FiniteDifference, SparseOperator};

    #[test]
    fn test_tv_of_constant_and_ramp() {
        let grad = FiniteDifference::isotropic(&[2, 2]).unwrap();
        assert_eq!(tv_seminorm(&grad, &[3.0; 4]).unwrap(), 0.0);

        // x = [[0, 1], [0, 1]]: each left voxel has a unit horizontal step
        let tv = tv_seminorm(&grad, &[0.0, 1.0, 0.0, 1.0]).unwrap();
        assert!((tv - 2.0).abs() < 1e-14);
    }

    #[test]
    fn test_poisson_cost_terms() {
        let a = SparseOperator::identity(3);
        let grad = FiniteDifference::isotropic(&[3]).unwrap();
        let x = [1.0, 2.0, 0.5];
        let d = [1.0, 0.0, 2.0];
        let s = [0.0, 0.5, 0.5];
        let cost = poisson_tv_cost(&a, &grad, &x, &d, &s, 0.0).unwrap();
        let expected = 1.0 + 2.5 + (1.0 - 2.0 * 1.0f64.ln());
        assert!((cost - expected).abs() < 1e-14);

        let with_tv = poisson_tv_cost(&a, &grad, &x, &d, &s, 0.5).unwrap();
        assert!((with_tv - expected - 0.5 * (1.0 + 1.5)).abs() < 1e-14);
    }

    #[test]
    fn test_cost_is_infinite_off_domain() {
        let a = SparseOperator::identity(2);
        let grad = FiniteDifference::isotropic(&[2]).unwrap();
        let cost = poisson_tv_cost(&a, &grad, &[0.0, 1.0], &[1.0, 1.0], &[0.0, 0.0], 0.0).unwrap();
        assert!(cost.is_infinite());
    }
}
