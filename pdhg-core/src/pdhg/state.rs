//! Iterate and scratch buffers of the PDHG engine.

use crate::error::{ReconError, ReconResult};
use crate::linalg::vector::is_nonneg_finite;
use crate::linalg::LinearOperator;
use crate::problem::HistogramProblem;

/// PDHG iterate.
///
/// `z` accumulates `Aᵀy + ∇ᵀw`; `zbar` is its extrapolation and is what the
/// primal update reads.
#[derive(Debug, Clone)]
pub struct PdhgState {
    /// Image (n)
    pub x: Vec<f64>,
    /// Data dual (m)
    pub y: Vec<f64>,
    /// Gradient dual (`dirs × n`)
    pub w: Vec<f64>,
    pub z: Vec<f64>,
    pub zbar: Vec<f64>,
}

impl PdhgState {
    /// State for `warm_start`.
    ///
    /// The data dual starts at `y = 1 − d/(A x + s)` (1 where `d = 0`), the
    /// gradient dual at zero, and `z = zbar = Aᵀy`.
    pub fn initialize(problem: &HistogramProblem<'_>, warm_start: &[f64]) -> ReconResult<Self> {
        check_warm_start(warm_start, problem.num_voxels())?;

        let mut ybar = problem.operator.apply(warm_start)?;
        for (v, &s) in ybar.iter_mut().zip(problem.contamination) {
            *v += s;
        }
        let y = initial_data_dual(&ybar, problem.counts)?;

        let w = vec![0.0; problem.gradient.out_len()];
        let z = problem.operator.adjoint(&y)?;
        let zbar = z.clone();

        Ok(Self { x: warm_start.to_vec(), y, w, z, zbar })
    }
}

/// Warm starts must match the image size and be finite and non-negative.
pub(crate) fn check_warm_start(x: &[f64], n: usize) -> ReconResult<()> {
    if x.len() != n {
        return Err(ReconError::length("warm start", n, x.len()));
    }
    if !is_nonneg_finite(x) {
        return Err(ReconError::InvalidInput("warm start must be finite and >= 0".into()));
    }
    Ok(())
}

/// `y = 1 − d / ybar`, with `y = 1` wherever `d = 0`.
///
/// A positive count on a bin with non-positive expectation has no feasible
/// dual and is reported as [`ReconError::NumericalInstability`].
pub(crate) fn initial_data_dual(ybar: &[f64], counts: &[f64]) -> ReconResult<Vec<f64>> {
    ybar.iter()
        .zip(counts)
        .enumerate()
        .map(|(j, (&e, &d))| {
            if d == 0.0 {
                Ok(1.0)
            } else if e > 0.0 {
                Ok(1.0 - d / e)
            } else {
                Err(ReconError::NumericalInstability(format!(
                    "bin {} has count {} but expectation {}",
                    j, d, e
                )))
            }
        })
        .collect()
}

/// Scratch buffers reused by every iteration.
#[derive(Debug, Clone)]
pub struct PdhgWorkspace {
    /// A x + s, then y + S (A x + s), then y⁺ (m)
    pub y_next: Vec<f64>,
    /// ∇x, then w + S_G ∇x, then w⁺ (`dirs × n`)
    pub w_next: Vec<f64>,
    /// y⁺ − y (m)
    pub dy: Vec<f64>,
    /// w⁺ − w (`dirs × n`)
    pub dw: Vec<f64>,
    /// Δz (n)
    pub dz: Vec<f64>,
    /// Second back projection (n)
    pub img_tmp: Vec<f64>,
}

impl PdhgWorkspace {
    pub fn new(n: usize, m: usize, grad_len: usize) -> Self {
        Self {
            y_next: vec![0.0; m],
            w_next: vec![0.0; grad_len],
            dy: vec![0.0; m],
            dw: vec![0.0; grad_len],
            dz: vec![0.0; n],
            img_tmp: vec![0.0; n],
        }
    }

    pub fn for_problem(problem: &HistogramProblem<'_>) -> Self {
        Self::new(
            problem.num_voxels(),
            problem.num_bins(),
            problem.gradient.out_len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{FiniteDifference, SparseOperator};

    #[test]
    fn test_initial_dual() {
        let y = initial_data_dual(&[2.0, 4.0, 0.0], &[1.0, 0.0, 0.0]).unwrap();
        assert_eq!(y, vec![0.5, 1.0, 1.0]);

        let err = initial_data_dual(&[0.0], &[1.0]);
        assert!(matches!(err, Err(ReconError::NumericalInstability(_))));
    }

    #[test]
    fn test_initialize_identity_problem() {
        let a = SparseOperator::identity(3);
        let grad = FiniteDifference::isotropic(&[3]).unwrap();
        let d = [2.0, 2.0, 2.0];
        let s = [0.0; 3];
        let problem = HistogramProblem::new(&a, &grad, &d, &s);

        let state = PdhgState::initialize(&problem, &[1.0, 2.0, 3.0]).unwrap();
        let expected = [-1.0, 0.0, 1.0 / 3.0];
        for (y, e) in state.y.iter().zip(expected.iter()) {
            assert!((y - e).abs() < 1e-15);
        }
        assert_eq!(state.z, state.y);
        assert_eq!(state.zbar, state.z);
        assert_eq!(state.w, vec![0.0; 3]);
    }

    #[test]
    fn test_warm_start_checks() {
        assert!(check_warm_start(&[1.0, 2.0], 3).is_err());
        assert!(matches!(
            check_warm_start(&[1.0, -0.5], 2),
            Err(ReconError::InvalidInput(_))
        ));
        assert!(check_warm_start(&[0.0, f64::NAN], 2).is_err());
        check_warm_start(&[0.0, 1.0], 2).unwrap();
    }
}
