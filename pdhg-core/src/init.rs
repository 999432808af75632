//! MLEM warm starts.
//!
//! A few multiplicative EM updates
//!
//! ```text
//! x ← x / (Aᵀ1) ⊙ Aᵀ(d / (A x + s))
//! ```
//!
//! give the primal-dual engines a non-negative image with roughly the right
//! activity scale. Voxels without sensitivity are set to zero. Bins whose
//! expectation is not positive do not contribute to the back projection.

use crate::error::{ReconError, ReconResult};
use crate::linalg::LinearOperator;
use crate::pdhg::state::check_warm_start;
use crate::problem::ListModeProblem;

/// MLEM on binned counts.
pub fn mlem<A: LinearOperator + ?Sized>(
    operator: &A,
    counts: &[f64],
    contamination: &[f64],
    x0: &[f64],
    iterations: usize,
) -> ReconResult<Vec<f64>> {
    check_warm_start(x0, operator.in_len())?;
    let m = operator.out_len();
    if counts.len() != m {
        return Err(ReconError::length("counts", m, counts.len()));
    }
    if contamination.len() != m {
        return Err(ReconError::length("contamination", m, contamination.len()));
    }

    let sensitivity = operator.adjoint(&vec![1.0; m])?;
    let mut x = x0.to_vec();
    let mut ratio = vec![0.0; m];
    let mut back = vec![0.0; x.len()];

    for _ in 0..iterations {
        operator.apply_into(&x, &mut ratio);
        for ((r, &s), &d) in ratio.iter_mut().zip(contamination).zip(counts) {
            let e = *r + s;
            *r = if e > 0.0 { d / e } else { 0.0 };
        }
        operator.adjoint_into(&ratio, &mut back);
        apply_sensitivity(&mut x, &back, &sensitivity);
    }
    Ok(x)
}

/// MLEM on list-mode events; every event is one count of its own bin.
pub fn listmode_mlem(problem: &ListModeProblem<'_>, x0: &[f64], iterations: usize) -> ReconResult<Vec<f64>> {
    problem.validate()?;
    check_warm_start(x0, problem.num_voxels())?;

    let mut x = x0.to_vec();
    let mut back = vec![0.0; x.len()];
    let mut part = vec![0.0; x.len()];

    for _ in 0..iterations {
        back.fill(0.0);
        for (i, op) in problem.sequence.iter().enumerate() {
            let mut ratio = op.apply(&x)?;
            for (r, &e) in ratio.iter_mut().zip(problem.partition.subset(i)) {
                let expectation = *r + problem.contamination[e];
                *r = if expectation > 0.0 { 1.0 / expectation } else { 0.0 };
            }
            op.adjoint_into(&ratio, &mut part);
            for (b, p) in back.iter_mut().zip(&part) {
                *b += p;
            }
        }
        apply_sensitivity(&mut x, &back, problem.adjoint_ones);
    }
    Ok(x)
}

fn apply_sensitivity(x: &mut [f64], back: &[f64], sensitivity: &[f64]) {
    for ((v, &b), &s) in x.iter_mut().zip(back).zip(sensitivity) {
        if s > 0.0 {
            *v *= b / s
        } else {
            *v = 0.0
        }
    }
}
