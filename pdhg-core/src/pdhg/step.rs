//! One PDHG iteration, plus the dual block updates shared with LM-SPDHG.

use super::perf::{PerfSection, PerfTimers};
use super::state::{PdhgState, PdhgWorkspace};
use crate::error::ReconResult;
use crate::linalg::vector::{axpy, projected_step, sub_into};
use crate::linalg::LinearOperator;
use crate::precond::StepSizes;
use crate::problem::HistogramProblem;
use crate::prox::{poisson_conjugate_prox_in_place, tv_conjugate_prox_in_place};

/// Advance `state` by one PDHG iteration.
///
/// ```text
/// x  ← max(0, x − T ⊙ zbar)
/// y⁺ = prox_S(y + S ⊙ (A x + s))
/// w⁺ = β prox_TV((w + S_G ∇x) / β)
/// Δz = Aᵀ(y⁺ − y) + ∇ᵀ(w⁺ − w)
/// z  ← z + Δz,   zbar ← z + Δz
/// ```
pub fn pdhg_step_in_place(
    problem: &HistogramProblem<'_>,
    steps: &StepSizes,
    beta: f64,
    state: &mut PdhgState,
    ws: &mut PdhgWorkspace,
    timers: &mut PerfTimers,
) -> ReconResult<()> {
    {
        let _g = timers.scoped(PerfSection::Primal);
        projected_step(&mut state.x, &steps.primal, &state.zbar);
    }

    data_dual_update(
        problem.operator,
        &state.x,
        &state.y,
        problem.contamination,
        &steps.data[0],
        problem.counts,
        &mut ws.y_next,
        &mut ws.dy,
        timers,
    )?;
    gradient_dual_update(
        problem.gradient,
        &state.x,
        &state.w,
        steps.gradient_dual,
        beta,
        &mut ws.w_next,
        &mut ws.dw,
        timers,
    );

    {
        let _g = timers.scoped(PerfSection::Adjoint);
        problem.operator.adjoint_into(&ws.dy, &mut ws.dz);
        problem.gradient.adjoint_into(&ws.dw, &mut ws.img_tmp);
        axpy(1.0, &ws.img_tmp, &mut ws.dz);
    }

    let _g = timers.scoped(PerfSection::Other);
    std::mem::swap(&mut state.y, &mut ws.y_next);
    std::mem::swap(&mut state.w, &mut ws.w_next);
    extrapolate(&mut state.z, &mut state.zbar, &ws.dz, 1.0);
    Ok(())
}

/// `y_next ← prox(y + S ⊙ (A x + s); counts)`, `dy ← y_next − y`.
///
/// `counts` is `d` for binned data and `μ` for list-mode data.
pub(crate) fn data_dual_update<A: LinearOperator + ?Sized>(
    op: &A,
    x: &[f64],
    y: &[f64],
    contamination: &[f64],
    step: &[f64],
    counts: &[f64],
    y_next: &mut [f64],
    dy: &mut [f64],
    timers: &mut PerfTimers,
) -> ReconResult<()> {
    {
        let _g = timers.scoped(PerfSection::Forward);
        op.apply_into(x, y_next);
    }

    let _g = timers.scoped(PerfSection::Prox);
    for (((v, &yj), &sj), &cj) in y_next.iter_mut().zip(y).zip(step).zip(contamination) {
        *v = yj + sj * (*v + cj);
    }
    poisson_conjugate_prox_in_place(y_next, step, counts)?;
    sub_into(y_next, y, dy);
    Ok(())
}

/// `w_next ← β prox_TV((w + S_G ∇x)/β)`, `dw ← w_next − w`.
pub(crate) fn gradient_dual_update<G: LinearOperator + ?Sized>(
    gradient: &G,
    x: &[f64],
    w: &[f64],
    s_grad: f64,
    beta: f64,
    w_next: &mut [f64],
    dw: &mut [f64],
    timers: &mut PerfTimers,
) {
    {
        let _g = timers.scoped(PerfSection::Forward);
        gradient.apply_into(x, w_next);
    }

    let _g = timers.scoped(PerfSection::Prox);
    for (v, &wj) in w_next.iter_mut().zip(w) {
        *v = wj + s_grad * *v;
    }
    let num_directions = gradient.out_len() / gradient.in_len();
    tv_conjugate_prox_in_place(w_next, num_directions, beta);
    sub_into(w_next, w, dw);
}

/// `z ← z + Δz`, `zbar ← z + Δz / p`.
pub(crate) fn extrapolate(z: &mut [f64], zbar: &mut [f64], dz: &[f64], probability: f64) {
    let inv_p = 1.0 / probability;
    for ((zi, zb), &d) in z.iter_mut().zip(zbar.iter_mut()).zip(dz) {
        *zi += d;
        *zb = *zi + inv_p * d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{FiniteDifference, SparseOperator};

    #[test]
    fn test_extrapolation_weights_by_probability() {
        let mut z = vec![1.0, 2.0];
        let mut zbar = vec![0.0, 0.0];
        extrapolate(&mut z, &mut zbar, &[0.5, -1.0], 0.25);
        assert_eq!(z, vec![1.5, 1.0]);
        assert_eq!(zbar, vec![3.5, -3.0]);
    }

    #[test]
    fn test_gradient_update_with_zero_beta_is_inert() {
        let grad = FiniteDifference::isotropic(&[4]).unwrap();
        let x = [0.0, 1.0, 4.0, 9.0];
        let w = [0.0; 4];
        let mut w_next = [0.0; 4];
        let mut dw = [1.0; 4];
        let mut timers = PerfTimers::default();
        gradient_dual_update(&grad, &x, &w, 0.5, 0.0, &mut w_next, &mut dw, &mut timers);
        assert!(w_next.iter().all(|v| *v == 0.0));
        assert!(dw.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_data_update_on_identity() {
        let a = SparseOperator::identity(2);
        let x = [1.0, 2.0];
        let y = [0.0, 0.0];
        let s = [0.0, 0.0];
        let step = [0.5, 0.5];
        let d = [1.0, 2.0];
        let mut y_next = [0.0; 2];
        let mut dy = [0.0; 2];
        let mut timers = PerfTimers::default();
        data_dual_update(&a, &x, &y, &s, &step, &d, &mut y_next, &mut dy, &mut timers).unwrap();
        // y = 0 is already optimal for d = A x
        assert!(y_next.iter().all(|v| v.abs() < 1e-14));
        assert!(dy.iter().all(|v| v.abs() < 1e-14));
    }
}
