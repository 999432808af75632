use super::schedule::Block;
use super::state::{LmSpdhgState, LmSpdhgWorkspace, SubsetData};
use crate::error::ReconResult;
use crate::linalg::vector::projected_step;
use crate::linalg::LinearOperator;
use crate::pdhg::perf::{PerfSection, PerfTimers};
use crate::pdhg::step::{data_dual_update, extrapolate, gradient_dual_update};
use crate::precond::StepSizes;
use crate::problem::ListModeProblem;

/// One inner LM-SPDHG step on `block`.
///
/// ```text
/// x   ← max(0, x − T ⊙ zbar)
/// data i:   y_i⁺ = prox(y_i + S_i ⊙ (A_i x + s_i); μ_i),  Δz = A_iᵀ((y_i⁺ − y_i)/μ_i)
/// gradient: w⁺ = β prox_TV((w + S_G ∇x)/β),           Δz = ∇ᵀ(w⁺ − w)
/// z   ← z + Δz,   zbar ← z + Δz / p_block
/// ```
pub fn lm_spdhg_step_in_place(
    problem: &ListModeProblem<'_>,
    subsets: &[SubsetData],
    steps: &StepSizes,
    beta: f64,
    block: Block,
    state: &mut LmSpdhgState,
    ws: &mut LmSpdhgWorkspace,
    timers: &mut PerfTimers,
) -> ReconResult<()> {
    {
        let _g = timers.scoped(PerfSection::Primal);
        projected_step(&mut state.x, &steps.primal, &state.zbar);
    }

    let probability = match block {
        Block::Data(i) => {
            let op = &problem.sequence[i];
            let data = &subsets[i];
            let len = data.len();
            let y_next = &mut ws.y_next[..len];
            let dy = &mut ws.dy[..len];

            data_dual_update(
                op,
                &state.x,
                &state.y[i],
                &data.contamination,
                &steps.data[i],
                &data.multiplicity,
                y_next,
                dy,
                timers,
            )?;

            let _g = timers.scoped(PerfSection::Adjoint);
            for (d, inv_mu) in dy.iter_mut().zip(&data.inv_multiplicity) {
                *d *= inv_mu;
            }
            op.adjoint_into(dy, &mut ws.dz);
            state.y[i].copy_from_slice(y_next);
            problem.probabilities.data[i]
        }
        Block::Gradient => {
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

            let _g = timers.scoped(PerfSection::Adjoint);
            problem.gradient.adjoint_into(&ws.dw, &mut ws.dz);
            std::mem::swap(&mut state.w, &mut ws.w_next);
            problem.probabilities.gradient
        }
    };

    let _g = timers.scoped(PerfSection::Other);
    extrapolate(&mut state.z, &mut state.zbar, &ws.dz, probability);
    Ok(())
}
