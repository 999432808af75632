use std::ops::ControlFlow;
use std::time::Instant;

use super::diagnostics::DiagnosticsConfig;
use super::perf::{PerfSection, PerfTimers};
use super::state::{PdhgState, PdhgWorkspace};
use super::step::pdhg_step_in_place;
use crate::cost::poisson_tv_cost;
use crate::error::ReconResult;
use crate::precond::StepSizes;
use crate::problem::{HistogramProblem, ReconInfo, ReconSettings, ReconSolution, ReconStatus};

/// Reconstruct from binned counts with full-batch PDHG.
///
/// Runs exactly `settings.num_iterations` iterations from `warm_start`.
pub fn run_pdhg(
    problem: &HistogramProblem<'_>,
    settings: &ReconSettings,
    warm_start: &[f64],
) -> ReconResult<ReconSolution> {
    run_pdhg_with_callback(problem, settings, warm_start, |_, _| ControlFlow::Continue(()))
}

/// [`run_pdhg`] with a callback invoked after every iteration.
///
/// The callback receives the 1-based iteration index and the current image.
/// Returning `ControlFlow::Break(())` ends the run after that iteration.
pub fn run_pdhg_with_callback<F>(
    problem: &HistogramProblem<'_>,
    settings: &ReconSettings,
    warm_start: &[f64],
    mut callback: F,
) -> ReconResult<ReconSolution>
where
    F: FnMut(usize, &[f64]) -> ControlFlow<()>,
{
    settings.validate()?;
    problem.validate()?;

    let start = Instant::now();
    let diag = DiagnosticsConfig::from_env();
    let mut timers = PerfTimers::default();

    let (steps, gradient_norm, mut state) = {
        let _g = timers.scoped(PerfSection::Other);
        let gradient_norm = settings.resolve_gradient_norm(problem.gradient);
        let steps = StepSizes::for_histogram(problem.operator, gradient_norm, settings.gamma, settings.rho)?;
        let state = PdhgState::initialize(problem, warm_start)?;
        (steps, gradient_norm, state)
    };
    let mut ws = PdhgWorkspace::for_problem(problem);
    diag.log_step_summary("pdhg", &steps);

    if settings.verbose {
        log::info!(
            "pdhg: voxels={} bins={} beta={:.3e} gamma={:.3e} rho={:.3} |grad|={:.4e} iters={}",
            problem.num_voxels(),
            problem.num_bins(),
            settings.beta,
            settings.gamma,
            settings.rho,
            gradient_norm,
            settings.num_iterations,
        );
    }

    let mut status = ReconStatus::Completed;
    let mut iter = 0;
    while iter < settings.num_iterations {
        pdhg_step_in_place(problem, &steps, settings.beta, &mut state, &mut ws, &mut timers)?;
        iter += 1;

        if diag.cost_due(iter, settings.num_iterations) {
            let cost = poisson_tv_cost(
                problem.operator,
                problem.gradient,
                &state.x,
                problem.counts,
                problem.contamination,
                settings.beta,
            )?;
            log::info!("pdhg iter {:>5}: cost={:.10e}", iter, cost);
        }

        if callback(iter, &state.x).is_break() {
            status = ReconStatus::StoppedByCallback;
            break;
        }
    }

    let solve_time_ms = start.elapsed().as_millis() as u64;
    if settings.verbose {
        log::info!("pdhg: {} after {} iterations ({} ms)", status, iter, solve_time_ms);
    }

    Ok(ReconSolution {
        status,
        x: state.x,
        info: ReconInfo {
            iterations: iter,
            inner_steps: iter,
            gradient_steps: iter,
            gradient_norm,
            solve_time_ms,
            timers,
        },
    })
}
