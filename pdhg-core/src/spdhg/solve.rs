use std::ops::ControlFlow;
use std::time::Instant;

use rand::Rng;

use super::schedule::{Block, EpochSchedule};
use super::state::{LmSpdhgState, LmSpdhgWorkspace, SubsetData};
use super::step::lm_spdhg_step_in_place;
use crate::cost::listmode_cost;
use crate::error::ReconResult;
use crate::pdhg::diagnostics::DiagnosticsConfig;
use crate::pdhg::perf::{PerfSection, PerfTimers};
use crate::precond::StepSizes;
use crate::problem::{ListModeProblem, ReconInfo, ReconSettings, ReconSolution, ReconStatus};

/// Reconstruct from list-mode events with LM-SPDHG.
///
/// Runs `settings.num_iterations` epochs; block selection draws from `rng`
/// only, so equal seeds give identical images.
pub fn run_lm_spdhg<R: Rng + ?Sized>(
    problem: &ListModeProblem<'_>,
    settings: &ReconSettings,
    warm_start: &[f64],
    rng: &mut R,
) -> ReconResult<ReconSolution> {
    run_lm_spdhg_with_callback(problem, settings, warm_start, rng, |_, _| ControlFlow::Continue(()))
}

/// [`run_lm_spdhg`] with a callback invoked after every epoch.
///
/// The callback receives the 1-based epoch index and the current image.
pub fn run_lm_spdhg_with_callback<R, F>(
    problem: &ListModeProblem<'_>,
    settings: &ReconSettings,
    warm_start: &[f64],
    rng: &mut R,
    mut callback: F,
) -> ReconResult<ReconSolution>
where
    R: Rng + ?Sized,
    F: FnMut(usize, &[f64]) -> ControlFlow<()>,
{
    settings.validate()?;
    problem.validate()?;

    let start = Instant::now();
    let diag = DiagnosticsConfig::from_env();
    let mut timers = PerfTimers::default();

    let subsets = SubsetData::gather(problem);
    let (steps, schedule, gradient_norm, mut state) = {
        let _g = timers.scoped(PerfSection::Other);
        let gradient_norm = settings.resolve_gradient_norm(problem.gradient);
        let inv_mu: Vec<Vec<f64>> = subsets.iter().map(|s| s.inv_multiplicity.clone()).collect();
        let steps = StepSizes::for_listmode(
            problem.sequence,
            &inv_mu,
            problem.probabilities,
            gradient_norm,
            settings.gamma,
            settings.rho,
        )?;
        let schedule = EpochSchedule::new(settings.schedule, problem.probabilities)?;
        let state = LmSpdhgState::initialize(problem, &subsets, warm_start)?;
        (steps, schedule, gradient_norm, state)
    };
    let mut ws = LmSpdhgWorkspace::for_problem(problem, &subsets);
    diag.log_step_summary("lm-spdhg", &steps);

    if settings.verbose {
        log::info!(
            "lm-spdhg: voxels={} events={} subsets={} schedule={} steps/epoch={} |grad|={:.4e} epochs={}",
            problem.num_voxels(),
            problem.events.len(),
            problem.num_subsets(),
            settings.schedule,
            schedule.steps_per_epoch(),
            gradient_norm,
            settings.num_iterations,
        );
    }

    let mut status = ReconStatus::Completed;
    let mut blocks = Vec::with_capacity(schedule.steps_per_epoch());
    let mut inner_steps = 0;
    let mut gradient_steps = 0;
    let mut epoch = 0;
    while epoch < settings.num_iterations {
        {
            let _g = timers.scoped(PerfSection::Schedule);
            schedule.next_epoch(rng, &mut blocks);
        }

        for &block in &blocks {
            lm_spdhg_step_in_place(
                problem,
                &subsets,
                &steps,
                settings.beta,
                block,
                &mut state,
                &mut ws,
                &mut timers,
            )?;
            inner_steps += 1;
            if block == Block::Gradient {
                gradient_steps += 1;
            }
        }
        epoch += 1;

        if diag.cost_due(epoch, settings.num_iterations) {
            // constant Σ s_bins omitted
            let cost = listmode_cost(problem, &state.x, 0.0, settings.beta)?;
            log::info!("lm-spdhg epoch {:>5}: cost={:.10e} (up to a constant)", epoch, cost);
        }

        if callback(epoch, &state.x).is_break() {
            status = ReconStatus::StoppedByCallback;
            break;
        }
    }

    let solve_time_ms = start.elapsed().as_millis() as u64;
    if settings.verbose {
        log::info!(
            "lm-spdhg: {} after {} epochs, {} inner steps ({} gradient) in {} ms",
            status,
            epoch,
            inner_steps,
            gradient_steps,
            solve_time_ms
        );
    }

    Ok(ReconSolution {
        status,
        x: state.x,
        info: ReconInfo {
            iterations: epoch,
            inner_steps,
            gradient_steps,
            gradient_norm,
            solve_time_ms,
            timers,
        },
    })
}
