//! End-to-end tests for the PDHG and LM-SPDHG engines.
//!
//! The list-mode problems are built by expanding binned counts into one
//! event per count, so both engines minimize the same objective and must
//! agree at convergence.

use std::ops::ControlFlow;

use pdhg_core::linalg::vector::norm2;
use pdhg_core::pdhg::{pdhg_step_in_place, PdhgState, PdhgWorkspace, PerfTimers};
use pdhg_core::precond::StepSizes;
use pdhg_core::prox::poisson_conjugate_prox;
use pdhg_core::{
    listmode_cost, mlem, multiplicities, poisson_tv_cost, run_lm_spdhg, run_lm_spdhg_with_callback, run_pdhg,
    run_pdhg_with_callback, BlockSchedule, Event, EventList, FiniteDifference, HistogramProblem, LinearOperator,
    ListModeProblem, OperatorSequence, Partition, ReconError, ReconSettings, ReconStatus, SparseOperator,
    SubsetProbabilities,
};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Binned toy problem on a 4×4×1 image.
struct ToyProblem {
    a: SparseOperator,
    grad: FiniteDifference,
    counts: Vec<f64>,
    contamination: Vec<f64>,
}

fn toy_problem(seed: u64) -> ToyProblem {
    let shape = [4, 4, 1];
    let n = 16;
    let m = 24;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut triplets = Vec::new();
    for row in 0..m {
        // every voxel is seen by at least one bin
        triplets.push((row, row % n, rng.gen_range(0.5..1.0)));
        for _ in 0..3 {
            triplets.push((row, rng.gen_range(0..n), rng.gen_range(0.1..1.0)));
        }
    }
    let a = SparseOperator::from_triplets(m, n, triplets)
        .with_image_shape(&shape)
        .unwrap();
    let grad = FiniteDifference::isotropic(&shape).unwrap();

    let x_true: Vec<f64> = (0..n).map(|_| rng.gen_range(0.5..3.0)).collect();
    let contamination = vec![0.5; m];
    let counts = a
        .apply(&x_true)
        .unwrap()
        .iter()
        .zip(&contamination)
        .map(|(ax, s)| (ax + s).round())
        .collect();

    ToyProblem { a, grad, counts, contamination }
}

/// One event per count, shuffled, with its bin's contamination.
struct ToyEvents {
    events: EventList,
    multiplicity: Vec<u32>,
    contamination: Vec<f64>,
    partition: Partition,
    probabilities: SubsetProbabilities,
    sequence: OperatorSequence,
    adjoint_ones: Vec<f64>,
}

fn expand_events(toy: &ToyProblem, num_subsets: usize, seed: u64) -> ToyEvents {
    let mut bins: Vec<usize> = toy
        .counts
        .iter()
        .enumerate()
        .flat_map(|(j, &d)| std::iter::repeat(j).take(d as usize))
        .collect();
    bins.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));

    let events: EventList = bins
        .iter()
        .map(|&j| Event::new([j as f64, 0.0, 0.0], [j as f64, 1.0, 0.0], 0))
        .collect();
    let multiplicity = multiplicities(&events);
    let contamination: Vec<f64> = bins.iter().map(|&j| toy.contamination[j]).collect();

    let partition = Partition::stride(events.len(), num_subsets).unwrap();
    let ops: Vec<Box<dyn LinearOperator>> = (0..num_subsets)
        .map(|i| {
            let rows = partition.gather(i, &bins);
            Box::new(toy.a.select_rows(&rows).unwrap()) as Box<dyn LinearOperator>
        })
        .collect();
    let sequence = OperatorSequence::new(ops).unwrap();
    let adjoint_ones = toy.a.adjoint(&vec![1.0; toy.a.out_len()]).unwrap();

    ToyEvents {
        events,
        multiplicity,
        contamination,
        probabilities: SubsetProbabilities::reference(num_subsets),
        partition,
        sequence,
        adjoint_ones,
    }
}

fn listmode_view<'a>(toy: &'a ToyProblem, ev: &'a ToyEvents) -> ListModeProblem<'a> {
    ListModeProblem {
        sequence: &ev.sequence,
        gradient: &toy.grad,
        events: &ev.events,
        multiplicity: &ev.multiplicity,
        contamination: &ev.contamination,
        partition: &ev.partition,
        probabilities: &ev.probabilities,
        adjoint_ones: &ev.adjoint_ones,
    }
}

fn identity_problem_settings() -> ReconSettings {
    ReconSettings::default()
        .with_beta(0.0)
        .with_gamma(1.0)
        .with_rho(0.5)
        .with_gradient_norm(2.0)
}

#[test]
fn test_golden_fixed_point_identity() {
    // d = A x with s = 0 and β = 0: y = 0 is optimal and x never moves.
    let a = SparseOperator::identity(3);
    let grad = FiniteDifference::isotropic(&[3]).unwrap();
    let d = [1.0, 2.0, 3.0];
    let s = [0.0; 3];
    let problem = HistogramProblem::new(&a, &grad, &d, &s);

    let settings = identity_problem_settings().with_iterations(10);
    let solution = run_pdhg(&problem, &settings, &[1.0, 2.0, 3.0]).unwrap();

    assert_eq!(solution.status, ReconStatus::Completed);
    assert_eq!(solution.info.iterations, 10);
    for (x, e) in solution.x.iter().zip(d.iter()) {
        assert!((x - e).abs() < 1e-12, "x = {:?}", solution.x);
    }
}

#[test]
fn test_golden_fixed_point_single_iteration() {
    let a = SparseOperator::identity(3);
    let grad = FiniteDifference::isotropic(&[3]).unwrap();
    let d = [1.0, 2.0, 3.0];
    let s = [0.0; 3];
    let problem = HistogramProblem::new(&a, &grad, &d, &s);

    let settings = identity_problem_settings().with_iterations(1);
    let solution = run_pdhg(&problem, &settings, &[1.0, 2.0, 3.0]).unwrap();

    assert_eq!(solution.info.iterations, 1);
    for (x, e) in solution.x.iter().zip(d.iter()) {
        assert!((x - e).abs() < 1e-12, "x = {:?}", solution.x);
    }
}

#[test]
fn test_single_voxel_image_without_gradient() {
    // every axis has extent 1, so the estimated gradient norm is 0
    let shape = [1, 1, 1];
    let a = SparseOperator::identity(1).with_image_shape(&shape).unwrap();
    let grad = FiniteDifference::isotropic(&shape).unwrap();
    let d = [2.0];
    let s = [0.0];
    let problem = HistogramProblem::new(&a, &grad, &d, &s);

    let settings = ReconSettings::default()
        .with_beta(0.0)
        .with_gamma(1.0)
        .with_rho(0.5)
        .with_iterations(100);
    let solution = run_pdhg(&problem, &settings, &[1.0]).unwrap();

    assert_eq!(solution.status, ReconStatus::Completed);
    assert_eq!(solution.info.gradient_norm, 0.0);
    assert!((solution.x[0] - 2.0).abs() < 1e-9, "x = {:?}", solution.x);

    // the TV weight has nothing to act on
    let settings = settings.with_beta(0.7);
    let solution = run_pdhg(&problem, &settings, &[1.0]).unwrap();
    assert!((solution.x[0] - 2.0).abs() < 1e-9, "x = {:?}", solution.x);
}

#[test]
fn test_golden_single_step_identity() {
    // T = min(ρ/γ, ρ/(γ·2)) = 0.25, S = γρ = 0.5, y0 = 1 − d/x = [-1, 0, 1/3]
    let a = SparseOperator::identity(3);
    let grad = FiniteDifference::isotropic(&[3]).unwrap();
    let d = [2.0, 2.0, 2.0];
    let s = [0.0; 3];
    let x0 = [1.0, 2.0, 3.0];
    let problem = HistogramProblem::new(&a, &grad, &d, &s);
    let settings = identity_problem_settings().with_iterations(1);

    let solution = run_pdhg(&problem, &settings, &x0).unwrap();
    let expected_x = [1.25, 2.0, 3.0 - 0.25 / 3.0];
    for (x, e) in solution.x.iter().zip(expected_x.iter()) {
        assert!((x - e).abs() < 1e-14, "x = {:?}", solution.x);
    }

    // Same step through the explicit state API, checking the duals.
    let steps = StepSizes::for_histogram(&a, 2.0, 1.0, 0.5).unwrap();
    let mut state = PdhgState::initialize(&problem, &x0).unwrap();
    let y0 = state.y.clone();
    let mut ws = PdhgWorkspace::for_problem(&problem);
    let mut timers = PerfTimers::default();
    pdhg_step_in_place(&problem, &steps, 0.0, &mut state, &mut ws, &mut timers).unwrap();

    for j in 0..3 {
        let y_plus = poisson_conjugate_prox(y0[j] + 0.5 * expected_x[j], 0.5, d[j]).unwrap();
        assert!((state.y[j] - y_plus).abs() < 1e-14);
        assert!((state.z[j] - y_plus).abs() < 1e-14);
        assert!((state.zbar[j] - (2.0 * y_plus - y0[j])).abs() < 1e-14);
    }
    assert!(state.w.iter().all(|v| *v == 0.0));
}

#[test]
fn test_pdhg_keeps_image_nonnegative() {
    let toy = toy_problem(11);
    let problem = HistogramProblem::new(&toy.a, &toy.grad, &toy.counts, &toy.contamination);
    let settings = ReconSettings::default().with_beta(0.05).with_iterations(200);

    let mut checked = 0;
    run_pdhg_with_callback(&problem, &settings, &vec![1.0; 16], |_, x| {
        assert!(x.iter().all(|v| *v >= 0.0 && v.is_finite()));
        checked += 1;
        ControlFlow::Continue(())
    })
    .unwrap();
    assert_eq!(checked, 200);
}

#[test]
fn test_pdhg_decreases_cost() {
    let toy = toy_problem(5);
    let problem = HistogramProblem::new(&toy.a, &toy.grad, &toy.counts, &toy.contamination);
    let beta = 0.05;
    let x0 = vec![1.0; 16];
    let settings = ReconSettings::default().with_beta(beta).with_iterations(500);

    let solution = run_pdhg(&problem, &settings, &x0).unwrap();
    let c0 = poisson_tv_cost(&toy.a, &toy.grad, &x0, &toy.counts, &toy.contamination, beta).unwrap();
    let c1 = poisson_tv_cost(&toy.a, &toy.grad, &solution.x, &toy.counts, &toy.contamination, beta).unwrap();
    assert!(c1 < c0, "cost went from {} to {}", c0, c1);
    assert!(solution.info.gradient_norm > 0.0);
    assert!(solution.info.gradient_norm <= toy.grad.norm_bound() + 1e-8);
}

#[test]
fn test_callback_break_stops_run() {
    let toy = toy_problem(3);
    let problem = HistogramProblem::new(&toy.a, &toy.grad, &toy.counts, &toy.contamination);
    let settings = ReconSettings::default().with_iterations(50);

    let solution = run_pdhg_with_callback(&problem, &settings, &vec![1.0; 16], |iter, _| {
        if iter == 3 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .unwrap();
    assert_eq!(solution.status, ReconStatus::StoppedByCallback);
    assert_eq!(solution.info.iterations, 3);

    let ev = expand_events(&toy, 3, 1);
    let lm = listmode_view(&toy, &ev);
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let solution = run_lm_spdhg_with_callback(&lm, &settings, &vec![1.0; 16], &mut rng, |epoch, _| {
        if epoch == 2 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .unwrap();
    assert_eq!(solution.info.iterations, 2);
    assert_eq!(solution.info.inner_steps, 2 * 6);
}

#[test]
fn test_listmode_cost_matches_histogram_cost() {
    let toy = toy_problem(21);
    let ev = expand_events(&toy, 4, 2);
    let lm = listmode_view(&toy, &ev);

    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let x: Vec<f64> = (0..16).map(|_| rng.gen_range(0.2..2.0)).collect();
    let beta = 0.3;
    let hist = poisson_tv_cost(&toy.a, &toy.grad, &x, &toy.counts, &toy.contamination, beta).unwrap();
    let total_s: f64 = toy.contamination.iter().sum();
    let list = listmode_cost(&lm, &x, total_s, beta).unwrap();
    assert!((hist - list).abs() < 1e-9 * hist.abs().max(1.0), "{} vs {}", hist, list);
}

#[test]
fn test_listmode_multiplicity_matches_counts() {
    let toy = toy_problem(8);
    let ev = expand_events(&toy, 4, 3);
    for (event, &mu) in ev.events.iter().zip(&ev.multiplicity) {
        let bin = event.start[0] as usize;
        assert_eq!(mu as f64, toy.counts[bin]);
    }
}

fn assert_engines_agree(schedule: BlockSchedule, epochs: usize) {
    let toy = toy_problem(2024);
    let beta = 0.02;
    let x0 = mlem(&toy.a, &toy.counts, &toy.contamination, &vec![1.0; 16], 3).unwrap();

    let problem = HistogramProblem::new(&toy.a, &toy.grad, &toy.counts, &toy.contamination);
    let settings = ReconSettings::default().with_beta(beta).with_iterations(3000);
    let reference = run_pdhg(&problem, &settings, &x0).unwrap();

    let ev = expand_events(&toy, 4, 77);
    let lm = listmode_view(&toy, &ev);
    let settings = settings.with_iterations(epochs).with_schedule(schedule);
    let mut rng = ChaCha8Rng::seed_from_u64(1234);
    let stochastic = run_lm_spdhg(&lm, &settings, &x0, &mut rng).unwrap();

    assert!(stochastic.x.iter().all(|v| *v >= 0.0));

    let cost = |x: &[f64]| poisson_tv_cost(&toy.a, &toy.grad, x, &toy.counts, &toy.contamination, beta).unwrap();
    let c_start = cost(&x0);
    let c_ref = cost(&reference.x);
    let c_lm = cost(&stochastic.x);
    assert!(c_ref <= c_start);
    assert!(c_lm <= c_start);
    assert!(
        (c_lm - c_ref).abs() <= 1e-2 * c_ref.abs().max(1.0),
        "PDHG cost {} vs LM-SPDHG cost {}",
        c_ref,
        c_lm
    );

    let diff: Vec<f64> = reference.x.iter().zip(&stochastic.x).map(|(a, b)| a - b).collect();
    let rel = norm2(&diff) / norm2(&reference.x);
    assert!(rel < 5e-2, "relative image difference {}", rel);
}

#[test]
fn test_pdhg_and_lm_spdhg_agree_permutation() {
    assert_engines_agree(BlockSchedule::Permutation, 1500);
}

#[test]
fn test_pdhg_and_lm_spdhg_agree_categorical() {
    assert_engines_agree(BlockSchedule::Categorical { steps_per_epoch: None }, 1500);
}

#[test]
fn test_lm_spdhg_reproducible_for_equal_seeds() {
    let toy = toy_problem(4);
    let ev = expand_events(&toy, 3, 5);
    let lm = listmode_view(&toy, &ev);
    let settings = ReconSettings::default().with_beta(0.1).with_iterations(20);
    let x0 = vec![1.0; 16];

    let a = run_lm_spdhg(&lm, &settings, &x0, &mut ChaCha8Rng::seed_from_u64(99)).unwrap();
    let b = run_lm_spdhg(&lm, &settings, &x0, &mut ChaCha8Rng::seed_from_u64(99)).unwrap();
    assert_eq!(a.x, b.x);
    assert_eq!(a.info.gradient_steps, b.info.gradient_steps);
    // reference probabilities: half of all inner steps update the gradient
    assert_eq!(a.info.gradient_steps * 2, a.info.inner_steps);
}

#[test]
fn test_lm_spdhg_setup_errors() {
    let toy = toy_problem(6);
    let ev = expand_events(&toy, 4, 6);
    let x0 = vec![1.0; 16];
    let settings = ReconSettings::default().with_iterations(1);
    let mut rng = ChaCha8Rng::seed_from_u64(0);

    // subset count differs from operator count
    let three = Partition::stride(ev.events.len(), 3).unwrap();
    let probs3 = SubsetProbabilities::reference(3);
    let mut lm = listmode_view(&toy, &ev);
    lm.partition = &three;
    lm.probabilities = &probs3;
    let err = run_lm_spdhg(&lm, &settings, &x0, &mut rng).unwrap_err();
    assert!(matches!(err, ReconError::InvalidPartition(_)), "{:?}", err);

    // probabilities not summing to one
    let bad = SubsetProbabilities { data: vec![0.1; 4], gradient: 0.5 };
    let mut lm = listmode_view(&toy, &ev);
    lm.probabilities = &bad;
    let err = run_lm_spdhg(&lm, &settings, &x0, &mut rng).unwrap_err();
    assert!(matches!(err, ReconError::InvalidPartition(_)));

    // subset operator output does not match its subset size
    let ops: Vec<Box<dyn LinearOperator>> = (0..4)
        .map(|_| Box::new(toy.a.select_rows(&[0]).unwrap()) as Box<dyn LinearOperator>)
        .collect();
    let wrong = OperatorSequence::new(ops).unwrap();
    let mut lm = listmode_view(&toy, &ev);
    lm.sequence = &wrong;
    let err = run_lm_spdhg(&lm, &settings, &x0, &mut rng).unwrap_err();
    assert!(matches!(err, ReconError::ShapeMismatch { .. }));
}

#[test]
fn test_pdhg_rejects_infeasible_start() {
    // positive count on a bin with zero expectation
    let a = SparseOperator::identity(2);
    let grad = FiniteDifference::isotropic(&[2]).unwrap();
    let d = [1.0, 1.0];
    let s = [0.0, 0.0];
    let problem = HistogramProblem::new(&a, &grad, &d, &s);
    let err = run_pdhg(&problem, &ReconSettings::default(), &[0.0, 1.0]).unwrap_err();
    assert!(matches!(err, ReconError::NumericalInstability(_)));
}
