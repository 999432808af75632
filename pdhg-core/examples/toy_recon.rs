//! Toy reconstruction with both engines.
//!
//! An 8×8 disc phantom is measured by line sums along rows, columns and both
//! diagonals. Counts are the rounded expectations. The image is reconstructed
//! with PDHG from the binned counts and with LM-SPDHG from the same counts
//! expanded into an event list.

use std::ops::ControlFlow;

use pdhg_core::{
    mlem, multiplicities, poisson_tv_cost, run_lm_spdhg, run_pdhg_with_callback, Event, EventList,
    FiniteDifference, HistogramProblem, LinearOperator, ListModeProblem, OperatorSequence, Partition,
    ReconSettings, SparseOperator, SubsetProbabilities,
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const N: usize = 8;

/// Line-sum projector: one bin per row, column, diagonal and anti-diagonal.
fn line_projector() -> SparseOperator {
    let mut triplets = Vec::new();
    let mut bin = 0;
    for r in 0..N {
        triplets.extend((0..N).map(|c| (bin, r * N + c, 1.0)));
        bin += 1;
    }
    for c in 0..N {
        triplets.extend((0..N).map(|r| (bin, r * N + c, 1.0)));
        bin += 1;
    }
    for k in 0..(2 * N - 1) {
        triplets.extend((0..N).filter(|&r| k >= r && k - r < N).map(|r| (bin, r * N + (k - r), 1.0)));
        bin += 1;
    }
    for k in 0..(2 * N - 1) {
        // c − r + N − 1 = k
        triplets.extend(
            (0..N)
                .filter(|&r| r + k + 1 >= N && r + k + 1 - N < N)
                .map(|r| (bin, r * N + (r + k + 1 - N), 1.0)),
        );
        bin += 1;
    }
    SparseOperator::from_triplets(bin, N * N, triplets)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("pdhg-core - toy reconstruction");
    println!("==============================");

    let shape = [N, N, 1];
    let a = line_projector().with_image_shape(&shape)?;
    let grad = FiniteDifference::isotropic(&shape)?;

    let phantom: Vec<f64> = (0..N * N)
        .map(|v| {
            let (r, c) = ((v / N) as f64 - 3.5, (v % N) as f64 - 3.5);
            if r * r + c * c < 9.0 {
                4.0
            } else {
                0.5
            }
        })
        .collect();
    let contamination = vec![1.0; a.out_len()];
    let counts: Vec<f64> = a
        .apply(&phantom)?
        .iter()
        .zip(&contamination)
        .map(|(ax, s)| (ax + s).round())
        .collect();

    let beta = 0.5;
    let x0 = mlem(&a, &counts, &contamination, &vec![1.0; N * N], 5)?;

    // PDHG on the histogram
    let problem = HistogramProblem::new(&a, &grad, &counts, &contamination);
    let settings = ReconSettings::default().with_beta(beta).with_iterations(500);
    let pdhg = run_pdhg_with_callback(&problem, &settings, &x0, |iter, x| {
        if iter % 100 == 0 {
            let cost = poisson_tv_cost(&a, &grad, x, &counts, &contamination, beta).unwrap_or(f64::NAN);
            println!("  pdhg iter {:>4}: cost = {:.6}", iter, cost);
        }
        ControlFlow::Continue(())
    })?;

    // LM-SPDHG on the expanded events
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let mut bins: Vec<usize> = counts
        .iter()
        .enumerate()
        .flat_map(|(j, &d)| std::iter::repeat(j).take(d as usize))
        .collect();
    bins.shuffle(&mut rng);

    let events: EventList = bins
        .iter()
        .map(|&j| Event::new([j as f64, 0.0, 0.0], [j as f64, 1.0, 0.0], 0))
        .collect();
    let multiplicity = multiplicities(&events);
    let event_contamination: Vec<f64> = bins.iter().map(|&j| contamination[j]).collect();

    let num_subsets = 8;
    let partition = Partition::stride(events.len(), num_subsets)?;
    let mut ops: Vec<Box<dyn LinearOperator>> = Vec::with_capacity(num_subsets);
    for i in 0..num_subsets {
        ops.push(Box::new(a.select_rows(&partition.gather(i, &bins))?));
    }
    let sequence = OperatorSequence::new(ops)?;
    let adjoint_ones = a.adjoint(&vec![1.0; a.out_len()])?;
    let probabilities = SubsetProbabilities::reference(num_subsets);

    let lm_problem = ListModeProblem {
        sequence: &sequence,
        gradient: &grad,
        events: &events,
        multiplicity: &multiplicity,
        contamination: &event_contamination,
        partition: &partition,
        probabilities: &probabilities,
        adjoint_ones: &adjoint_ones,
    };
    let lm = run_lm_spdhg(&lm_problem, &settings.clone().with_iterations(250), &x0, &mut rng)?;

    let cost = |x: &[f64]| poisson_tv_cost(&a, &grad, x, &counts, &contamination, beta);
    println!();
    println!("events:          {}", events.len());
    println!("PDHG cost:       {:.6} ({} ms)", cost(&pdhg.x)?, pdhg.info.solve_time_ms);
    println!("LM-SPDHG cost:   {:.6} ({} ms)", cost(&lm.x)?, lm.info.solve_time_ms);
    println!();
    println!("PDHG image:");
    for row in pdhg.x.chunks(N) {
        let line: Vec<String> = row.iter().map(|v| format!("{:5.2}", v)).collect();
        println!("  {}", line.join(" "));
    }

    Ok(())
}
