//! Block selection for LM-SPDHG.
//!
//! Two realizations of the same sampling scheme, chosen by
//! [`BlockSchedule`]:
//!
//! - `Permutation`: an epoch is a shuffle of a fixed multiset containing
//!   every data subset once and the gradient block `k = round(p_g / p_a)`
//!   times. Selection frequencies match `{p_a, …, p_a, p_g}` exactly over an
//!   epoch when `p_g / p_a` is an integer.
//! - `Categorical`: every step is an independent draw from
//!   `{p_1, …, p_n, p_g}`.

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{ReconError, ReconResult};
use crate::listmode::SubsetProbabilities;
use crate::problem::BlockSchedule;

/// Tolerance for treating `p_g / p_a` as an integer.
const RATIO_TOL: f64 = 1e-9;

/// Block updated by one inner step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    Data(usize),
    Gradient,
}

#[derive(Debug, Clone)]
enum Sampler {
    Shuffle(Vec<Block>),
    Draw { dist: WeightedIndex<f64>, steps: usize },
}

/// Produces the block sequence of each epoch.
#[derive(Debug, Clone)]
pub struct EpochSchedule {
    num_subsets: usize,
    sampler: Sampler,
}

impl EpochSchedule {
    pub fn new(policy: BlockSchedule, probabilities: &SubsetProbabilities) -> ReconResult<Self> {
        let n = probabilities.data.len();
        probabilities.validate(n)?;

        let sampler = match policy {
            BlockSchedule::Permutation => {
                let p_a = probabilities.common_data_probability().ok_or_else(|| {
                    ReconError::InvalidSettings(
                        "permutation schedule needs equal data probabilities; use the categorical schedule"
                            .into(),
                    )
                })?;
                let ratio = probabilities.gradient / p_a;
                let k = (ratio.round() as usize).max(1);
                if (ratio - k as f64).abs() > RATIO_TOL * ratio.max(1.0) {
                    log::warn!(
                        "p_g/p_a = {:.6} is not an integer; gradient block appears {} times per epoch",
                        ratio,
                        k
                    );
                }

                let mut template: Vec<Block> = (0..n).map(Block::Data).collect();
                template.extend(std::iter::repeat(Block::Gradient).take(k));
                Sampler::Shuffle(template)
            }
            BlockSchedule::Categorical { steps_per_epoch } => {
                let weights = probabilities
                    .data
                    .iter()
                    .chain(std::iter::once(&probabilities.gradient));
                let dist = WeightedIndex::new(weights)
                    .map_err(|e| ReconError::InvalidPartition(format!("selection weights: {}", e)))?;
                Sampler::Draw { dist, steps: steps_per_epoch.unwrap_or(2 * n) }
            }
        };

        Ok(Self { num_subsets: n, sampler })
    }

    /// Inner steps per epoch.
    pub fn steps_per_epoch(&self) -> usize {
        match &self.sampler {
            Sampler::Shuffle(template) => template.len(),
            Sampler::Draw { steps, .. } => *steps,
        }
    }

    /// Fill `out` with the blocks of the next epoch.
    pub fn next_epoch<R: Rng + ?Sized>(&self, rng: &mut R, out: &mut Vec<Block>) {
        out.clear();
        match &self.sampler {
            Sampler::Shuffle(template) => {
                out.extend_from_slice(template);
                out.shuffle(rng);
            }
            Sampler::Draw { dist, steps } => {
                out.extend((0..*steps).map(|_| {
                    let k = dist.sample(rng);
                    if k == self.num_subsets {
                        Block::Gradient
                    } else {
                        Block::Data(k)
                    }
                }));
            }
        }
    }
}
