//! Event-list partitions and block selection probabilities.

use crate::error::{ReconError, ReconResult};

/// Tolerance on Σ p = 1.
const PROBABILITY_SUM_TOL: f64 = 1e-9;

/// Disjoint index subsets whose union is the full event list.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Partition {
    num_events: usize,
    subsets: Vec<Vec<usize>>,
}

impl Partition {
    /// Stride partition: subset `i` holds events `i, i + n, i + 2n, …`.
    pub fn stride(num_events: usize, num_subsets: usize) -> ReconResult<Self> {
        if num_subsets == 0 {
            return Err(ReconError::InvalidPartition("number of subsets must be positive".into()));
        }
        if num_subsets > num_events {
            return Err(ReconError::InvalidPartition(format!(
                "{} subsets requested for {} events; every subset must be non-empty",
                num_subsets, num_events
            )));
        }
        let subsets = (0..num_subsets)
            .map(|i| (i..num_events).step_by(num_subsets).collect())
            .collect();
        Ok(Self { num_events, subsets })
    }

    /// Arbitrary partition, validated to be a disjoint cover of `0..num_events`
    /// with no empty subset.
    pub fn from_subsets(subsets: Vec<Vec<usize>>, num_events: usize) -> ReconResult<Self> {
        if subsets.is_empty() {
            return Err(ReconError::InvalidPartition("no subsets given".into()));
        }

        let mut owner: Vec<Option<usize>> = vec![None; num_events];
        for (s, subset) in subsets.iter().enumerate() {
            if subset.is_empty() {
                return Err(ReconError::InvalidPartition(format!("subset {} is empty", s)));
            }
            for &e in subset {
                if e >= num_events {
                    return Err(ReconError::InvalidPartition(format!(
                        "subset {} references event {} beyond list length {}",
                        s, e, num_events
                    )));
                }
                if let Some(prev) = owner[e] {
                    return Err(ReconError::InvalidPartition(format!(
                        "event {} appears in subsets {} and {}",
                        e, prev, s
                    )));
                }
                owner[e] = Some(s);
            }
        }

        if let Some(missing) = owner.iter().position(|o| o.is_none()) {
            return Err(ReconError::InvalidPartition(format!(
                "event {} is not covered by any subset",
                missing
            )));
        }

        Ok(Self { num_events, subsets })
    }

    pub fn num_subsets(&self) -> usize {
        self.subsets.len()
    }

    pub fn num_events(&self) -> usize {
        self.num_events
    }

    pub fn subset(&self, i: usize) -> &[usize] {
        &self.subsets[i]
    }

    pub fn subsets(&self) -> &[Vec<usize>] {
        &self.subsets
    }

    /// Values of `full` at the indices of subset `i`.
    pub fn gather<T: Copy>(&self, i: usize, full: &[T]) -> Vec<T> {
        self.subsets[i].iter().map(|&e| full[e]).collect()
    }
}

/// Selection probabilities of the data subsets and of the gradient block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubsetProbabilities {
    pub data: Vec<f64>,
    pub gradient: f64,
}

impl SubsetProbabilities {
    /// Reference weighting: half of all updates go to the gradient block,
    /// the other half is shared evenly by the `n` data subsets.
    pub fn reference(num_subsets: usize) -> Self {
        Self::uniform(num_subsets, 0.5)
    }

    /// Equal data probabilities `(1 - p_g) / n`.
    pub fn uniform(num_subsets: usize, gradient: f64) -> Self {
        let p_a = (1.0 - gradient) / num_subsets.max(1) as f64;
        Self {
            data: vec![p_a; num_subsets],
            gradient,
        }
    }

    /// Check positivity, count and Σ p = 1.
    pub fn validate(&self, num_subsets: usize) -> ReconResult<()> {
        if self.data.len() != num_subsets {
            return Err(ReconError::InvalidPartition(format!(
                "{} data probabilities for {} subsets",
                self.data.len(),
                num_subsets
            )));
        }
        let all_positive = self
            .data
            .iter()
            .chain(std::iter::once(&self.gradient))
            .all(|p| p.is_finite() && *p > 0.0);
        if !all_positive {
            return Err(ReconError::InvalidPartition(
                "selection probabilities must be positive and finite".into(),
            ));
        }
        let total = self.total();
        if (total - 1.0).abs() > PROBABILITY_SUM_TOL {
            return Err(ReconError::InvalidPartition(format!(
                "selection probabilities sum to {}, expected 1",
                total
            )));
        }
        Ok(())
    }

    pub fn total(&self) -> f64 {
        self.data.iter().sum::<f64>() + self.gradient
    }

    /// Common data probability if all subsets share one.
    pub fn common_data_probability(&self) -> Option<f64> {
        let first = *self.data.first()?;
        let equal = self
            .data
            .iter()
            .all(|p| (p - first).abs() <= PROBABILITY_SUM_TOL * first.max(1.0));
        equal.then_some(first)
    }
}
