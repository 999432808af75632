//! Problem views, engine settings and run reports.
//!
//! Both engines minimize
//!
//! ```text
//! Σ_j (Ā_j − d_j log Ā_j) + β Σ_v ||(∇x)_v||₂   s.t. x ≥ 0,   Ā = A x + s
//! ```
//!
//! [`HistogramProblem`] carries binned counts for full-batch PDHG,
//! [`ListModeProblem`] carries an event list split into subsets for LM-SPDHG.
//! Problems borrow their operators and data; nothing is copied at setup.

use std::fmt;

use crate::error::{ReconError, ReconResult};
use crate::linalg::vector::is_nonneg_finite;
use crate::linalg::{LinearOperator, OperatorSequence};
use crate::listmode::{EventList, Partition, SubsetProbabilities};
use crate::pdhg::perf::PerfTimers;

/// How LM-SPDHG picks the block updated by each inner step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlockSchedule {
    /// Every epoch is a shuffled list holding each data subset once and the
    /// gradient block `round(p_g / p_a)` times. Requires equal data
    /// probabilities. With the reference probabilities this is `2n` steps.
    #[default]
    Permutation,

    /// Every step draws a block independently from `{p_1, …, p_n, p_g}`.
    /// `None` uses `2n` steps per epoch.
    Categorical { steps_per_epoch: Option<usize> },
}

impl fmt::Display for BlockSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockSchedule::Permutation => write!(f, "permutation"),
            BlockSchedule::Categorical { steps_per_epoch: None } => write!(f, "categorical"),
            BlockSchedule::Categorical { steps_per_epoch: Some(k) } => {
                write!(f, "categorical({} steps/epoch)", k)
            }
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReconSettings {
    /// TV weight β (≥ 0; 0 disables regularization)
    pub beta: f64,

    /// Ratio γ between dual and primal step sizes
    pub gamma: f64,

    /// Safety factor ρ in (0, 1)
    pub rho: f64,

    /// PDHG iterations, or LM-SPDHG epochs
    pub num_iterations: usize,

    /// Power-iteration cap for the gradient norm estimate
    pub norm_iterations: usize,

    /// Known ||∇||; skips the power iteration when set
    pub gradient_norm: Option<f64>,

    /// Block selection policy of LM-SPDHG
    pub schedule: BlockSchedule,

    /// Emit start/end summaries through `log::info!`
    pub verbose: bool,
}

impl Default for ReconSettings {
    fn default() -> Self {
        // PDHG_NORM_ITERS overrides the power-iteration cap
        let norm_iterations = std::env::var("PDHG_NORM_ITERS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(100);

        Self {
            beta: 0.0,
            gamma: 1.0,
            rho: 0.999,
            num_iterations: 100,
            norm_iterations,
            gradient_norm: None,
            schedule: BlockSchedule::default(),
            verbose: false,
        }
    }
}

impl ReconSettings {
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_rho(mut self, rho: f64) -> Self {
        self.rho = rho;
        self
    }

    pub fn with_iterations(mut self, num_iterations: usize) -> Self {
        self.num_iterations = num_iterations;
        self
    }

    pub fn with_norm_iterations(mut self, norm_iterations: usize) -> Self {
        self.norm_iterations = norm_iterations;
        self
    }

    pub fn with_gradient_norm(mut self, norm: f64) -> Self {
        self.gradient_norm = Some(norm);
        self
    }

    pub fn with_schedule(mut self, schedule: BlockSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> ReconResult<()> {
        if !(self.beta.is_finite() && self.beta >= 0.0) {
            return Err(ReconError::InvalidSettings(format!("beta must be >= 0, got {}", self.beta)));
        }
        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            return Err(ReconError::InvalidSettings(format!("gamma must be > 0, got {}", self.gamma)));
        }
        if !(self.rho > 0.0 && self.rho < 1.0) {
            return Err(ReconError::InvalidSettings(format!(
                "rho must lie in (0, 1), got {}",
                self.rho
            )));
        }
        if let Some(norm) = self.gradient_norm {
            if !(norm.is_finite() && norm > 0.0) {
                return Err(ReconError::InvalidSettings(format!(
                    "gradient_norm must be > 0, got {}",
                    norm
                )));
            }
        } else if self.norm_iterations == 0 {
            return Err(ReconError::InvalidSettings(
                "norm_iterations must be > 0 when no gradient_norm is given".into(),
            ));
        }
        if let BlockSchedule::Categorical { steps_per_epoch: Some(0) } = self.schedule {
            return Err(ReconError::InvalidSettings("steps_per_epoch must be > 0".into()));
        }
        Ok(())
    }

    /// ||∇||, from the override or by power iteration.
    pub(crate) fn resolve_gradient_norm<G: LinearOperator + ?Sized>(&self, gradient: &G) -> f64 {
        self.gradient_norm
            .unwrap_or_else(|| gradient.estimate_norm(self.norm_iterations))
    }
}

/// Binned data for full-batch PDHG.
#[derive(Clone, Copy)]
pub struct HistogramProblem<'a> {
    /// Forward model A (image → bins)
    pub operator: &'a dyn LinearOperator,

    /// Gradient operator ∇ (image → `[dirs, image...]`)
    pub gradient: &'a dyn LinearOperator,

    /// Counts d, one per bin
    pub counts: &'a [f64],

    /// Additive contamination s, one per bin
    pub contamination: &'a [f64],
}

impl<'a> HistogramProblem<'a> {
    pub fn new(
        operator: &'a dyn LinearOperator,
        gradient: &'a dyn LinearOperator,
        counts: &'a [f64],
        contamination: &'a [f64],
    ) -> Self {
        Self { operator, gradient, counts, contamination }
    }

    pub fn num_voxels(&self) -> usize {
        self.operator.in_len()
    }

    pub fn num_bins(&self) -> usize {
        self.operator.out_len()
    }

    /// Check lengths, shapes and data ranges.
    pub fn validate(&self) -> ReconResult<()> {
        let m = self.num_bins();
        if self.counts.len() != m {
            return Err(ReconError::length("counts", m, self.counts.len()));
        }
        if self.contamination.len() != m {
            return Err(ReconError::length("contamination", m, self.contamination.len()));
        }
        if !is_nonneg_finite(self.counts) {
            return Err(ReconError::InvalidInput("counts must be finite and >= 0".into()));
        }
        if !is_nonneg_finite(self.contamination) {
            return Err(ReconError::InvalidInput("contamination must be finite and >= 0".into()));
        }
        check_gradient(self.gradient, self.operator.in_shape())?;
        Ok(())
    }
}

impl fmt::Debug for HistogramProblem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistogramProblem")
            .field("image_shape", &self.operator.in_shape())
            .field("bins", &self.num_bins())
            .finish()
    }
}

/// Event data for LM-SPDHG.
#[derive(Clone, Copy)]
pub struct ListModeProblem<'a> {
    /// One operator per subset; operator `i` maps the image to the events of
    /// subset `i`, in partition order.
    pub sequence: &'a OperatorSequence,

    /// Gradient operator ∇
    pub gradient: &'a dyn LinearOperator,

    /// Detected events
    pub events: &'a EventList,

    /// Multiplicity μ of every event
    pub multiplicity: &'a [u32],

    /// Contamination s of every event
    pub contamination: &'a [f64],

    /// Subset split of the event list
    pub partition: &'a Partition,

    /// Selection probabilities of the subsets and the gradient block
    pub probabilities: &'a SubsetProbabilities,

    /// Histogram sensitivity image Aᵀ1
    pub adjoint_ones: &'a [f64],
}

impl ListModeProblem<'_> {
    pub fn num_voxels(&self) -> usize {
        self.sequence.in_len()
    }

    pub fn num_subsets(&self) -> usize {
        self.partition.num_subsets()
    }

    /// Check that events, subsets, operators and probabilities agree.
    pub fn validate(&self) -> ReconResult<()> {
        let num_events = self.events.len();
        if self.multiplicity.len() != num_events {
            return Err(ReconError::length("multiplicity", num_events, self.multiplicity.len()));
        }
        if self.contamination.len() != num_events {
            return Err(ReconError::length("contamination", num_events, self.contamination.len()));
        }
        if self.partition.num_events() != num_events {
            return Err(ReconError::InvalidPartition(format!(
                "partition covers {} events, list holds {}",
                self.partition.num_events(),
                num_events
            )));
        }
        if self.partition.num_subsets() != self.sequence.len() {
            return Err(ReconError::InvalidPartition(format!(
                "{} subsets but {} subset operators",
                self.partition.num_subsets(),
                self.sequence.len()
            )));
        }
        self.probabilities.validate(self.partition.num_subsets())?;

        for (i, op) in self.sequence.iter().enumerate() {
            let subset_len = self.partition.subset(i).len();
            if op.out_len() != subset_len {
                return Err(ReconError::length(
                    format!("subset operator {} output", i),
                    subset_len,
                    op.out_len(),
                ));
            }
        }

        if self.multiplicity.iter().any(|&m| m == 0) {
            return Err(ReconError::InvalidInput("event multiplicities must be >= 1".into()));
        }
        if !is_nonneg_finite(self.contamination) {
            return Err(ReconError::InvalidInput("contamination must be finite and >= 0".into()));
        }

        let n = self.num_voxels();
        if self.adjoint_ones.len() != n {
            return Err(ReconError::length("adjoint_ones", n, self.adjoint_ones.len()));
        }
        if !is_nonneg_finite(self.adjoint_ones) {
            return Err(ReconError::InvalidInput("adjoint_ones must be finite and >= 0".into()));
        }
        check_gradient(self.gradient, self.sequence.in_shape())?;
        Ok(())
    }
}

impl fmt::Debug for ListModeProblem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListModeProblem")
            .field("image_shape", &self.sequence.in_shape())
            .field("events", &self.events.len())
            .field("subsets", &self.partition.num_subsets())
            .finish()
    }
}

/// The gradient must act on the image and produce whole direction blocks.
fn check_gradient(gradient: &dyn LinearOperator, image_shape: &[usize]) -> ReconResult<()> {
    if gradient.in_shape() != image_shape {
        return Err(ReconError::shape("gradient input", image_shape, gradient.in_shape()));
    }
    let n = gradient.in_len();
    if n == 0 || gradient.out_len() % n != 0 || gradient.out_len() == 0 {
        return Err(ReconError::InvalidInput(format!(
            "gradient output length {} is not a whole number of {}-voxel direction blocks",
            gradient.out_len(),
            n
        )));
    }
    Ok(())
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReconStatus {
    /// All requested iterations / epochs ran
    Completed,

    /// The callback returned `ControlFlow::Break`
    StoppedByCallback,
}

impl fmt::Display for ReconStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconStatus::Completed => write!(f, "Completed"),
            ReconStatus::StoppedByCallback => write!(f, "Stopped by callback"),
        }
    }
}

/// Reconstructed image with run report.
#[derive(Debug, Clone)]
pub struct ReconSolution {
    pub status: ReconStatus,

    /// Final image, row-major over the operator's image shape
    pub x: Vec<f64>,

    pub info: ReconInfo,
}

/// Run report.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReconInfo {
    /// PDHG iterations or LM-SPDHG epochs completed
    pub iterations: usize,

    /// Inner block updates (equals `iterations` for PDHG)
    pub inner_steps: usize,

    /// Gradient updates among the inner steps
    pub gradient_steps: usize,

    /// ||∇|| used for the step sizes
    pub gradient_norm: f64,

    /// Wall time of the whole run (milliseconds)
    pub solve_time_ms: u64,

    /// Time per section
    pub timers: PerfTimers,
}
