//! pdhg-core: primal-dual image reconstruction from Poisson counts
//!
//! This library reconstructs a non-negative image `x` by solving
//!
//! ```text
//! minimize   Σ_j (Ā_j − d_j log Ā_j) + β Σ_v ||(∇x)_v||₂
//! subject to x ≥ 0,          Ā = A x + s
//! ```
//!
//! with two engines:
//!
//! - **PDHG** ([`run_pdhg`]): deterministic primal-dual hybrid gradient on
//!   binned counts.
//! - **LM-SPDHG** ([`run_lm_spdhg`]): stochastic primal-dual hybrid
//!   gradient on list-mode events split into subsets, with non-uniform block
//!   probabilities and importance-weighted extrapolation.
//!
//! # Algorithm
//!
//! - **Closed-form proximal maps** for the conjugates of the Poisson
//!   likelihood and of the TV group norm
//! - **Diagonal preconditioning** from operator row and column sums, with
//!   zero sensitivities replaced by the smallest positive one
//! - **Explicit engine state**, mutated in place by a step function
//! - **Injected randomness** for block selection, so runs are reproducible
//!
//! # Example
//!
//! ```ignore
//! use pdhg_core::{run_pdhg, FiniteDifference, HistogramProblem, ReconSettings, SparseOperator};
//!
//! let a = SparseOperator::from_triplets(m, n, triplets).with_image_shape(&[nx, ny, nz])?;
//! let grad = FiniteDifference::isotropic(&[nx, ny, nz])?;
//! let problem = HistogramProblem::new(&a, &grad, &counts, &contamination);
//!
//! let settings = ReconSettings::default().with_beta(0.1).with_iterations(500);
//! let solution = run_pdhg(&problem, &settings, &vec![1.0; n])?;
//! println!("{} after {} iterations", solution.status, solution.info.iterations);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // step kernels take every buffer explicitly

pub mod cost;
pub mod error;
pub mod init;
pub mod linalg;
pub mod listmode;
pub mod pdhg;
pub mod precond;
pub mod problem;
pub mod prox;
pub mod spdhg;

pub use cost::{listmode_cost, poisson_tv_cost, tv_seminorm};
pub use error::{ReconError, ReconResult};
pub use init::{listmode_mlem, mlem};
pub use linalg::{
    CompositeOperator, DiagonalOperator, FiniteDifference, LinearOperator, OperatorSequence, SparseOperator,
};
pub use listmode::{multiplicities, Event, EventList, Partition, SubsetProbabilities};
pub use pdhg::{run_pdhg, run_pdhg_with_callback};
pub use precond::StepSizes;
pub use problem::{
    BlockSchedule, HistogramProblem, ListModeProblem, ReconInfo, ReconSettings, ReconSolution, ReconStatus,
};
pub use spdhg::{run_lm_spdhg, run_lm_spdhg_with_callback};
