//! Step-size calculator.

pub mod step_sizes;

pub use step_sizes::{
    combine_primal, dual_step, gradient_steps, primal_step, replace_degenerate, StepSizes,
};
