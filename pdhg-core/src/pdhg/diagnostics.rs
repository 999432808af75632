//! Opt-in run logging shared by both engines.
//!
//! * `PDHG_COST_EVERY=k` evaluates the objective every `k` iterations (epochs
//!   for LM-SPDHG) and on the final one. Unset or `0` disables it, since each
//!   evaluation costs an extra forward projection.
//! * `PDHG_LOG_STEPS=1` prints the range of the preconditioner at setup.
//!
//! Both are independent of the per-iteration image callback.

use std::env;

use crate::precond::StepSizes;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    /// Cost-logging stride; `None` never evaluates the cost
    pub cost_every: Option<usize>,
    /// Log the step-size ranges once after setup
    pub step_summary: bool,
}

impl DiagnosticsConfig {
    pub fn from_env() -> Self {
        let cost_every = env::var("PDHG_COST_EVERY")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&k| k > 0);
        let step_summary = env::var("PDHG_LOG_STEPS")
            .map(|v| !matches!(v.trim().to_lowercase().as_str(), "" | "0" | "false" | "off"))
            .unwrap_or(false);

        Self { cost_every, step_summary }
    }

    /// Whether the cost should be evaluated after iteration `iter` of `last`.
    pub fn cost_due(&self, iter: usize, last: usize) -> bool {
        match self.cost_every {
            Some(k) => iter % k == 0 || iter == last,
            None => false,
        }
    }

    pub fn log_step_summary(&self, engine: &str, steps: &StepSizes) {
        if !self.step_summary {
            return;
        }
        let (t_min, t_max) = value_range(steps.primal.iter().copied());
        let (s_min, s_max) = value_range(steps.data.iter().flatten().copied());
        log::info!(
            "{}: T in [{:.3e}, {:.3e}], S in [{:.3e}, {:.3e}] over {} blocks, S_G={:.3e}",
            engine,
            t_min,
            t_max,
            s_min,
            s_max,
            steps.data.len(),
            steps.gradient_dual,
        );
    }
}

fn value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_stride_includes_last_iteration() {
        let diag = DiagnosticsConfig { cost_every: Some(4), step_summary: false };
        assert!(!diag.cost_due(3, 10));
        assert!(diag.cost_due(4, 10));
        assert!(diag.cost_due(8, 10));
        assert!(!diag.cost_due(9, 10));
        assert!(diag.cost_due(10, 10));

        let off = DiagnosticsConfig::default();
        assert!(!off.cost_due(10, 10));
    }

    #[test]
    fn test_value_range() {
        assert_eq!(value_range([0.5, 2.0, 0.25].into_iter()), (0.25, 2.0));
        let (lo, hi) = value_range(std::iter::empty());
        assert!(lo.is_infinite() && hi.is_infinite());
    }
}
