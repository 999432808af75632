//! Deterministic PDHG on binned data.

pub mod diagnostics;
pub mod perf;
pub mod solve;
pub mod state;
pub mod step;

pub use diagnostics::DiagnosticsConfig;
pub use perf::{PerfSection, PerfTimers};
pub use solve::{run_pdhg, run_pdhg_with_callback};
pub use state::{PdhgState, PdhgWorkspace};
pub use step::pdhg_step_in_place;
