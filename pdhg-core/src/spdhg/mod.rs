//! Stochastic list-mode PDHG (LM-SPDHG).
//!
//! Each inner step updates the image, then the dual of one block: a data
//! subset or the gradient. The running back projection `z` is corrected by
//! that block's contribution and extrapolated by the inverse of its
//! selection probability, which keeps `zbar` an unbiased look-ahead.

pub mod schedule;
pub mod solve;
pub mod state;
pub mod step;

pub use schedule::{Block, EpochSchedule};
pub use solve::{run_lm_spdhg, run_lm_spdhg_with_callback};
pub use state::{LmSpdhgState, LmSpdhgWorkspace, SubsetData};
pub use step::lm_spdhg_step_in_place;
