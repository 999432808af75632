//! Closed-form proximal operators of the conjugate terms.
//!
//! - [`poisson`]: conjugate of the Poisson negative log-likelihood
//! - [`tv`]: conjugate of the isotropic total-variation group norm

pub mod poisson;
pub mod tv;

pub use poisson::{poisson_conjugate_prox, poisson_conjugate_prox_in_place};
pub use tv::{group_norms, tv_conjugate_prox_in_place};
