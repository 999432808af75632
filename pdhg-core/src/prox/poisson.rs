//! Proximal operator of the convex conjugate of the Poisson log-likelihood.
//!
//! For the data term f(u) = Σ (u_i - d_i log u_i) the conjugate is
//! f*(y) = -Σ d_i log(1 - y_i) (plus the indicator of y ≤ 1), and its
//! resolvent with step S has the closed form
//!
//! ```text
//! prox(y) = ½ (y + 1 - sqrt((y - 1)² + 4 S d))
//! ```
//!
//! The root is real whenever S·d ≥ 0. A negative discriminant can only come
//! from corrupted inputs (negative counts or steps) and is reported as
//! [`ReconError::NumericalInstability`] instead of being clamped.

use crate::error::{ReconError, ReconResult};

/// Closed-form prox for a single dual value.
#[inline]
pub fn poisson_conjugate_prox(y: f64, step: f64, counts: f64) -> ReconResult<f64> {
    let ym1 = y - 1.0;
    let disc = ym1 * ym1 + 4.0 * step * counts;
    // `!(disc >= 0.0)` also catches NaN
    if !(disc >= 0.0) {
        return Err(ReconError::NumericalInstability(format!(
            "negative discriminant {:.3e} in Poisson prox (y={:.3e}, S={:.3e}, d={:.3e})",
            disc, y, step, counts
        )));
    }
    Ok(0.5 * (y + 1.0 - disc.sqrt()))
}

/// Apply the prox element-wise: `y[i] ← prox(y[i]; step[i], counts[i])`.
pub fn poisson_conjugate_prox_in_place(y: &mut [f64], step: &[f64], counts: &[f64]) -> ReconResult<()> {
    debug_assert_eq!(y.len(), step.len());
    debug_assert_eq!(y.len(), counts.len());
    for ((yi, &si), &di) in y.iter_mut().zip(step.iter()).zip(counts.iter()) {
        *yi = poisson_conjugate_prox(*yi, si, di)?;
    }
    Ok(())
}
