//! Dense slice kernels.
//!
//! Images, measurements and dual variables are flat `f64` buffers. This module
//! is the numeric-array interface the engines are written against: element-wise
//! updates and reductions over slices, nothing device specific.

/// Inner product <a, b>.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&ai, &bi)| ai * bi).sum()
}

/// Euclidean norm ||a||₂.
#[inline]
pub fn norm2(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// y ← alpha·x + y
#[inline]
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, &xi) in y.iter_mut().zip(x.iter()) {
        *yi += alpha * xi;
    }
}

/// x ← alpha·x
#[inline]
pub fn scale(alpha: f64, x: &mut [f64]) {
    for xi in x.iter_mut() {
        *xi *= alpha;
    }
}

/// out ← a - b
#[inline]
pub fn sub_into(a: &[f64], b: &[f64], out: &mut [f64]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    for ((o, &ai), &bi) in out.iter_mut().zip(a.iter()).zip(b.iter()) {
        *o = ai - bi;
    }
}

/// Pointwise minimum: a ← min(a, b).
#[inline]
pub fn min_in_place(a: &mut [f64], b: &[f64]) {
    debug_assert_eq!(a.len(), b.len());
    for (ai, &bi) in a.iter_mut().zip(b.iter()) {
        *ai = ai.min(bi);
    }
}

/// Smallest strictly positive finite entry, if any.
pub fn min_positive(a: &[f64]) -> Option<f64> {
    a.iter()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.min(v))))
}

/// Projected descent step: x ← max(0, x - t ⊙ g).
#[inline]
pub fn projected_step(x: &mut [f64], t: &[f64], g: &[f64]) {
    debug_assert_eq!(x.len(), t.len());
    debug_assert_eq!(x.len(), g.len());
    for ((xi, &ti), &gi) in x.iter_mut().zip(t.iter()).zip(g.iter()) {
        *xi = (*xi - ti * gi).max(0.0);
    }
}

/// True if every entry is finite and non-negative.
pub fn is_nonneg_finite(a: &[f64]) -> bool {
    a.iter().all(|v| v.is_finite() && *v >= 0.0)
}
