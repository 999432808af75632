//! Proximal operator of the convex conjugate of the isotropic TV term.
//!
//! The conjugate of β·Σ_v ||(∇x)_v||₂ is the indicator of the product of
//! ℓ2 balls of radius β, one ball per voxel over its gradient directions. Its
//! prox is therefore a per-group projection:
//!
//! ```text
//! w_v ← β · u_v / max(1, ||u_v||₂),   u_v = w_v / β
//! ```
//!
//! `w` is laid out direction-major, `[dir][voxel]`, as produced by
//! [`FiniteDifference`](crate::linalg::FiniteDifference).

/// Project every voxel group of `w` onto the ℓ2 ball of radius `beta`.
///
/// Groups already inside the ball are left untouched. A zero group is never
/// divided by its norm. `beta == 0` maps every group to zero.
pub fn tv_conjugate_prox_in_place(w: &mut [f64], num_directions: usize, beta: f64) {
    debug_assert!(num_directions > 0);
    debug_assert_eq!(w.len() % num_directions, 0);
    debug_assert!(beta >= 0.0);

    if beta == 0.0 {
        w.fill(0.0);
        return;
    }

    let n = w.len() / num_directions;
    for v in 0..n {
        let mut norm_sq = 0.0;
        for d in 0..num_directions {
            let u = w[d * n + v] / beta;
            norm_sq += u * u;
        }
        let denom = norm_sq.sqrt().max(1.0);
        if denom > 1.0 {
            for d in 0..num_directions {
                w[d * n + v] /= denom;
            }
        }
    }
}

/// Per-voxel gradient magnitudes ||(g)_v||₂ for a direction-major buffer.
pub fn group_norms(g: &[f64], num_directions: usize) -> Vec<f64> {
    let n = g.len() / num_directions;
    (0..n)
        .map(|v| {
            (0..num_directions)
                .map(|d| g[d * n + v] * g[d * n + v])
                .sum::<f64>()
                .sqrt()
        })
        .collect()
}
