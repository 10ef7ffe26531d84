//! Gradient of the Kullback-Leibler objective, and its scalar value.
//!
//! The objective is KL(P‖Q/Z) between the fixed high-dimensional joint
//! distribution and the normalized Student-t affinities of the current
//! embedding. The gradient decomposes into an attractive term driven by P·Q
//! and a repulsive term driven by Q²/Z; early iterations multiply the
//! attractive term by an exaggeration factor to encourage cluster formation.

use ndarray::{Array2, ArrayView2, Axis};
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};

/// Computes the per-coordinate gradient of the KL objective.
///
/// For point `i` and coordinate `d`:
/// `4 * (exaggeration * Σ_j P[i][j]·Q[i][j]·Δ − Σ_j (Q[i][j]²/Z)·Δ)` where
/// `Δ = y[i][d] − y[j][d]`. The `j == i` term contributes nothing since the
/// displacement is zero there. Rows of the output are independent and
/// computed in parallel, with serial per-row accumulation.
///
/// # Arguments
/// * `joint` - High-dimensional joint distribution P
/// * `affinities` - Unnormalized low-dimensional affinities Q
/// * `normalization` - Z, the sum of all affinity entries
/// * `coordinates` - Current embedding positions
/// * `gradient` - Output, one row per point
/// * `exaggeration` - Attractive-term multiplier, 1 once exaggeration ends
pub(crate) fn kl_gradient(
    joint: ArrayView2<f32>,
    affinities: ArrayView2<f32>,
    normalization: f32,
    coordinates: ArrayView2<f32>,
    gradient: &mut Array2<f32>,
    exaggeration: f64,
) {
    let n = coordinates.nrows();
    let z = f64::from(normalization);

    gradient
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            for d in 0..row.len() {
                let mut attractive = 0.0_f64;
                let mut repulsive = 0.0_f64;
                for j in 0..n {
                    // The diagonal term is zero (no displacement); skipping
                    // it keeps the single-point case finite, where Z is zero
                    if j == i {
                        continue;
                    }
                    let displacement =
                        f64::from(coordinates[[i, d]]) - f64::from(coordinates[[j, d]]);
                    let p = f64::from(joint[[i, j]]);
                    let q = f64::from(affinities[[i, j]]);
                    attractive += p * q * displacement;
                    repulsive += q * q / z * displacement;
                }
                row[d] = (4.0 * (exaggeration * attractive - repulsive)) as f32;
            }
        });
}

/// Computes the Kullback-Leibler divergence KL(P‖Q/Z).
///
/// A read-only pass over both matrices, summing
/// `P[j][i] · ln(P[j][i] / (Q[j][i]/Z))` over all off-diagonal pairs. Used
/// for monitoring only; it never feeds back into the optimizer state.
///
/// # Arguments
/// * `joint` - High-dimensional joint distribution P
/// * `affinities` - Unnormalized low-dimensional affinities Q
/// * `normalization` - Z, the sum of all affinity entries
pub(crate) fn kl_divergence(
    joint: ArrayView2<f32>,
    affinities: ArrayView2<f32>,
    normalization: f32,
) -> f64 {
    let n = joint.nrows();
    let z = f64::from(normalization);
    let mut divergence = 0.0_f64;

    for j in 0..n {
        for i in 0..n {
            if i == j {
                continue;
            }
            let p = f64::from(joint[[j, i]]);
            // Zero-mass pairs contribute nothing in the limit
            if p <= 0.0 {
                continue;
            }
            let q = f64::from(affinities[[j, i]]);
            divergence += p * (p / (q / z)).ln();
        }
    }

    divergence
}
