//! High-dimensional probability construction for the t-SNE optimizer.
//!
//! For every point, a Gaussian kernel bandwidth is searched so that the
//! conditional distribution over the other points reaches a target entropy
//! (the log of the configured perplexity). The calibrated conditional rows
//! are then symmetrized into a single joint distribution over point pairs,
//! which stays fixed for the rest of the optimization.
//!
//! Rows are calibrated independently and in parallel; symmetrization is one
//! serial pass over the upper triangle.

use crate::TsneError;
use ndarray::{Array2, ArrayView1, ArrayViewMut1, Zip};
use tracing::warn;

/// Bisection steps allowed per row before giving up on the bandwidth search.
const MAX_ITERATIONS: usize = 200;

/// Tolerance on the entropy gap `|H - ln(perplexity)|`.
const TOLERANCE: f64 = 1e-5;

/// Outcome of calibrating a single conditional probability row.
///
/// A row that exhausts its search budget is not an error: the row is replaced
/// with a uniform distribution and flagged here, with a sigma of zero.
#[derive(Clone, Copy, Debug)]
pub struct RowCalibration {
    /// Resolved Gaussian bandwidth, `sqrt(1 / (2 * beta))`; zero when the
    /// search did not converge
    pub sigma: f32,

    /// Whether the entropy target was reached within the iteration budget
    pub converged: bool,
}

/// Calibrates one conditional probability row to a fixed perplexity.
///
/// Searches for the kernel precision `beta = 1 / (2 * sigma^2)` such that the
/// Gibbs distribution `p(i) ∝ exp(-beta * distances[i])` over all entries but
/// `ignore` has entropy `ln(perplexity)`, bisecting on `beta` and doubling or
/// halving while only one side of the bracket is known. On convergence the
/// row is normalized in place; on exhaustion it is replaced with a uniform
/// distribution over the non-ignored entries.
///
/// # Arguments
/// * `distances` - Distances from the fixed point to every point
/// * `distribution` - Output row, written in place
/// * `perplexity` - Target effective neighbor count, `1 < perplexity`
/// * `ignore` - Index excluded from the distribution (the point itself);
///   passing a value past the end disables the exclusion
///
/// # Returns
/// The resolved bandwidth and whether the search converged
///
/// # Errors
/// * `TsneError::RowLengthMismatch` - Containers are empty or differ in length
pub fn calibrate_gaussian_row(
    distances: ArrayView1<f32>,
    mut distribution: ArrayViewMut1<f32>,
    perplexity: f64,
    ignore: usize,
) -> Result<RowCalibration, TsneError> {
    let size = distances.len();
    if size != distribution.len() || size == 0 {
        return Err(TsneError::RowLengthMismatch {
            distances: size,
            distribution: distribution.len(),
        });
    }

    let mut found = false;
    let mut beta = 1.0_f64;
    let mut sigma = (1.0 / (2.0 * beta)).sqrt();
    let mut min_beta = -f64::MAX;
    let mut max_beta = f64::MAX;

    let mut iterations = 0;
    // Seeded with the smallest positive double so the later divisions and
    // logarithm stay finite even if every kernel value underflows
    let mut row_sum = f64::MIN_POSITIVE;

    while !found && iterations < MAX_ITERATIONS {
        // Evaluate the Gaussian kernel row for the current precision
        row_sum = f64::MIN_POSITIVE;
        for (idx, (&distance, value)) in distances
            .iter()
            .zip(distribution.iter_mut())
            .enumerate()
        {
            if idx == ignore {
                *value = 0.0;
                continue;
            }
            let v = (-beta * f64::from(distance)).exp();
            *value = v as f32;
            row_sum += v;
        }
        sigma = (1.0 / (2.0 * beta)).sqrt();

        // Entropy of the unnormalized row: H = (beta * sum d*p) / sum + ln(sum)
        let mut entropy = 0.0_f64;
        for (idx, (&distance, &value)) in
            distances.iter().zip(distribution.iter()).enumerate()
        {
            if idx == ignore {
                continue;
            }
            entropy += beta * f64::from(distance) * f64::from(value);
        }
        entropy = entropy / row_sum + row_sum.ln();

        let gap = entropy - perplexity.ln();
        if gap < TOLERANCE && -gap < TOLERANCE {
            found = true;
        } else if gap > 0.0 {
            // Entropy too high: raise the precision
            min_beta = beta;
            if max_beta == f64::MAX || max_beta == -f64::MAX {
                beta *= 2.0;
            } else {
                beta = (beta + max_beta) / 2.0;
            }
        } else {
            // Entropy too low: lower the precision
            max_beta = beta;
            if min_beta == -f64::MAX || min_beta == f64::MAX {
                beta /= 2.0;
            } else {
                beta = (beta + min_beta) / 2.0;
            }
        }
        iterations += 1;
    }

    if !found {
        warn!("bandwidth search did not converge, substituting a uniform row");
        let denominator = if ignore < size { size - 1 } else { size };
        let v = (1.0 / denominator as f64) as f32;
        distribution.fill(v);
        return Ok(RowCalibration {
            sigma: 0.0,
            converged: false,
        });
    }

    for value in &mut distribution {
        *value = (f64::from(*value) / row_sum) as f32;
    }

    Ok(RowCalibration {
        sigma: sigma as f32,
        converged: true,
    })
}

/// Calibrates every conditional probability row of the dataset in parallel.
///
/// Each row of `conditional` is computed from the matching row of `distances`
/// with the point's own entry excluded; the diagonal is forced to zero
/// whether or not the row's search converged.
///
/// # Arguments
/// * `distances` - Dense pairwise distance matrix
/// * `conditional` - Output matrix, written row by row
/// * `perplexity` - Target effective neighbor count shared by all rows
///
/// # Returns
/// Per-row calibration outcomes, in point order
///
/// # Errors
/// * `TsneError::RowLengthMismatch` - Propagated from row calibration
pub(crate) fn conditional_distribution(
    distances: &Array2<f32>,
    conditional: &mut Array2<f32>,
    perplexity: f64,
) -> Result<Vec<RowCalibration>, TsneError> {
    let outcomes = Zip::indexed(conditional.rows_mut())
        .and(distances.rows())
        .par_map_collect(|j, mut row, distance_row| {
            let outcome = calibrate_gaussian_row(distance_row, row.view_mut(), perplexity, j);
            row[j] = 0.0;
            outcome
        });

    outcomes.into_iter().collect()
}

/// Symmetrizes conditional rows into the joint distribution, in place.
///
/// Each unordered pair is averaged and scaled so the whole matrix sums to
/// one: `P[j][i] = P[i][j] = (P[j][i] + P[i][j]) / (2n)`. The diagonal stays
/// zero. A single serial pass over the upper triangle; the cost is negligible
/// next to calibration.
pub(crate) fn joint_distribution(conditional: &mut Array2<f32>) {
    let n = conditional.nrows();
    for j in 0..n {
        for i in (j + 1)..n {
            let v = (f64::from(conditional[[j, i]]) + f64::from(conditional[[i, j]])) * 0.5
                / n as f64;
            conditional[[j, i]] = v as f32;
            conditional[[i, j]] = v as f32;
        }
    }
}
