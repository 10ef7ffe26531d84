//! Student-t affinities between embedded points.
//!
//! Every iteration recomputes the unnormalized heavy-tailed similarity
//! `Q[j][i] = 1 / (1 + ||y_j - y_i||^2)` between all pairs of current
//! embedding positions, together with the global normalization constant Z
//! (the sum over the whole matrix).

use crate::distance::array_squared_euclidean_distance;
use ndarray::{Array2, ArrayView2, Zip};

/// Recomputes the dense Student-t affinity matrix from the current embedding.
///
/// Rows are computed independently in parallel, each task writing only its
/// own row, so the matrix is symmetric by construction with a zero diagonal.
/// The normalization constant is accumulated serially after the parallel
/// phase so that identical inputs always reduce in the same order.
///
/// # Arguments
/// * `coordinates` - Current embedding positions, one row per point
/// * `affinities` - Output matrix, overwritten in full
///
/// # Returns
/// The normalization constant Z, the sum of every matrix entry
pub(crate) fn student_t_affinities(
    coordinates: ArrayView2<f32>,
    affinities: &mut Array2<f32>,
) -> f32 {
    let n = coordinates.nrows();

    Zip::indexed(affinities.rows_mut()).par_for_each(|j, mut row| {
        let position = coordinates.row(j);
        for i in 0..n {
            row[i] = if i == j {
                0.0
            } else {
                let squared_distance =
                    array_squared_euclidean_distance(position, coordinates.row(i));
                (1.0 / (1.0 + f64::from(squared_distance))) as f32
            };
        }
    });

    let normalization: f64 = affinities.iter().map(|&v| f64::from(v)).sum();
    normalization as f32
}
