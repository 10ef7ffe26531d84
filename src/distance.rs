//! Distance kernels for the t-SNE optimizer.
//!
//! This module provides efficient implementations of the Euclidean distance
//! metrics used by the optimizer, built on SIMD instructions where possible.
//! It includes functions for:
//!
//! - Computing Euclidean distances between vectors using SIMD
//! - Building the dense pairwise distance matrix over all registered points
//! - Handling both contiguous and non-contiguous array views

use ndarray::{Array2, ArrayView1, Zip};
use tracing::warn;
use wide::f32x8;

/// Computes the squared Euclidean distance between vectors using SIMD
/// operations.
///
/// Processes vectors in chunks of 8 elements using SIMD instructions for
/// improved performance. Handles remaining elements sequentially.
///
/// # Arguments
/// * `a` - First vector
/// * `b` - Second vector
///
/// # Panics
/// * If vectors have different lengths (debug builds only)
pub fn simd_squared_euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have the same length");

    let a_chunks = a.chunks_exact(8);
    let a_remainder = a_chunks.remainder();

    let b_chunks = b.chunks_exact(8);
    let b_remainder = b_chunks.remainder();

    // Process 8 elements at a time using SIMD
    let mut sum_sq = f32x8::splat(0.0);
    for (a_chunk, b_chunk) in a_chunks.zip(b_chunks) {
        let diff = f32x8::from(a_chunk) - f32x8::from(b_chunk);
        sum_sq += diff * diff;
    }

    let mut total_sum_sq: f32 = sum_sq.as_array_ref().iter().sum();

    // Handle remaining elements sequentially
    for (a, b) in a_remainder.iter().zip(b_remainder) {
        let diff = a - b;
        total_sum_sq += diff * diff;
    }

    total_sum_sq
}

/// Computes the Euclidean distance between vectors using SIMD operations.
///
/// # Arguments
/// * `a` - First vector
/// * `b` - Second vector
pub fn simd_euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    simd_squared_euclidean_distance(a, b).sqrt()
}

/// Computes the squared Euclidean distance between array views with an
/// optimized path for contiguous data.
///
/// Attempts to use SIMD operations on contiguous memory first, falling back
/// to slower methods for non-contiguous data with appropriate warnings.
///
/// # Arguments
/// * `a` - First vector as array view
/// * `b` - Second vector as array view
///
/// # Returns
/// Squared Euclidean distance between the vectors
pub fn array_squared_euclidean_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let a_slice = a.as_slice();
    let b_slice = b.as_slice();

    match (a_slice, b_slice) {
        (Some(a), Some(b)) => simd_squared_euclidean_distance(a, b),
        (Some(a), None) => {
            warn!("b is non-contiguous, requiring allocation to compute distance");
            simd_squared_euclidean_distance(a, &b.to_vec())
        }
        (None, Some(b)) => {
            warn!("a is non-contiguous, requiring allocation to compute distance");
            simd_squared_euclidean_distance(&a.to_vec(), b)
        }
        (None, None) => {
            warn!("both a and b are non-contiguous, requiring allocation to compute distance");
            simd_squared_euclidean_distance(&a.to_vec(), &b.to_vec())
        }
    }
}

/// Builds the dense pairwise distance matrix over the registered points.
///
/// Rows are computed independently in parallel; each row task writes only its
/// own matrix row, so the result is symmetric by construction with a zero
/// diagonal. Entries hold plain (not squared) Euclidean distances; the
/// calibration kernel applies `exp(-beta * d)` to these values directly.
///
/// # Arguments
/// * `points` - High-dimensional descriptors, one per point
///
/// # Returns
/// An n × n matrix of pairwise distances
pub(crate) fn pairwise_distance_matrix(points: &[&[f32]]) -> Array2<f32> {
    let n = points.len();
    let mut distances = Array2::zeros((n, n));

    Zip::indexed(distances.rows_mut()).par_for_each(|j, mut row| {
        for i in 0..n {
            if i != j {
                row[i] = simd_euclidean_distance(points[j], points[i]);
            }
        }
    });

    distances
}
