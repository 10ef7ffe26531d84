//! Low-dimensional embedding storage and initialization.
//!
//! The [`Embedding`] container is created and owned by the caller; the
//! optimizer resizes it during initialization and writes updated coordinates
//! into it on every iteration. Coordinates are stored row-major, one row per
//! point.

use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut2};
use rand::rngs::SmallRng;
use rand::Rng;

/// Scale of the initial Gaussian cloud around the origin.
pub(crate) const INITIAL_SPREAD: f32 = 1e-4;

/// Caller-owned storage for low-dimensional point coordinates.
///
/// Starts empty; an optimizer session allocates it to `points × dimensions`
/// at initialization and fills it in place afterwards.
#[derive(Clone, Debug, Default)]
pub struct Embedding {
    coordinates: Array2<f32>,
}

impl Embedding {
    /// Creates an empty embedding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of embedded points.
    #[must_use]
    pub fn num_points(&self) -> usize {
        self.coordinates.nrows()
    }

    /// Number of coordinates per point.
    #[must_use]
    pub fn num_dimensions(&self) -> usize {
        self.coordinates.ncols()
    }

    /// Whether the embedding holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// All coordinates, one row per point.
    #[must_use]
    pub fn coordinates(&self) -> ArrayView2<f32> {
        self.coordinates.view()
    }

    /// The coordinates of a single point, if the index is in range.
    #[must_use]
    pub fn position(&self, index: usize) -> Option<ArrayView1<f32>> {
        (index < self.coordinates.nrows()).then(|| self.coordinates.row(index))
    }

    /// Drops all stored coordinates.
    pub fn clear(&mut self) {
        self.coordinates = Array2::zeros((0, 0));
    }

    /// Reallocates storage for `num_points` rows of `num_dimensions`, zeroed.
    pub(crate) fn resize(&mut self, num_points: usize, num_dimensions: usize) {
        self.coordinates = Array2::zeros((num_points, num_dimensions));
    }

    pub(crate) fn coordinates_mut(&mut self) -> ArrayViewMut2<f32> {
        self.coordinates.view_mut()
    }
}

/// Fills coordinates with a small isotropic Gaussian cloud around the origin.
///
/// Each scalar is drawn independently: a point is rejection-sampled from the
/// unit disk, pushed through the polar Box–Muller radial transform, and its
/// x component scaled by `multiplier`. Identical seeds produce identical
/// clouds.
///
/// # Arguments
/// * `coordinates` - Destination, written element by element
/// * `rng` - Session generator, already seeded
/// * `multiplier` - Scale applied to each drawn value
pub(crate) fn randomize_gaussian_disk(
    mut coordinates: ArrayViewMut2<f32>,
    rng: &mut SmallRng,
    multiplier: f32,
) {
    for value in coordinates.iter_mut() {
        let mut x: f64;
        let mut radius: f64;
        loop {
            x = 2.0 * rng.gen::<f64>() - 1.0;
            let y = 2.0 * rng.gen::<f64>() - 1.0;
            radius = x * x + y * y;
            if radius < 1.0 && radius != 0.0 {
                break;
            }
        }
        let radius = (-2.0 * radius.ln() / radius).sqrt();
        *value = (x * radius * f64::from(multiplier)) as f32;
    }
}
