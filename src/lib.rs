#![allow(clippy::multiple_crate_versions)]

//! # Exact t-SNE: t-distributed Stochastic Neighbor Embedding
//!
//! This crate provides a Rust implementation of exact t-SNE, a
//! dimensionality reduction technique that embeds high-dimensional data into
//! a low-dimensional (typically 2-D) space while preserving pairwise
//! similarity structure.
//!
//! The optimizer minimizes the Kullback-Leibler divergence between two
//! distributions over point pairs: a Gaussian-kernel joint distribution P in
//! the high-dimensional space, calibrated per point to a target perplexity,
//! and a Student-t affinity distribution Q over the evolving embedding.
//! Gradient descent uses per-coordinate adaptive gains, time-varying
//! momentum, and early exaggeration of attractive forces.
//!
//! This is the textbook all-pairs formulation: every matrix is dense and
//! `n × n`, which keeps the algorithm exact and the code small at the cost
//! of quadratic memory and time. It is intended for small datasets; there is
//! no Barnes-Hut or other approximate variant here.
//!
//! ## Key Features
//!
//! - Perplexity-calibrated probability construction via per-point bisection
//! - Student-t low-dimensional affinities with an analytic KL gradient
//! - Adaptive per-coordinate gains with sign-based adaptation and momentum
//! - Seedable, reproducible embedding initialization
//! - Row-level data parallelism via rayon for the quadratic phases
//!
//! ## Examples
//!
//! ```rust
//! use tsne::{Embedding, InitParams, Tsne};
//!
//! let data: Vec<Vec<f32>> = (0..12)
//!     .map(|i| vec![i as f32, (i % 3) as f32, 0.5])
//!     .collect();
//!
//! let mut embedding = Embedding::new();
//! let mut tsne = Tsne::new();
//! tsne.set_dimensionality(3)?;
//! for point in &data {
//!     tsne.add_data_point(point)?;
//! }
//!
//! let params = InitParams::builder().perplexity(4.0).seed(17).build();
//! tsne.initialize(&mut embedding, params)?;
//! for _ in 0..50 {
//!     tsne.iterate()?;
//! }
//! let divergence = tsne.kl_divergence()?;
//! assert!(divergence >= 0.0);
//! # Ok::<(), tsne::TsneError>(())
//! ```
//!
//! ## Configuration
//!
//! [`InitParams`] captures the optimization schedule at initialization time:
//! - `perplexity`: target effective neighbor count (default: 30)
//! - `seed`: random seed for the initial cloud; `None` draws one from the
//!   system (non-deterministic runs)
//! - `embedding_dimensions`: output dimensionality (default: 2)
//! - `eta`: learning rate (default: 200)
//! - `minimum_gain`: floor for the adaptive gains (default: 0.1)
//! - `momentum` / `final_momentum`: momentum before and after
//!   `momentum_switch_iteration` (defaults: 0.5, 0.8, 250)
//! - `exaggeration_factor`: attractive-force multiplier applied until
//!   `remove_exaggeration_iteration` (defaults: 4, 250)
//!
//! ## Implementation Notes
//!
//! - High-dimensional data is borrowed, not copied; the session stores
//!   references to caller-owned descriptors
//! - The embedding lives in a caller-supplied [`Embedding`] and is written
//!   in place
//! - Distance, calibration, affinity, and gradient rows are computed in
//!   parallel via rayon; reductions stay serial so runs with the same seed
//!   are reproducible
//! - High-dimensional distances are stored plain (not squared) and fed
//!   directly to the Gaussian kernel
//!
//! ## References
//!
//! [Visualizing Data using t-SNE](https://jmlr.org/papers/v9/vandermaaten08a.html).
//! van der Maaten, L., & Hinton, G. (2008).
//! Journal of Machine Learning Research, 9(86), 2579-2605.

// Submodule imports
mod affinity;
pub mod distance;
mod embedding;
mod gradient;
pub mod probability;
mod update;

#[cfg(test)]
mod tests;

use bon::Builder;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::debug;

pub use embedding::Embedding;
pub use probability::RowCalibration;

/// Stable handle assigned to a registered data point, equal to its insertion
/// index.
pub type DataHandle = u32;

/// Parameters captured at initialization time, fixed for the session.
///
/// Controls perplexity calibration, the embedding shape, and the gradient
/// descent schedule.
#[derive(Builder, Clone, Debug)]
pub struct InitParams {
    /// Target effective number of neighbors per point
    #[builder(default = 30.0)]
    pub perplexity: f64,

    /// Seed for the embedding initialization; `None` draws entropy from the
    /// system, making runs non-deterministic
    pub seed: Option<u64>,

    /// Number of dimensions in the output embedding space, typically 2 or 3
    #[builder(default = 2)]
    pub embedding_dimensions: usize,

    /// Floor applied to the per-coordinate adaptive gains
    #[builder(default = 0.1)]
    pub minimum_gain: f32,

    /// Learning rate
    #[builder(default = 200.0)]
    pub eta: f32,

    /// Momentum coefficient for the early iterations
    #[builder(default = 0.5)]
    pub momentum: f32,

    /// Momentum coefficient after the switch iteration
    #[builder(default = 0.8)]
    pub final_momentum: f32,

    /// Iteration at which momentum switches to its final value
    #[builder(default = 250)]
    pub momentum_switch_iteration: usize,

    /// Multiplier on attractive forces during the early iterations
    #[builder(default = 4.0)]
    pub exaggeration_factor: f32,

    /// Iteration at which the exaggeration factor drops back to one
    #[builder(default = 250)]
    pub remove_exaggeration_iteration: usize,
}

impl Default for InitParams {
    fn default() -> Self {
        Self {
            perplexity: 30.0,
            seed: None,
            embedding_dimensions: 2,
            minimum_gain: 0.1,
            eta: 200.0,
            momentum: 0.5,
            final_momentum: 0.8,
            momentum_switch_iteration: 250,
            exaggeration_factor: 4.0,
            remove_exaggeration_iteration: 250,
        }
    }
}

/// Errors reported by the optimizer.
///
/// Every variant is either a lifecycle violation (an operation attempted
/// outside its legal session state) or an invalid argument; all are detected
/// synchronously and nothing is retried internally. A calibration row that
/// fails to converge is deliberately not an error — see
/// [`Tsne::calibration_converged`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TsneError {
    /// Registry mutation attempted while a session is initialized
    #[error("the session must be uninitialized to modify its data points")]
    AlreadyInitialized,

    /// Dimensionality change attempted after points were registered
    #[error("dimensionality cannot change once data points are registered")]
    DimensionalityLocked,

    /// Dimensionality of zero
    #[error("dimensionality must be positive")]
    InvalidDimensionality,

    /// Data point added before the dimensionality was set
    #[error("dimensionality must be set before adding data points")]
    DimensionalityNotSet,

    /// Data point length does not match the registry dimensionality
    #[error("data point has {actual} values but the dimensionality is {expected}")]
    DescriptorLengthMismatch {
        /// Registered dimensionality
        expected: usize,
        /// Length of the rejected descriptor
        actual: usize,
    },

    /// Handle does not refer to a registered point
    #[error("handle {handle} is out of range for {size} registered points")]
    HandleOutOfRange {
        /// The rejected handle
        handle: DataHandle,
        /// Number of registered points
        size: usize,
    },

    /// Initialization attempted with no registered points
    #[error("cannot initialize an empty dataset")]
    EmptyDataset,

    /// Iteration or divergence query before initialization
    #[error("the session must be initialized first")]
    NotInitialized,

    /// Probability-construction containers are empty or differ in length
    #[error(
        "distance and distribution rows must be non-empty and equal in length, \
         got {distances} and {distribution}"
    )]
    RowLengthMismatch {
        /// Length of the distance row
        distances: usize,
        /// Length of the distribution row
        distribution: usize,
    },
}

/// An exact t-SNE optimizer session.
///
/// The session borrows its inputs: high-dimensional descriptors are
/// registered as slices owned by the caller, and the embedding is written
/// into a caller-supplied [`Embedding`]. A session moves between two states:
/// uninitialized, where points can be registered, and initialized, where
/// iterations advance the embedding. [`reset`](Self::reset) returns to the
/// uninitialized state keeping registered points;
/// [`clear`](Self::clear) also empties the registry.
pub struct Tsne<'a> {
    dimensionality: usize,
    data: Vec<&'a [f32]>,
    embedding: Option<&'a mut Embedding>,
    initialized: bool,
    iteration: usize,
    params: InitParams,

    /// Dense pairwise high-dimensional distances, fixed after initialization
    distances: Array2<f32>,
    /// Joint distribution P, fixed after initialization
    joint: Array2<f32>,
    /// Student-t affinities Q, recomputed every iteration
    affinities: Array2<f32>,
    /// Sum of all affinity entries (Z)
    normalization: f32,
    /// Per-point calibrated bandwidths; zero marks a failed calibration
    sigmas: Array1<f32>,
    /// Per-point calibration convergence flags
    converged: Vec<bool>,

    gradient: Array2<f32>,
    previous_gradient: Array2<f32>,
    gain: Array2<f32>,
}

impl Default for Tsne<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Tsne<'a> {
    /// Creates an empty, uninitialized session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dimensionality: 0,
            data: Vec::new(),
            embedding: None,
            initialized: false,
            iteration: 0,
            params: InitParams::default(),
            distances: Array2::zeros((0, 0)),
            joint: Array2::zeros((0, 0)),
            affinities: Array2::zeros((0, 0)),
            normalization: 0.0,
            sigmas: Array1::zeros(0),
            converged: Vec::new(),
            gradient: Array2::zeros((0, 0)),
            previous_gradient: Array2::zeros((0, 0)),
            gain: Array2::zeros((0, 0)),
        }
    }

    /// Sets the dimensionality of the high-dimensional data.
    ///
    /// Must be called once, before any point is registered; the value is
    /// fixed for the life of the registry.
    ///
    /// # Errors
    /// * `TsneError::AlreadyInitialized` - The session is initialized
    /// * `TsneError::DimensionalityLocked` - Points are already registered
    /// * `TsneError::InvalidDimensionality` - `dimensionality` is zero
    pub fn set_dimensionality(&mut self, dimensionality: usize) -> Result<(), TsneError> {
        if self.initialized {
            return Err(TsneError::AlreadyInitialized);
        }
        if !self.data.is_empty() {
            return Err(TsneError::DimensionalityLocked);
        }
        if dimensionality == 0 {
            return Err(TsneError::InvalidDimensionality);
        }
        self.dimensionality = dimensionality;
        Ok(())
    }

    /// Dimensionality of the high-dimensional data, zero while unset.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.dimensionality
    }

    /// Registers a high-dimensional data point and returns its handle.
    ///
    /// The slice is borrowed, not copied; it must outlive the session.
    ///
    /// # Errors
    /// * `TsneError::AlreadyInitialized` - The session is initialized
    /// * `TsneError::DimensionalityNotSet` - No dimensionality configured yet
    /// * `TsneError::DescriptorLengthMismatch` - Wrong descriptor length
    pub fn add_data_point(&mut self, point: &'a [f32]) -> Result<DataHandle, TsneError> {
        if self.initialized {
            return Err(TsneError::AlreadyInitialized);
        }
        if self.dimensionality == 0 {
            return Err(TsneError::DimensionalityNotSet);
        }
        if point.len() != self.dimensionality {
            return Err(TsneError::DescriptorLengthMismatch {
                expected: self.dimensionality,
                actual: point.len(),
            });
        }
        self.data.push(point);
        Ok((self.data.len() - 1) as DataHandle)
    }

    /// Number of registered data points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether no data points are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The high-dimensional descriptor registered under `handle`.
    ///
    /// # Errors
    /// * `TsneError::HandleOutOfRange` - No point registered under `handle`
    pub fn high_dimensional_descriptor(
        &self,
        handle: DataHandle,
    ) -> Result<&'a [f32], TsneError> {
        self.data
            .get(handle as usize)
            .copied()
            .ok_or(TsneError::HandleOutOfRange {
                handle,
                size: self.data.len(),
            })
    }

    /// The current embedding position of the point behind `handle`.
    ///
    /// # Errors
    /// * `TsneError::NotInitialized` - The session is not initialized
    /// * `TsneError::HandleOutOfRange` - No point registered under `handle`
    pub fn embedding_position(
        &self,
        handle: DataHandle,
    ) -> Result<ArrayView1<f32>, TsneError> {
        if !self.initialized {
            return Err(TsneError::NotInitialized);
        }
        self.embedding
            .as_deref()
            .and_then(|embedding| embedding.position(handle as usize))
            .ok_or(TsneError::HandleOutOfRange {
                handle,
                size: self.data.len(),
            })
    }

    /// Prepares the session for iteration.
    ///
    /// Allocates every per-session array, computes the pairwise distance
    /// matrix, calibrates the conditional distributions to the configured
    /// perplexity, symmetrizes them into the joint distribution, and
    /// randomizes the embedding. May be called again on an initialized
    /// session to rebuild everything with new parameters.
    ///
    /// # Arguments
    /// * `embedding` - Caller-owned coordinate storage, resized and filled
    ///   in place
    /// * `params` - Configuration snapshot for the session
    ///
    /// # Errors
    /// * `TsneError::EmptyDataset` - No points are registered
    pub fn initialize(
        &mut self,
        embedding: &'a mut Embedding,
        params: InitParams,
    ) -> Result<(), TsneError> {
        debug!("initializing t-SNE");
        let n = self.data.len();
        if n == 0 {
            return Err(TsneError::EmptyDataset);
        }

        embedding.resize(n, params.embedding_dimensions);
        self.joint = Array2::zeros((n, n));
        self.affinities = Array2::zeros((n, n));
        self.normalization = 0.0;
        self.gradient = Array2::zeros((n, params.embedding_dimensions));
        self.previous_gradient = Array2::zeros((n, params.embedding_dimensions));
        self.gain = Array2::from_elem((n, params.embedding_dimensions), 1.0);

        debug!("computing high-dimensional distances");
        self.distances = distance::pairwise_distance_matrix(&self.data);

        debug!("calibrating gaussian distributions");
        let outcomes = probability::conditional_distribution(
            &self.distances,
            &mut self.joint,
            params.perplexity,
        )?;
        self.sigmas = outcomes.iter().map(|outcome| outcome.sigma).collect();
        self.converged = outcomes.iter().map(|outcome| outcome.converged).collect();

        debug!("computing the joint probability distribution");
        probability::joint_distribution(&mut self.joint);

        debug!("initializing the embedding");
        let mut rng = match params.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        embedding::randomize_gaussian_disk(
            embedding.coordinates_mut(),
            &mut rng,
            embedding::INITIAL_SPREAD,
        );

        // Affinities of the freshly randomized cloud, so divergence queries
        // are meaningful before the first iteration
        self.normalization =
            affinity::student_t_affinities(embedding.coordinates(), &mut self.affinities);

        self.embedding = Some(embedding);
        self.params = params;
        self.iteration = 0;
        self.initialized = true;
        debug!("initialization complete");
        Ok(())
    }

    /// Performs one gradient descent iteration.
    ///
    /// Equivalent to [`iterate_with_scale`](Self::iterate_with_scale) with a
    /// scale of one.
    ///
    /// # Errors
    /// * `TsneError::NotInitialized` - The session is not initialized
    pub fn iterate(&mut self) -> Result<(), TsneError> {
        self.iterate_with_scale(1.0)
    }

    /// Performs one gradient descent iteration with a scaled position update.
    ///
    /// Recomputes the Student-t affinities and their normalization, evaluates
    /// the KL gradient under the current exaggeration factor, and applies the
    /// gain/momentum update. `mult` scales the position update only; gain and
    /// momentum state advance as if the scale were one.
    ///
    /// # Errors
    /// * `TsneError::NotInitialized` - The session is not initialized
    pub fn iterate_with_scale(&mut self, mult: f32) -> Result<(), TsneError> {
        let Some(embedding) = self.embedding.as_deref_mut() else {
            return Err(TsneError::NotInitialized);
        };

        if self.iteration == self.params.momentum_switch_iteration {
            debug!("switching to final momentum");
        }
        if self.iteration == self.params.remove_exaggeration_iteration {
            debug!("removing early exaggeration");
        }

        self.normalization =
            affinity::student_t_affinities(embedding.coordinates(), &mut self.affinities);

        let exaggeration = if self.iteration < self.params.remove_exaggeration_iteration {
            f64::from(self.params.exaggeration_factor)
        } else {
            1.0
        };
        gradient::kl_gradient(
            self.joint.view(),
            self.affinities.view(),
            self.normalization,
            embedding.coordinates(),
            &mut self.gradient,
            exaggeration,
        );

        let momentum = if self.iteration < self.params.momentum_switch_iteration {
            self.params.momentum
        } else {
            self.params.final_momentum
        };
        update::update_embedding(
            embedding.coordinates_mut(),
            self.gradient.view_mut(),
            self.previous_gradient.view_mut(),
            self.gain.view_mut(),
            self.params.eta,
            self.params.minimum_gain,
            momentum,
            mult,
        );

        self.iteration += 1;
        Ok(())
    }

    /// Computes the Kullback-Leibler divergence between P and the normalized
    /// affinities of the current embedding.
    ///
    /// Read-only; useful for monitoring convergence.
    ///
    /// # Errors
    /// * `TsneError::NotInitialized` - The session is not initialized
    pub fn kl_divergence(&self) -> Result<f64, TsneError> {
        if !self.initialized {
            return Err(TsneError::NotInitialized);
        }
        Ok(gradient::kl_divergence(
            self.joint.view(),
            self.affinities.view(),
            self.normalization,
        ))
    }

    /// Returns the session to the uninitialized state, keeping registered
    /// points.
    ///
    /// Releases the stored embedding reference; a subsequent `initialize`
    /// call supplies new parameters and fresh coordinate storage.
    pub fn reset(&mut self) {
        self.embedding = None;
        self.initialized = false;
    }

    /// Empties the registry and returns to the uninitialized state.
    ///
    /// The caller's embedding storage is cleared before its borrow is
    /// released. The configured dimensionality is kept.
    pub fn clear(&mut self) {
        if let Some(embedding) = self.embedding.take() {
            embedding.clear();
        }
        self.data.clear();
        self.initialized = false;
    }

    /// Number of completed iterations since initialization.
    #[must_use]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Dense pairwise high-dimensional distance matrix; empty before
    /// initialization.
    #[must_use]
    pub fn distances(&self) -> ArrayView2<f32> {
        self.distances.view()
    }

    /// Joint distribution P over point pairs; empty before initialization.
    #[must_use]
    pub fn high_dimensional_distribution(&self) -> ArrayView2<f32> {
        self.joint.view()
    }

    /// Unnormalized Student-t affinities Q for the current embedding; empty
    /// before initialization.
    #[must_use]
    pub fn low_dimensional_distribution(&self) -> ArrayView2<f32> {
        self.affinities.view()
    }

    /// Normalization constant Z of the affinities, zero before
    /// initialization.
    #[must_use]
    pub fn normalization(&self) -> f32 {
        self.normalization
    }

    /// Calibrated Gaussian bandwidths, one per point; a zero marks a row
    /// whose calibration did not converge.
    #[must_use]
    pub fn sigmas(&self) -> ArrayView1<f32> {
        self.sigmas.view()
    }

    /// Per-point convergence flags from perplexity calibration.
    ///
    /// A `false` entry means the bandwidth search for that point exhausted
    /// its budget and the conditional row fell back to a uniform
    /// distribution.
    #[must_use]
    pub fn calibration_converged(&self) -> &[bool] {
        &self.converged
    }
}
