use crate::{Embedding, InitParams, Tsne, TsneError};
use ndarray_rand::rand_distr::{Distribution, Normal};
use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Samples `per_blob` points around each center with isotropic Gaussian
/// noise.
fn gaussian_blobs(
    centers: &[Vec<f32>],
    per_blob: usize,
    std_dev: f32,
    seed: u64,
) -> Vec<Vec<f32>> {
    let normal = Normal::new(0.0_f32, std_dev).unwrap();
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut points = Vec::new();
    for center in centers {
        for _ in 0..per_blob {
            points.push(
                center
                    .iter()
                    .map(|&c| c + normal.sample(&mut rng))
                    .collect(),
            );
        }
    }
    points
}

fn register_all<'a>(tsne: &mut Tsne<'a>, data: &'a [Vec<f32>], dimensionality: usize) {
    tsne.set_dimensionality(dimensionality).unwrap();
    for point in data {
        tsne.add_data_point(point).unwrap();
    }
}

fn positions(tsne: &Tsne<'_>) -> Vec<Vec<f32>> {
    (0..tsne.len())
        .map(|handle| {
            tsne.embedding_position(handle as u32)
                .unwrap()
                .to_vec()
        })
        .collect()
}

#[test]
fn test_registry_guards() {
    let point = vec![1.0_f32, 2.0];
    let short = vec![1.0_f32];
    let mut tsne = Tsne::new();

    // Points cannot be added before the dimensionality is known
    assert!(matches!(
        tsne.add_data_point(&point),
        Err(TsneError::DimensionalityNotSet)
    ));

    // Zero dimensionality is rejected
    assert!(matches!(
        tsne.set_dimensionality(0),
        Err(TsneError::InvalidDimensionality)
    ));

    tsne.set_dimensionality(2).unwrap();
    assert_eq!(tsne.dimensionality(), 2);

    // Wrong descriptor length is rejected
    assert!(matches!(
        tsne.add_data_point(&short),
        Err(TsneError::DescriptorLengthMismatch { expected: 2, actual: 1 })
    ));

    let handle = tsne.add_data_point(&point).unwrap();
    assert_eq!(handle, 0);
    assert_eq!(tsne.len(), 1);
    assert_eq!(tsne.high_dimensional_descriptor(0).unwrap(), point.as_slice());
    assert!(matches!(
        tsne.high_dimensional_descriptor(1),
        Err(TsneError::HandleOutOfRange { handle: 1, size: 1 })
    ));

    // Dimensionality is locked once points exist
    assert!(matches!(
        tsne.set_dimensionality(3),
        Err(TsneError::DimensionalityLocked)
    ));
}

#[test]
fn test_iteration_requires_initialization() {
    let mut tsne = Tsne::new();
    assert!(matches!(tsne.iterate(), Err(TsneError::NotInitialized)));
    assert!(matches!(
        tsne.kl_divergence(),
        Err(TsneError::NotInitialized)
    ));
    assert!(matches!(
        tsne.embedding_position(0),
        Err(TsneError::NotInitialized)
    ));
}

#[test]
fn test_initialize_rejects_empty_registry() {
    let mut embedding = Embedding::new();
    let mut tsne = Tsne::new();
    tsne.set_dimensionality(4).unwrap();
    assert!(matches!(
        tsne.initialize(&mut embedding, InitParams::default()),
        Err(TsneError::EmptyDataset)
    ));
}

#[test]
fn test_lifecycle_scenario() {
    let data = gaussian_blobs(&[vec![0.0_f32; 10]], 3, 1.0, 11);
    let mut first = Embedding::new();
    let mut second = Embedding::new();
    let mut third = Embedding::new();
    let mut tsne = Tsne::new();
    register_all(&mut tsne, &data, 10);

    let params = InitParams::builder().seed(1).perplexity(2.0).build();
    tsne.initialize(&mut first, params.clone()).unwrap();
    tsne.iterate().unwrap();
    assert_eq!(tsne.iteration(), 1);

    // The registry is frozen while initialized
    assert!(matches!(
        tsne.add_data_point(&data[0]),
        Err(TsneError::AlreadyInitialized)
    ));
    assert!(matches!(
        tsne.set_dimensionality(10),
        Err(TsneError::AlreadyInitialized)
    ));

    // Reset keeps the points and allows a fresh session
    tsne.reset();
    assert_eq!(tsne.len(), 3);
    assert!(matches!(tsne.iterate(), Err(TsneError::NotInitialized)));
    tsne.initialize(&mut second, params).unwrap();
    tsne.iterate().unwrap();

    // Clear empties the registry; initialization must then fail
    tsne.clear();
    assert!(tsne.is_empty());
    assert!(matches!(
        tsne.initialize(&mut third, InitParams::default()),
        Err(TsneError::EmptyDataset)
    ));
}

#[test]
fn test_initialize_builds_consistent_state() {
    let data = gaussian_blobs(&[vec![0.0_f32; 6], vec![4.0_f32; 6]], 10, 0.5, 3);
    let mut embedding = Embedding::new();
    let mut tsne = Tsne::new();
    register_all(&mut tsne, &data, 6);

    let params = InitParams::builder().seed(5).perplexity(8.0).build();
    tsne.initialize(&mut embedding, params).unwrap();

    let n = tsne.len();
    let distances = tsne.distances();
    for j in 0..n {
        assert_eq!(distances[[j, j]], 0.0);
        for i in 0..n {
            assert!(distances[[j, i]] >= 0.0, "negative distance");
            assert_eq!(distances[[j, i]], distances[[i, j]]);
        }
    }

    // Joint distribution: symmetric, zero diagonal, unit total mass
    let joint = tsne.high_dimensional_distribution();
    let mut total = 0.0_f64;
    for j in 0..n {
        assert_eq!(joint[[j, j]], 0.0);
        for i in 0..n {
            assert_eq!(joint[[j, i]], joint[[i, j]]);
            total += f64::from(joint[[j, i]]);
        }
    }
    assert!((total - 1.0).abs() < 1e-4, "joint mass {total} should be 1");

    // Every row calibrated: positive sigma and a convergence flag
    assert_eq!(tsne.sigmas().len(), n);
    assert_eq!(tsne.calibration_converged().len(), n);
    for (sigma, &converged) in tsne.sigmas().iter().zip(tsne.calibration_converged()) {
        assert!(converged, "calibration should converge on this data");
        assert!(*sigma > 0.0, "converged sigma must be positive");
    }

    // Divergence is defined and non-negative right after initialization
    let divergence = tsne.kl_divergence().unwrap();
    assert!(divergence.is_finite());
    assert!(divergence >= 0.0, "divergence {divergence} must be non-negative");
}

#[test]
fn test_unreachable_perplexity_is_flagged_not_fatal() {
    let data = gaussian_blobs(&[vec![0.0_f32; 4]], 3, 1.0, 9);
    let mut embedding = Embedding::new();
    let mut tsne = Tsne::new();
    register_all(&mut tsne, &data, 4);

    // Perplexity above n-1 cannot be reached by any bandwidth
    let params = InitParams::builder().seed(2).perplexity(30.0).build();
    tsne.initialize(&mut embedding, params).unwrap();

    assert!(tsne.calibration_converged().iter().all(|&c| !c));
    assert!(tsne.sigmas().iter().all(|&sigma| sigma == 0.0));
    tsne.iterate().unwrap();
}

#[test]
fn test_iterations_move_the_embedding() {
    let data = gaussian_blobs(&[vec![0.0_f32; 4], vec![3.0_f32; 4]], 5, 0.5, 21);
    let mut embedding = Embedding::new();
    let mut tsne = Tsne::new();
    register_all(&mut tsne, &data, 4);

    let params = InitParams::builder().seed(13).perplexity(4.0).build();
    tsne.initialize(&mut embedding, params).unwrap();

    let initial = positions(&tsne);
    tsne.iterate().unwrap();
    let after_one = positions(&tsne);
    assert_ne!(initial, after_one, "iteration must move the points");

    tsne.iterate().unwrap();
    let after_two = positions(&tsne);
    assert_ne!(after_one, after_two, "iteration must keep moving the points");

    for row in &after_two {
        assert!(row.iter().all(|v| v.is_finite()), "coordinates must stay finite");
    }
}

#[test]
fn test_single_point_stays_put() {
    let data = vec![vec![1.0_f32, 2.0, 3.0]];
    let mut embedding = Embedding::new();
    let mut tsne = Tsne::new();
    register_all(&mut tsne, &data, 3);

    tsne.initialize(&mut embedding, InitParams::builder().seed(4).build())
        .unwrap();
    let initial = positions(&tsne);
    for _ in 0..5 {
        tsne.iterate().unwrap();
    }
    // The gradient of a lone point is exactly zero
    assert_eq!(initial, positions(&tsne));
}

#[test]
fn test_zero_scale_freezes_positions() {
    let data = gaussian_blobs(&[vec![0.0_f32; 4]], 6, 1.0, 17);
    let mut embedding = Embedding::new();
    let mut tsne = Tsne::new();
    register_all(&mut tsne, &data, 4);

    tsne.initialize(
        &mut embedding,
        InitParams::builder().seed(3).perplexity(3.0).build(),
    )
    .unwrap();

    let before = positions(&tsne);
    tsne.iterate_with_scale(0.0).unwrap();
    // Gain and momentum advanced, but the positions did not
    assert_eq!(before, positions(&tsne));
    assert_eq!(tsne.iteration(), 1);
}

#[test]
fn test_identical_seeds_reproduce_identical_runs() {
    let data = gaussian_blobs(&[vec![0.0_f32; 8], vec![5.0_f32; 8]], 10, 1.0, 29);

    let run = |data: &[Vec<f32>]| {
        let mut embedding = Embedding::new();
        let mut tsne = Tsne::new();
        register_all(&mut tsne, data, 8);
        let params = InitParams::builder().seed(99).perplexity(5.0).build();
        tsne.initialize(&mut embedding, params).unwrap();
        for _ in 0..20 {
            tsne.iterate().unwrap();
        }
        positions(&tsne)
    };

    assert_eq!(run(&data), run(&data), "same seed must give the same run");
}

#[test]
fn test_two_blobs_separate() {
    let dimensionality = 10;
    let per_blob = 50;
    let data = gaussian_blobs(
        &[vec![0.0_f32; 10], vec![10.0_f32; 10]],
        per_blob,
        1.0,
        41,
    );
    let mut embedding = Embedding::new();
    let mut tsne = Tsne::new();
    register_all(&mut tsne, &data, dimensionality);

    tsne.initialize(&mut embedding, InitParams::builder().seed(7).build())
        .unwrap();

    let mut divergence_after_exaggeration = f64::INFINITY;
    for iteration in 0..1000 {
        tsne.iterate().unwrap();
        if iteration == 300 {
            divergence_after_exaggeration = tsne.kl_divergence().unwrap();
        }
    }

    let final_divergence = tsne.kl_divergence().unwrap();
    assert!(final_divergence >= 0.0);
    assert!(
        final_divergence <= divergence_after_exaggeration,
        "divergence should not grow during late optimization: \
         {divergence_after_exaggeration} -> {final_divergence}"
    );

    // The two clusters must end up linearly separable: project every point
    // onto the line between the cluster centroids
    let embedded = positions(&tsne);
    let n = per_blob * 2;
    let dims = embedded[0].len();
    let centroid = |range: std::ops::Range<usize>| -> Vec<f32> {
        let mut center = vec![0.0_f32; dims];
        for row in &embedded[range.clone()] {
            for (c, v) in center.iter_mut().zip(row) {
                *c += v / per_blob as f32;
            }
        }
        center
    };
    let first = centroid(0..per_blob);
    let second = centroid(per_blob..n);
    let axis: Vec<f32> = first.iter().zip(&second).map(|(a, b)| b - a).collect();
    let midpoint: Vec<f32> = first
        .iter()
        .zip(&second)
        .map(|(a, b)| (a + b) / 2.0)
        .collect();

    let side = |row: &[f32]| -> f32 {
        row.iter()
            .zip(&axis)
            .zip(&midpoint)
            .map(|((v, a), m)| (v - m) * a)
            .sum()
    };
    assert!(
        embedded[..per_blob].iter().all(|row| side(row) < 0.0)
            && embedded[per_blob..].iter().all(|row| side(row) > 0.0),
        "clusters should be separable by a linear threshold"
    );
}
