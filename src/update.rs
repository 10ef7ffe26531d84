//! Momentum and adaptive-gain updates for the embedding.
//!
//! This module implements the gradient-descent step of the optimizer. Each
//! coordinate carries a gain that grows while its gradient keeps a stable
//! sign and shrinks when it oscillates, plus a momentum term accumulated
//! across iterations. The scheme adapts step sizes per coordinate without
//! any global line search.

use ndarray::{ArrayViewMut2, Zip};

/// Three-valued sign, zero for zero.
fn sign(x: f32) -> f32 {
    if x == 0.0 {
        0.0
    } else if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Applies one gain, momentum, and position update across all coordinates.
///
/// Per scalar coordinate:
/// - the gain grows by 0.2 when the gradient sign flipped since the previous
///   iteration, otherwise decays by the factor 0.8, floored at
///   `minimum_gain`;
/// - the gradient is rescaled through
///   `sign(g) * |g * eta * gain| / (eta * gain)`, which reduces to its
///   absolute value with the original sign but keeps the division by the
///   floored gain and the intermediate rounding intact;
/// - the momentum accumulator becomes
///   `momentum * previous - eta * gain * g`;
/// - the position advances by the accumulator scaled by `mult`.
///
/// Coordinates are independent, so the update runs as a parallel
/// element-wise pass.
///
/// # Arguments
/// * `coordinates` - Embedding positions, advanced in place
/// * `gradient` - Current gradient, consumed and rescaled in place
/// * `previous_gradient` - Momentum accumulator, updated in place
/// * `gain` - Per-coordinate gains, adapted in place
/// * `eta` - Learning rate
/// * `minimum_gain` - Floor applied after gain adaptation
/// * `momentum` - Momentum coefficient for this iteration
/// * `mult` - Extra scale applied to the position update only
#[allow(clippy::too_many_arguments)]
pub(crate) fn update_embedding(
    coordinates: ArrayViewMut2<f32>,
    gradient: ArrayViewMut2<f32>,
    previous_gradient: ArrayViewMut2<f32>,
    gain: ArrayViewMut2<f32>,
    eta: f32,
    minimum_gain: f32,
    momentum: f32,
    mult: f32,
) {
    Zip::from(coordinates)
        .and(gradient)
        .and(previous_gradient)
        .and(gain)
        .par_for_each(|position, gradient, previous, gain| {
            *gain = if sign(*gradient) == sign(*previous) {
                *gain * 0.8
            } else {
                *gain + 0.2
            };
            if *gain < minimum_gain {
                *gain = minimum_gain;
            }

            *gradient = (if *gradient > 0.0 { 1.0 } else { -1.0 })
                * (*gradient * eta * *gain).abs()
                / (eta * *gain);

            *previous = momentum * *previous - eta * *gain * *gradient;
            *position += *previous * mult;
        });
}
