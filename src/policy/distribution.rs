//! Action distribution math
//!
//! Continuous axes are independent Gaussians with a state-independent
//! standard deviation; triggers are independent Bernoullis parameterized by
//! logits. The joint log-probability is the sum over all components.

use rand::Rng;
use rand_distr::{Bernoulli, Distribution, StandardNormal};

/// `0.5 * ln(2π)`
const HALF_LN_2PI: f32 = 0.918_938_5;

/// Draw from a standard normal
pub fn sample_standard_normal<R: Rng>(rng: &mut R) -> f32 {
    rng.sample(StandardNormal)
}

/// Whether a trigger with this logit fires; a NaN logit never fires
pub fn sample_trigger<R: Rng>(rng: &mut R, logit: f32) -> bool {
    Bernoulli::new(f64::from(crate::inference::sigmoid(logit))).is_ok_and(|d| d.sample(rng))
}

/// Log density of `x` under `N(mean, exp(log_std)^2)`
pub fn gaussian_log_prob(x: f32, mean: f32, log_std: f32) -> f32 {
    let std = log_std.exp();
    let z = (x - mean) / std;
    -0.5 * z * z - log_std - HALF_LN_2PI
}

/// Differential entropy of `N(·, exp(log_std)^2)`
pub fn gaussian_entropy(log_std: f32) -> f32 {
    0.5 + HALF_LN_2PI + log_std
}

/// `ln(1 + e^x)` without overflow
pub fn softplus(x: f32) -> f32 {
    if x > 20.0 {
        x
    } else if x < -20.0 {
        x.exp()
    } else {
        x.exp().ln_1p()
    }
}

/// Log probability of a Bernoulli outcome given its logit
pub fn bernoulli_log_prob(fired: bool, logit: f32) -> f32 {
    if fired {
        -softplus(-logit)
    } else {
        -softplus(logit)
    }
}

/// Entropy of a Bernoulli given its logit
pub fn bernoulli_entropy(logit: f32) -> f32 {
    let p = crate::inference::sigmoid(logit);
    -(p * bernoulli_log_prob(true, logit) + (1.0 - p) * bernoulli_log_prob(false, logit))
}
