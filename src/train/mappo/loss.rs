//! Loss functions for MAPPO
//!
//! The batched tensor losses used by the trainer need the `training` feature.
//! Scalar per-sample forms check them in tests.

#[cfg(feature = "training")]
use tch::{Device, Kind, Tensor};

/// Per-sample clipped surrogate objective, `min(r·A, clamp(r, 1±ε)·A)`
///
/// This is the quantity maximized; the loss is its negated mean.
#[cfg(test)]
fn clipped_surrogate(ratio: f64, advantage: f64, clip_range: f64) -> f64 {
    let clipped = ratio.clamp(1.0 - clip_range, 1.0 + clip_range);
    (ratio * advantage).min(clipped * advantage)
}

/// Per-sample critic error, optionally clipped around the old prediction
#[cfg(test)]
fn value_error(value: f64, old_value: f64, target: f64, clip_range_vf: Option<f64>) -> f64 {
    let unclipped = (value - target).powi(2);
    match clip_range_vf {
        Some(clip) => {
            let clipped = old_value + (value - old_value).clamp(-clip, clip);
            unclipped.max((clipped - target).powi(2))
        }
        None => unclipped,
    }
}

/// `1 - Var[returns - values] / Var[returns]`; zero-variance returns count as explained
pub fn explained_variance(values: &[f32], returns: &[f32]) -> f64 {
    let n = returns.len();
    if n == 0 || values.len() != n {
        return 0.0;
    }
    let variance = |xs: &mut dyn Iterator<Item = f64>| {
        let xs: Vec<f64> = xs.collect();
        let mean = xs.iter().sum::<f64>() / n as f64;
        xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64
    };
    let var_returns = variance(&mut returns.iter().map(|&r| r as f64));
    if var_returns == 0.0 {
        return 1.0;
    }
    let var_residual = variance(&mut returns.iter().zip(values).map(|(&r, &v)| (r - v) as f64));
    1.0 - var_residual / var_returns
}

/// Compute the clipped policy loss
///
/// Returns (policy_loss, clip_fraction, approx_kl)
#[cfg(feature = "training")]
pub fn compute_policy_loss(
    log_probs: &Tensor,
    old_log_probs: &Tensor,
    advantages: &Tensor,
    clip_range: f64,
) -> (Tensor, f64, f64) {
    let log_ratio = log_probs - old_log_probs;
    let ratio = log_ratio.exp();

    let clipped_ratio = ratio.clamp(1.0 - clip_range, 1.0 + clip_range);
    let surrogate_1 = advantages * &ratio;
    let surrogate_2 = advantages * clipped_ratio;
    let policy_loss = -surrogate_1.minimum(&surrogate_2).mean(Kind::Float);

    let clip_fraction = (&ratio - 1.0).abs().gt(clip_range).to_kind(Kind::Float).mean(Kind::Float);

    // Low-variance estimator, (r - 1) - log r
    let approx_kl = ((&ratio - 1.0) - &log_ratio).mean(Kind::Float);

    (
        policy_loss,
        f64::try_from(&clip_fraction).unwrap_or(0.0),
        f64::try_from(&approx_kl).unwrap_or(f64::NAN),
    )
}

/// Compute the critic loss with optional clipping
///
/// Returns (value_loss, explained_variance)
#[cfg(feature = "training")]
pub fn compute_value_loss(
    values: &Tensor,
    old_values: &Tensor,
    returns: &Tensor,
    clip_range_vf: Option<f64>,
) -> (Tensor, f64) {
    let error = (values - returns).square();
    let value_loss = match clip_range_vf {
        Some(clip) => {
            let values_clipped = old_values + (values - old_values).clamp(-clip, clip);
            let error_clipped = (values_clipped - returns).square();
            error.maximum(&error_clipped).mean(Kind::Float)
        }
        None => error.mean(Kind::Float),
    };

    let explained_var = explained_variance(&host_values(values), &host_values(returns));
    (value_loss, explained_var)
}

/// Flat CPU copy; empty when the tensor cannot be read
#[cfg(feature = "training")]
fn host_values(tensor: &Tensor) -> Vec<f32> {
    let flat = tensor.detach().to_device(Device::Cpu).to_kind(Kind::Float).reshape([-1]);
    Vec::<f32>::try_from(flat).unwrap_or_default()
}

/// Negative mean entropy, so minimizing it maximizes entropy
#[cfg(feature = "training")]
pub fn compute_entropy_loss(entropy: &Tensor) -> Tensor {
    -entropy.mean(Kind::Float)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surrogate_bounded_for_large_ratio() {
        let eps = 0.2;
        for ratio in [1.5, 3.0, 10.0, 1e6] {
            for advantage in [0.1, 1.0, 42.0] {
                let objective = clipped_surrogate(ratio, advantage, eps);
                assert!(objective <= (1.0 + eps) * advantage + 1e-9, "ratio {ratio} adv {advantage}");
            }
        }
    }

    #[test]
    fn test_surrogate_negative_advantage_keeps_pessimistic_term() {
        // Small ratio with A < 0 is clamped up to 1-ε, giving the lower value
        let objective = clipped_surrogate(0.1, -1.0, 0.2);
        assert!((objective - (-0.8)).abs() < 1e-12);
        // Large ratio with A < 0 is not clipped
        let objective = clipped_surrogate(3.0, -1.0, 0.2);
        assert!((objective - (-3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_surrogate_identity_inside_trust_region() {
        assert!((clipped_surrogate(1.1, 2.0, 0.2) - 2.2).abs() < 1e-12);
    }

    #[test]
    fn test_value_error_clipping() {
        assert!((value_error(3.0, 0.0, 1.0, None) - 4.0).abs() < 1e-12);
        // Clipped prediction 0.5 has error 0.25, unclipped has 4.0; the larger wins
        assert!((value_error(3.0, 0.0, 1.0, Some(0.5)) - 4.0).abs() < 1e-12);
        // Moving toward the target past the clip keeps the clipped penalty
        assert!((value_error(1.0, -2.0, 1.0, Some(0.5)) - 6.25).abs() < 1e-12);
    }

    #[test]
    fn test_explained_variance() {
        let returns = [1.0, 2.0, 3.0, 4.0];
        assert!((explained_variance(&returns, &returns) - 1.0).abs() < 1e-12);
        assert!(explained_variance(&[0.0; 4], &returns).abs() < 1e-12);
        assert_eq!(explained_variance(&[0.0; 3], &[5.0; 3]), 1.0);
    }

    #[cfg(feature = "training")]
    mod tensor {
        use tch::{Kind, Tensor};

        use super::super::*;

        #[test]
        fn test_policy_loss_bounded_for_large_ratio() {
            let eps = 0.2;
            let advantages = Tensor::from_slice(&[1.0f32, 2.0, 0.5]);
            let old_log_probs = Tensor::from_slice(&[0.0f32, 0.0, 0.0]);
            let log_probs = Tensor::from_slice(&[3.0f32, 5.0, 10.0]);

            let (loss, clip_fraction, _) = compute_policy_loss(&log_probs, &old_log_probs, &advantages, eps);
            let objective = -f64::try_from(&loss).unwrap();
            let bound = (1.0 + eps) * (1.0 + 2.0 + 0.5) / 3.0;
            assert!(objective <= bound + 1e-6, "objective {objective} exceeds {bound}");
            assert!((clip_fraction - 1.0).abs() < 1e-9);
        }

        #[test]
        fn test_policy_loss_matches_scalar_form() {
            let ratios = [0.5f64, 0.95, 1.0, 1.3];
            let advantages = [1.0f32, -0.5, 2.0, -1.5];
            let log_probs: Vec<f32> = ratios.iter().map(|r| r.ln() as f32).collect();

            let (loss, _, kl) = compute_policy_loss(
                &Tensor::from_slice(&log_probs),
                &Tensor::zeros([4], (Kind::Float, tch::Device::Cpu)),
                &Tensor::from_slice(&advantages),
                0.2,
            );
            let expected = -ratios.iter().zip(advantages).map(|(&r, a)| clipped_surrogate(r, a as f64, 0.2)).sum::<f64>() / 4.0;
            assert!((f64::try_from(&loss).unwrap() - expected).abs() < 1e-5);
            assert!(kl >= 0.0);
        }

        #[test]
        fn test_value_loss() {
            let values = Tensor::from_slice(&[1.0f32, 2.0, 3.0]);
            let returns = Tensor::from_slice(&[1.0f32, 2.0, 3.0]);
            let (loss, explained) = compute_value_loss(&values, &values, &returns, None);
            assert!(f64::try_from(&loss).unwrap().abs() < 1e-9);
            assert!((explained - 1.0).abs() < 1e-6);

            let old = Tensor::from_slice(&[0.0f32, 0.0, 0.0]);
            let far = Tensor::from_slice(&[5.0f32, 5.0, 5.0]);
            let (unclipped, _) = compute_value_loss(&far, &old, &returns, None);
            let (clipped, _) = compute_value_loss(&far, &old, &returns, Some(0.1));
            assert!(f64::try_from(&clipped).unwrap() >= f64::try_from(&unclipped).unwrap() - 1e-6);
        }

        #[test]
        fn test_value_loss_reports_scalar_explained_variance() {
            let values = [0.5f32, 1.5, 3.5, 3.0];
            let returns = [1.0f32, 2.0, 3.0, 4.0];
            let predicted = Tensor::from_slice(&values);
            let (_, explained) = compute_value_loss(&predicted, &predicted, &Tensor::from_slice(&returns), None);
            assert!((explained - explained_variance(&values, &returns)).abs() < 1e-9);
            assert!(explained < 1.0);
        }

        #[test]
        fn test_entropy_loss_sign() {
            let entropy = Tensor::from_slice(&[1.0f32, 2.0]);
            assert!((f64::try_from(compute_entropy_loss(&entropy)).unwrap() + 1.5).abs() < 1e-6);
        }
    }
}
