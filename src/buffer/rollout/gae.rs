//! Advantages and returns for one drone's trajectory
//!
//! Each drone's transitions are walked backwards on their own; a trajectory
//! cut mid-episode is bootstrapped from the critic's estimate of the state
//! after its last step.

/// Compute GAE for a single agent trajectory
///
/// # Mathematical Formula
/// ```text
/// δ_t = r_t + γ * V_{t+1} * (1 - done_t) - V_t
/// A_t = δ_t + γ * λ * (1 - done_t) * A_{t+1}
/// ```
///
/// `V_T` is `last_value`, the bootstrap for a trajectory cut before its
/// episode ended. Returns are `A_t + V_t`.
#[allow(clippy::too_many_arguments)]
pub fn compute_gae_single_trajectory(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    last_value: f32,
    gamma: f32,
    gae_lambda: f32,
    advantages: &mut [f32],
    returns: &mut [f32],
) {
    let num_steps = rewards.len();
    debug_assert_eq!(values.len(), num_steps);
    debug_assert_eq!(dones.len(), num_steps);
    debug_assert_eq!(advantages.len(), num_steps);
    debug_assert_eq!(returns.len(), num_steps);

    let mut gae = 0.0;
    let mut next_value = last_value;

    for t in (0..num_steps).rev() {
        let not_done = if dones[t] { 0.0 } else { 1.0 };

        let delta = rewards[t] + gamma * next_value * not_done - values[t];
        gae = delta + gamma * gae_lambda * not_done * gae;

        advantages[t] = gae;
        returns[t] = values[t] + gae;
        next_value = values[t];
    }
}

/// Normalize advantages to zero mean and unit variance
///
/// A batch with (near) zero spread is only centered.
pub fn normalize_advantages(advantages: &mut [f32]) {
    if advantages.is_empty() {
        return;
    }
    let n = advantages.len() as f32;
    let mean: f32 = advantages.iter().sum::<f32>() / n;
    let variance: f32 = advantages.iter().map(|&x| (x - mean).powi(2)).sum::<f32>() / n;
    let std = variance.sqrt().max(1e-8);

    for a in advantages.iter_mut() {
        *a = (*a - mean) / std;
    }
}
