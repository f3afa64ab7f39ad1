//! Deployable actor and critic models
//!
//! These run the forward pass in pure Rust on exported weights, so rollouts,
//! matches and evaluation work without libtorch.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::distribution::{
    bernoulli_entropy, bernoulli_log_prob, gaussian_entropy, gaussian_log_prob, sample_standard_normal, sample_trigger,
};
use crate::{
    codec::{ACTION_DIM, CONTINUOUS_DIM, TRIGGER_DIM, action::TRIGGER_THRESHOLD},
    inference::{sigmoid, Activation, LayerWeights, MlpWeights},
};

/// Initial log standard deviation of the continuous axes
pub const INITIAL_LOG_STD: f32 = -0.5;

/// A sampled action with its log-probability under the sampling policy
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSample {
    pub action: Vec<f32>,
    pub log_prob: f32,
}

/// Per-observation action distribution
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDistribution {
    /// Means of the continuous axes, in `[-1, 1]`
    pub mean: Vec<f32>,
    pub log_std: Vec<f32>,
    pub trigger_logits: Vec<f32>,
}

impl ActionDistribution {
    pub fn std(&self) -> Vec<f32> {
        self.log_std.iter().map(|s| s.exp()).collect()
    }

    pub fn trigger_probs(&self) -> Vec<f32> {
        self.trigger_logits.iter().map(|&l| sigmoid(l)).collect()
    }

    /// Draw an action; continuous components are left unclamped
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ActionSample {
        let mut action = Vec::with_capacity(ACTION_DIM);
        for (mean, log_std) in self.mean.iter().zip(&self.log_std) {
            action.push(mean + log_std.exp() * sample_standard_normal(rng));
        }
        for &logit in &self.trigger_logits {
            let fired = sample_trigger(rng, logit);
            action.push(if fired { 1.0 } else { 0.0 });
        }
        let log_prob = self.log_prob(&action);
        ActionSample { action, log_prob }
    }

    /// Most likely action
    pub fn mode(&self) -> Vec<f32> {
        let mut action = self.mean.clone();
        action.extend(self.trigger_logits.iter().map(|&l| if l > 0.0 { 1.0 } else { 0.0 }));
        action
    }

    /// Joint log-probability of an action vector
    pub fn log_prob(&self, action: &[f32]) -> f32 {
        let continuous: f32 = self
            .mean
            .iter()
            .zip(&self.log_std)
            .zip(action)
            .map(|((&mean, &log_std), &x)| gaussian_log_prob(x, mean, log_std))
            .sum();
        let triggers: f32 = self
            .trigger_logits
            .iter()
            .zip(action.iter().skip(CONTINUOUS_DIM))
            .map(|(&logit, &x)| bernoulli_log_prob(x > TRIGGER_THRESHOLD, logit))
            .sum();
        continuous + triggers
    }

    pub fn entropy(&self) -> f32 {
        let continuous: f32 = self.log_std.iter().map(|&s| gaussian_entropy(s)).sum();
        let triggers: f32 = self.trigger_logits.iter().map(|&l| bernoulli_entropy(l)).sum();
        continuous + triggers
    }
}

/// Decentralized actor over local observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorModel {
    pub trunk: MlpWeights,
    /// Continuous means, squashed with tanh
    pub mean_head: LayerWeights,
    pub trigger_head: LayerWeights,
    pub log_std: Vec<f32>,
}

impl ActorModel {
    /// Randomly initialized actor with small output layers
    pub fn random<R: Rng>(obs_dim: usize, hidden: &[usize], rng: &mut R) -> Self {
        let trunk = MlpWeights::random(obs_dim, hidden, Activation::Tanh, rng);
        let features = trunk.output_dim();
        Self {
            mean_head: LayerWeights::random(features, CONTINUOUS_DIM, 0.01, rng),
            trigger_head: LayerWeights::random(features, TRIGGER_DIM, 0.01, rng),
            log_std: vec![INITIAL_LOG_STD; CONTINUOUS_DIM],
            trunk,
        }
    }

    pub fn obs_dim(&self) -> usize {
        self.trunk.input_dim()
    }

    pub fn hidden_sizes(&self) -> Vec<usize> {
        self.trunk.layers.iter().map(|l| l.out_features).collect()
    }

    /// Whether every layer agrees with its neighbours and the action layout
    pub fn is_consistent(&self) -> bool {
        let features = self.trunk.output_dim();
        self.trunk.is_consistent()
            && self.mean_head.is_consistent()
            && self.trigger_head.is_consistent()
            && self.mean_head.in_features == features
            && self.trigger_head.in_features == features
            && self.mean_head.out_features == CONTINUOUS_DIM
            && self.trigger_head.out_features == TRIGGER_DIM
            && self.log_std.len() == CONTINUOUS_DIM
    }

    pub fn distribution(&self, obs: &[f32]) -> ActionDistribution {
        let features = self.trunk.forward(obs);
        let mean = self.mean_head.forward(&features).into_iter().map(f32::tanh).collect();
        let trigger_logits = self.trigger_head.forward(&features);
        ActionDistribution { mean, log_std: self.log_std.clone(), trigger_logits }
    }

    /// Sample an action, or take the mode when `deterministic`
    pub fn act<R: Rng>(&self, obs: &[f32], rng: &mut R, deterministic: bool) -> ActionSample {
        let dist = self.distribution(obs);
        if deterministic {
            let action = dist.mode();
            let log_prob = dist.log_prob(&action);
            ActionSample { action, log_prob }
        } else {
            dist.sample(rng)
        }
    }

    pub fn log_prob(&self, obs: &[f32], action: &[f32]) -> f32 {
        self.distribution(obs).log_prob(action)
    }

    pub fn entropy(&self, obs: &[f32]) -> f32 {
        self.distribution(obs).entropy()
    }
}

/// Centralized critic over global states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticModel {
    pub trunk: MlpWeights,
    pub value_head: LayerWeights,
}

impl CriticModel {
    pub fn random<R: Rng>(state_dim: usize, hidden: &[usize], rng: &mut R) -> Self {
        let trunk = MlpWeights::random(state_dim, hidden, Activation::Tanh, rng);
        let value_head = LayerWeights::random(trunk.output_dim(), 1, 1.0, rng);
        Self { trunk, value_head }
    }

    pub fn state_dim(&self) -> usize {
        self.trunk.input_dim()
    }

    pub fn is_consistent(&self) -> bool {
        self.trunk.is_consistent()
            && self.value_head.is_consistent()
            && self.value_head.in_features == self.trunk.output_dim()
            && self.value_head.out_features == 1
    }

    /// Estimated return from a centralized state
    pub fn value(&self, state: &[f32]) -> f32 {
        let features = self.trunk.forward(state);
        self.value_head.forward(&features)[0]
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    use super::*;

    fn actor() -> ActorModel {
        let mut rng = Pcg32::seed_from_u64(11);
        ActorModel::random(12, &[16, 16], &mut rng)
    }

    #[test]
    fn test_actor_shapes() {
        let actor = actor();
        assert!(actor.is_consistent());
        assert_eq!(actor.obs_dim(), 12);
        assert_eq!(actor.hidden_sizes(), vec![16, 16]);

        let dist = actor.distribution(&[0.1; 12]);
        assert_eq!(dist.mean.len(), CONTINUOUS_DIM);
        assert_eq!(dist.trigger_logits.len(), TRIGGER_DIM);
        assert!(dist.mean.iter().all(|m| m.abs() <= 1.0));
    }

    #[test]
    fn test_sample_log_prob_matches_recomputation() {
        let actor = actor();
        let mut rng = Pcg32::seed_from_u64(5);
        let obs = [0.3; 12];

        for _ in 0..20 {
            let sample = actor.act(&obs, &mut rng, false);
            assert_eq!(sample.action.len(), ACTION_DIM);
            let recomputed = actor.log_prob(&obs, &sample.action);
            assert!((sample.log_prob - recomputed).abs() < 1e-4);
            assert!(sample.action[CONTINUOUS_DIM..].iter().all(|&t| t == 0.0 || t == 1.0));
        }
    }

    #[test]
    fn test_deterministic_is_repeatable() {
        let actor = actor();
        let mut rng = Pcg32::seed_from_u64(0);
        let a = actor.act(&[0.2; 12], &mut rng, true);
        let b = actor.act(&[0.2; 12], &mut rng, true);
        assert_eq!(a, b);
        assert_eq!(&a.action[..CONTINUOUS_DIM], &actor.distribution(&[0.2; 12]).mean[..]);
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let actor = actor();
        let mut r1 = Pcg32::seed_from_u64(77);
        let mut r2 = Pcg32::seed_from_u64(77);
        assert_eq!(actor.act(&[0.0; 12], &mut r1, false), actor.act(&[0.0; 12], &mut r2, false));
    }

    #[test]
    fn test_entropy_tracks_log_std() {
        let mut actor = actor();
        let before = actor.entropy(&[0.0; 12]);
        actor.log_std = vec![0.5; CONTINUOUS_DIM];
        assert!(actor.entropy(&[0.0; 12]) > before);
    }

    #[test]
    fn test_critic_value() {
        let mut rng = Pcg32::seed_from_u64(1);
        let critic = CriticModel::random(20, &[8], &mut rng);
        assert!(critic.is_consistent());
        assert_eq!(critic.state_dim(), 20);
        assert!(critic.value(&[0.5; 20]).is_finite());
    }
}
