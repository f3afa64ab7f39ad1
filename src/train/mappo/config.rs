//! MAPPO configuration and hyperparameters
//!
//! Defines the optimizer, rollout and self-play settings of a training run,
//! with validation and builder-style setters. Every field has a default, so
//! a TOML file only needs the values it changes.

use std::path::Path;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::multi_agent::matchmaking::MatchmakingStrategy;

/// MAPPO configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappoConfig {
    /// Learning rate of the actor optimizer
    pub lr_actor: f64,

    /// Learning rate of the critic optimizer
    pub lr_critic: f64,

    /// Passes over each rollout batch
    pub n_epochs: usize,

    /// Minibatch size
    pub batch_size: usize,

    /// Discount factor (gamma)
    pub gamma: f64,

    /// GAE lambda parameter
    pub gae_lambda: f64,

    /// PPO clipping parameter (epsilon)
    pub clip_range: f64,

    /// Clip the critic around its old prediction
    pub clip_range_vf: Option<f64>,

    /// Critic loss coefficient
    pub vf_coef: f64,

    /// Entropy bonus coefficient
    pub ent_coef: f64,

    /// Maximum gradient norm for clipping
    pub max_grad_norm: f64,

    /// Stop the epoch loop once approximate KL exceeds this
    pub target_kl: Option<f64>,

    /// Normalize advantages over the batch
    pub normalize_advantages: bool,

    pub actor_hidden: Vec<usize>,
    pub critic_hidden: Vec<usize>,

    /// One actor for both roles instead of one per role
    pub share_actor: bool,

    /// Parallel engines during collection
    pub num_envs: usize,

    /// Learner transitions collected per update
    pub steps_per_batch: usize,

    /// Freeze the learner into the pool every N updates
    pub snapshot_interval: u64,

    /// Maximum frozen opponents kept
    pub pool_capacity: usize,

    pub matchmaking: MatchmakingStrategy,

    /// Chance of playing the live policy instead of a frozen one
    pub current_policy_prob: f64,

    /// Diverged updates in a row that end the run
    pub max_consecutive_divergences: usize,

    /// Write a checkpoint every N updates
    pub save_interval: u64,

    pub seed: u64,
}

impl Default for MappoConfig {
    fn default() -> Self {
        Self {
            lr_actor: 3e-4,
            lr_critic: 5e-4,
            n_epochs: 10,
            batch_size: 256,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            clip_range_vf: None,
            vf_coef: 0.5,
            ent_coef: 0.01,
            max_grad_norm: 0.5,
            target_kl: Some(0.02),
            normalize_advantages: true,
            actor_hidden: vec![128, 128],
            critic_hidden: vec![256, 256],
            share_actor: true,
            num_envs: 4,
            steps_per_batch: 2048,
            snapshot_interval: 10,
            pool_capacity: 20,
            matchmaking: MatchmakingStrategy::default(),
            current_policy_prob: 0.2,
            max_consecutive_divergences: 3,
            save_interval: 50,
            seed: 0,
        }
    }
}

impl MappoConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML configuration
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| anyhow!("failed to parse training config: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.lr_actor <= 0.0 || self.lr_critic <= 0.0 {
            return Err(anyhow!("learning rates must be positive"));
        }
        if self.n_epochs == 0 {
            return Err(anyhow!("n_epochs must be positive"));
        }
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be positive"));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(anyhow!("gamma must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(anyhow!("gae_lambda must be in [0, 1]"));
        }
        if self.clip_range <= 0.0 {
            return Err(anyhow!("clip_range must be positive"));
        }
        if self.clip_range_vf.is_some_and(|c| c <= 0.0) {
            return Err(anyhow!("clip_range_vf must be positive"));
        }
        if self.vf_coef < 0.0 {
            return Err(anyhow!("vf_coef must be non-negative"));
        }
        if self.ent_coef < 0.0 {
            return Err(anyhow!("ent_coef must be non-negative"));
        }
        if self.max_grad_norm <= 0.0 {
            return Err(anyhow!("max_grad_norm must be positive"));
        }
        if self.target_kl.is_some_and(|kl| kl < 0.0) {
            return Err(anyhow!("target_kl must be non-negative"));
        }
        if self.actor_hidden.is_empty() || self.critic_hidden.is_empty() {
            return Err(anyhow!("hidden layer sizes must not be empty"));
        }
        if self.actor_hidden.contains(&0) || self.critic_hidden.contains(&0) {
            return Err(anyhow!("hidden layer sizes must be positive"));
        }
        if self.num_envs == 0 {
            return Err(anyhow!("num_envs must be positive"));
        }
        if self.steps_per_batch == 0 {
            return Err(anyhow!("steps_per_batch must be positive"));
        }
        if self.snapshot_interval == 0 || self.save_interval == 0 {
            return Err(anyhow!("snapshot_interval and save_interval must be positive"));
        }
        if self.pool_capacity == 0 {
            return Err(anyhow!("pool_capacity must be positive"));
        }
        if !(0.0..=1.0).contains(&self.current_policy_prob) {
            return Err(anyhow!("current_policy_prob must be in [0, 1]"));
        }
        if self.max_consecutive_divergences == 0 {
            return Err(anyhow!("max_consecutive_divergences must be positive"));
        }
        Ok(())
    }

    pub fn lr_actor(mut self, lr: f64) -> Self {
        self.lr_actor = lr;
        self
    }

    pub fn lr_critic(mut self, lr: f64) -> Self {
        self.lr_critic = lr;
        self
    }

    pub fn n_epochs(mut self, epochs: usize) -> Self {
        self.n_epochs = epochs;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn gae_lambda(mut self, lambda: f64) -> Self {
        self.gae_lambda = lambda;
        self
    }

    pub fn clip_range(mut self, clip: f64) -> Self {
        self.clip_range = clip;
        self
    }

    pub fn clip_range_vf(mut self, clip: Option<f64>) -> Self {
        self.clip_range_vf = clip;
        self
    }

    pub fn ent_coef(mut self, coef: f64) -> Self {
        self.ent_coef = coef;
        self
    }

    pub fn target_kl(mut self, kl: Option<f64>) -> Self {
        self.target_kl = kl;
        self
    }

    pub fn hidden(mut self, actor: Vec<usize>, critic: Vec<usize>) -> Self {
        self.actor_hidden = actor;
        self.critic_hidden = critic;
        self
    }

    pub fn share_actor(mut self, shared: bool) -> Self {
        self.share_actor = shared;
        self
    }

    pub fn num_envs(mut self, n: usize) -> Self {
        self.num_envs = n;
        self
    }

    pub fn steps_per_batch(mut self, steps: usize) -> Self {
        self.steps_per_batch = steps;
        self
    }

    /// Set how often snapshots enter the pool and how many are kept
    pub fn pool(mut self, snapshot_interval: u64, capacity: usize) -> Self {
        self.snapshot_interval = snapshot_interval;
        self.pool_capacity = capacity;
        self
    }

    pub fn matchmaking(mut self, strategy: MatchmakingStrategy, current_policy_prob: f64) -> Self {
        self.matchmaking = strategy;
        self.current_policy_prob = current_policy_prob;
        self
    }

    pub fn save_interval(mut self, interval: u64) -> Self {
        self.save_interval = interval;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MappoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lr_actor, 3e-4);
        assert_eq!(config.lr_critic, 5e-4);
        assert_eq!(config.clip_range_vf, None);
    }

    #[test]
    fn test_config_validation() {
        assert!(MappoConfig::new().lr_actor(-1.0).validate().is_err());
        assert!(MappoConfig::new().gamma(1.5).validate().is_err());
        assert!(MappoConfig::new().n_epochs(0).validate().is_err());
        assert!(MappoConfig::new().batch_size(0).validate().is_err());
        assert!(MappoConfig::new().clip_range(-0.1).validate().is_err());
        assert!(MappoConfig::new().clip_range_vf(Some(0.0)).validate().is_err());
        assert!(MappoConfig::new().num_envs(0).validate().is_err());
        assert!(MappoConfig::new().pool(0, 5).validate().is_err());
        assert!(MappoConfig::new().hidden(vec![], vec![64]).validate().is_err());
        assert!(MappoConfig::new().matchmaking(MatchmakingStrategy::Latest, 1.5).validate().is_err());

        assert!(MappoConfig::new().ent_coef(0.0).target_kl(None).validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = MappoConfig::new().lr_critic(1e-3).n_epochs(4).batch_size(64).share_actor(false).seed(7);

        assert_eq!(config.lr_critic, 1e-3);
        assert_eq!(config.n_epochs, 4);
        assert_eq!(config.batch_size, 64);
        assert!(!config.share_actor);
        assert_eq!(config.seed, 7);
        assert_eq!(config.gae_lambda, 0.95);
    }

    #[test]
    fn test_partial_toml() {
        let config = MappoConfig::from_toml_str(
            r#"
            lr_actor = 0.001
            clip_range_vf = 0.3
            matchmaking = "prioritized"
            actor_hidden = [64, 64]
            "#,
        )
        .unwrap();

        assert_eq!(config.lr_actor, 0.001);
        assert_eq!(config.clip_range_vf, Some(0.3));
        assert_eq!(config.matchmaking, MatchmakingStrategy::Prioritized);
        assert_eq!(config.actor_hidden, vec![64, 64]);
        assert_eq!(config.n_epochs, 10);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(MappoConfig::from_toml_str("gamma = 2.0").is_err());
        assert!(MappoConfig::from_toml_str("gamma = \"high\"").is_err());
    }
}
