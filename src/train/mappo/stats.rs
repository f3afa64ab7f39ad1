//! Training statistics for MAPPO updates

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Metrics from one minibatch step, or summed/averaged over many
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    /// Clipped surrogate loss
    pub actor_loss: f64,

    /// Critic regression loss
    pub critic_loss: f64,

    /// Mean policy entropy
    pub entropy: f64,

    /// Fraction of samples with a clipped ratio
    pub clip_fraction: f64,

    /// Approximate KL divergence between old and new policies
    pub approx_kl: f64,

    /// Explained variance of critic predictions
    pub explained_var: f64,

    /// Number of gradient updates performed
    pub num_updates: usize,
}

impl TrainingStats {
    pub fn zeros() -> Self {
        Self::default()
    }

    pub fn new(
        actor_loss: f64,
        critic_loss: f64,
        entropy: f64,
        clip_fraction: f64,
        approx_kl: f64,
        explained_var: f64,
    ) -> Self {
        Self { actor_loss, critic_loss, entropy, clip_fraction, approx_kl, explained_var, num_updates: 1 }
    }

    pub fn add(&mut self, other: &TrainingStats) {
        self.actor_loss += other.actor_loss;
        self.critic_loss += other.critic_loss;
        self.entropy += other.entropy;
        self.clip_fraction += other.clip_fraction;
        self.approx_kl += other.approx_kl;
        self.explained_var += other.explained_var;
        self.num_updates += other.num_updates;
    }

    /// Mean over the accumulated updates
    pub fn average(&self) -> Self {
        let scale = self.num_updates as f64;
        if scale == 0.0 {
            return Self::zeros();
        }

        Self {
            actor_loss: self.actor_loss / scale,
            critic_loss: self.critic_loss / scale,
            entropy: self.entropy / scale,
            clip_fraction: self.clip_fraction / scale,
            approx_kl: self.approx_kl / scale,
            explained_var: self.explained_var / scale,
            num_updates: self.num_updates,
        }
    }

    /// Whether every metric is finite
    pub fn is_finite(&self) -> bool {
        [self.actor_loss, self.critic_loss, self.entropy, self.approx_kl].iter().all(|v| v.is_finite())
    }
}

impl AddAssign<&TrainingStats> for TrainingStats {
    fn add_assign(&mut self, other: &TrainingStats) {
        self.add(other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_and_average() {
        let mut total = TrainingStats::zeros();
        total += &TrainingStats::new(1.0, 2.0, 0.5, 0.1, 0.01, 0.4);
        total += &TrainingStats::new(3.0, 4.0, 1.5, 0.3, 0.03, 0.6);

        let avg = total.average();
        assert_eq!(avg.num_updates, 2);
        assert!((avg.actor_loss - 2.0).abs() < 1e-12);
        assert!((avg.critic_loss - 3.0).abs() < 1e-12);
        assert!((avg.entropy - 1.0).abs() < 1e-12);
        assert!((avg.approx_kl - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_average_of_nothing() {
        assert_eq!(TrainingStats::zeros().average(), TrainingStats::zeros());
    }

    #[test]
    fn test_non_finite_detected() {
        assert!(TrainingStats::new(0.1, 0.2, 0.3, 0.0, 0.0, 0.0).is_finite());
        assert!(!TrainingStats::new(f64::NAN, 0.2, 0.3, 0.0, 0.0, 0.0).is_finite());
    }
}
