//! Minibatch sampling over a flattened rollout batch

use rand::{seq::SliceRandom, Rng};

use super::storage::RolloutBatch;
use crate::env::combat::Role;

/// Generate shuffled minibatch indices
///
/// Each minibatch holds `batch_size` samples except possibly the last.
/// Shuffling uses the caller's generator so updates are reproducible.
pub fn generate_minibatch_indices<R: Rng>(buffer_size: usize, batch_size: usize, rng: &mut R) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..buffer_size).collect();
    indices.shuffle(rng);

    indices.chunks(batch_size.max(1)).map(|chunk| chunk.to_vec()).collect()
}

/// Minibatch data for training
#[derive(Debug, Clone)]
pub struct Minibatch {
    /// Observations [batch_size * obs_dim]
    pub observations: Vec<f32>,
    /// Centralized states [batch_size * state_dim]
    pub states: Vec<f32>,
    /// Actions [batch_size * action_dim]
    pub actions: Vec<f32>,
    pub roles: Vec<Role>,
    pub old_log_probs: Vec<f32>,
    pub old_values: Vec<f32>,
    pub advantages: Vec<f32>,
    pub returns: Vec<f32>,
    pub obs_dim: usize,
    pub state_dim: usize,
    pub action_dim: usize,
}

impl Minibatch {
    pub fn size(&self) -> usize {
        self.old_log_probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

impl RolloutBatch {
    /// Gather the samples at `indices`
    pub fn minibatch(&self, indices: &[usize]) -> Minibatch {
        let mut mb = Minibatch {
            observations: Vec::with_capacity(indices.len() * self.obs_dim),
            states: Vec::with_capacity(indices.len() * self.state_dim),
            actions: Vec::with_capacity(indices.len() * self.action_dim),
            roles: Vec::with_capacity(indices.len()),
            old_log_probs: Vec::with_capacity(indices.len()),
            old_values: Vec::with_capacity(indices.len()),
            advantages: Vec::with_capacity(indices.len()),
            returns: Vec::with_capacity(indices.len()),
            obs_dim: self.obs_dim,
            state_dim: self.state_dim,
            action_dim: self.action_dim,
        };
        for &i in indices {
            mb.observations.extend_from_slice(self.observation(i));
            mb.states.extend_from_slice(self.state(i));
            mb.actions.extend_from_slice(self.action(i));
            mb.roles.push(self.roles[i]);
            mb.old_log_probs.push(self.old_log_probs[i]);
            mb.old_values.push(self.old_values[i]);
            mb.advantages.push(self.advantages[i]);
            mb.returns.push(self.returns[i]);
        }
        mb
    }
}
