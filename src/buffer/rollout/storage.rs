//! Rollout buffer storage and data management

use super::gae::{compute_gae_single_trajectory, normalize_advantages};
use crate::{env::combat::Role, multi_agent::environment::AgentId};

/// One decision of one agent
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Local observation the actor saw
    pub obs: Vec<f32>,
    /// Centralized state the critic saw
    pub state: Vec<f32>,
    /// Raw sampled action
    pub action: Vec<f32>,
    pub reward: f32,
    /// Whether the agent's episode ended on this step
    pub done: bool,
    pub log_prob: f32,
    pub value: f32,
    pub role: Role,
}

/// Chronological transitions of a single agent
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub agent: AgentId,
    pub transitions: Vec<Transition>,
    /// Value of the state after the last transition; zero when it was terminal
    pub last_value: f32,
}

impl Trajectory {
    pub fn new(agent: AgentId) -> Self {
        Self { agent, transitions: Vec::new(), last_value: 0.0 }
    }

    pub fn push(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Whether the last transition ended the agent's episode
    pub fn is_terminal(&self) -> bool {
        self.transitions.last().is_some_and(|t| t.done)
    }

    pub fn total_reward(&self) -> f32 {
        self.transitions.iter().map(|t| t.reward).sum()
    }

    /// Advantages and returns for this trajectory
    pub fn advantages(&self, gamma: f32, gae_lambda: f32) -> (Vec<f32>, Vec<f32>) {
        let rewards: Vec<f32> = self.transitions.iter().map(|t| t.reward).collect();
        let values: Vec<f32> = self.transitions.iter().map(|t| t.value).collect();
        let dones: Vec<bool> = self.transitions.iter().map(|t| t.done).collect();

        let mut advantages = vec![0.0; self.len()];
        let mut returns = vec![0.0; self.len()];
        compute_gae_single_trajectory(
            &rewards,
            &values,
            &dones,
            self.last_value,
            gamma,
            gae_lambda,
            &mut advantages,
            &mut returns,
        );
        (advantages, returns)
    }
}

/// Trajectories gathered for one update
#[derive(Debug, Clone, Default)]
pub struct RolloutBuffer {
    trajectories: Vec<Trajectory>,
}

impl RolloutBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a finished trajectory; empty ones are dropped
    pub fn push_trajectory(&mut self, trajectory: Trajectory) {
        if !trajectory.is_empty() {
            self.trajectories.push(trajectory);
        }
    }

    pub fn trajectories(&self) -> &[Trajectory] {
        &self.trajectories
    }

    /// Total number of transitions
    pub fn len(&self) -> usize {
        self.trajectories.iter().map(Trajectory::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn clear(&mut self) {
        self.trajectories.clear();
    }

    /// Compute advantages per trajectory and flatten everything into a batch
    ///
    /// Advantages are normalized over the whole batch when `normalize` is set.
    pub fn into_batch(self, gamma: f32, gae_lambda: f32, normalize: bool) -> RolloutBatch {
        let mut batch = RolloutBatch::default();
        for trajectory in &self.trajectories {
            let (advantages, returns) = trajectory.advantages(gamma, gae_lambda);
            for (t, transition) in trajectory.transitions.iter().enumerate() {
                if batch.obs_dim == 0 {
                    batch.obs_dim = transition.obs.len();
                    batch.state_dim = transition.state.len();
                    batch.action_dim = transition.action.len();
                }
                batch.observations.extend_from_slice(&transition.obs);
                batch.states.extend_from_slice(&transition.state);
                batch.actions.extend_from_slice(&transition.action);
                batch.roles.push(transition.role);
                batch.old_log_probs.push(transition.log_prob);
                batch.old_values.push(transition.value);
                batch.rewards.push(transition.reward);
                batch.advantages.push(advantages[t]);
                batch.returns.push(returns[t]);
            }
        }
        if normalize {
            normalize_advantages(&mut batch.advantages);
        }
        batch
    }
}

/// Flattened training data with advantages
#[derive(Debug, Clone, Default)]
pub struct RolloutBatch {
    /// Observations [batch_size * obs_dim]
    pub observations: Vec<f32>,
    /// Centralized states [batch_size * state_dim]
    pub states: Vec<f32>,
    /// Actions [batch_size * action_dim]
    pub actions: Vec<f32>,
    pub roles: Vec<Role>,
    pub old_log_probs: Vec<f32>,
    pub old_values: Vec<f32>,
    pub rewards: Vec<f32>,
    pub advantages: Vec<f32>,
    pub returns: Vec<f32>,
    pub obs_dim: usize,
    pub state_dim: usize,
    pub action_dim: usize,
}

impl RolloutBatch {
    /// Number of samples
    pub fn len(&self) -> usize {
        self.old_log_probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn observation(&self, i: usize) -> &[f32] {
        &self.observations[i * self.obs_dim..(i + 1) * self.obs_dim]
    }

    pub fn state(&self, i: usize) -> &[f32] {
        &self.states[i * self.state_dim..(i + 1) * self.state_dim]
    }

    pub fn action(&self, i: usize) -> &[f32] {
        &self.actions[i * self.action_dim..(i + 1) * self.action_dim]
    }

    /// Indices of samples taken by a role
    pub fn role_indices(&self, role: Role) -> Vec<usize> {
        self.roles.iter().enumerate().filter(|(_, r)| **r == role).map(|(i, _)| i).collect()
    }
}
