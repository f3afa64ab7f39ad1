//! Multi-agent environment trait
//!
//! The reset/step contract used by the rollout collector and the engine
//! host. Every agent submits an action vector each tick; all agents advance
//! together.

use std::collections::BTreeMap;

use crate::env::{SpaceInfo, StepInfo};

/// Identifier of an agent (the drone it controls)
pub type AgentId = u32;

/// One action vector per agent; agents without an entry idle
pub type JointAction = BTreeMap<AgentId, Vec<f32>>;

/// Multi-agent environment trait
///
/// Implementations must be deterministic given the seed passed to
/// [`reset`](MultiAgentEnvironment::reset) and the sequence of joint actions.
pub trait MultiAgentEnvironment {
    /// Full state readable after reset and after each step
    type State;

    /// Number of agents in this environment
    fn num_agents(&self) -> usize;

    /// Start a new episode, optionally from an explicit seed
    fn reset(&mut self, seed: Option<u64>) -> &Self::State;

    /// Advance one tick with every agent's action
    fn step(&mut self, actions: &JointAction) -> MultiAgentResult;

    /// Current state
    fn state(&self) -> &Self::State;

    /// Agents that can still act
    fn active_agents(&self) -> Vec<AgentId>;

    /// Per-agent observation layout
    fn observation_space(&self) -> SpaceInfo;

    /// Per-agent action layout
    fn action_space(&self) -> SpaceInfo;
}

/// Result of a multi-agent environment step
#[derive(Debug, Clone, PartialEq)]
pub struct MultiAgentResult {
    /// Reward for every agent, dead or alive
    pub rewards: BTreeMap<AgentId, f32>,

    /// Whether the episode is over
    pub done: bool,

    /// Information shared across all agents
    pub info: StepInfo,
}

impl MultiAgentResult {
    /// Sum of rewards over the given agents
    pub fn total_reward<'a>(&self, agents: impl IntoIterator<Item = &'a AgentId>) -> f32 {
        agents.into_iter().filter_map(|id| self.rewards.get(id)).sum()
    }
}
