//! Rollout buffer for storing and processing trajectories
//!
//! Experience is kept per agent trajectory rather than in a fixed
//! `[num_steps, num_envs]` grid: in a multi-agent match agents die at
//! different ticks, so each agent's sequence ends on its own.
//!
//! - Trajectory storage (observations, centralized states, actions, rewards)
//! - GAE computed per trajectory
//! - Seeded minibatch sampling over the flattened batch

pub mod gae;
pub mod sampling;
pub mod storage;


pub use gae::{compute_gae_single_trajectory, normalize_advantages};
pub use sampling::{generate_minibatch_indices, Minibatch};
pub use storage::{RolloutBatch, RolloutBuffer, Trajectory, Transition};
