//! Experience buffers

pub mod rollout;

pub use rollout::{Minibatch, RolloutBatch, RolloutBuffer, Trajectory, Transition};
