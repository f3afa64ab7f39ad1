//! Multi-Agent Proximal Policy Optimization (MAPPO)
//!
//! Decentralized actors act on local observations; a centralized critic
//! scores the team-perspective state during training only.
//!
//! # Algorithm Overview
//!
//! ```text
//! For each update:
//!   1. Collect trajectories against the opponent pool with a frozen snapshot
//!   2. Compute advantages per trajectory using GAE
//!   3. For n_epochs:
//!      a. Shuffle into minibatches (seeded)
//!      b. Clipped surrogate for the actor(s), squared error for the critic
//!      c. Step the actor and critic optimizers separately
//!   4. Export a new snapshot
//! ```
//!
//! # References
//!
//! - [Proximal Policy Optimization Algorithms](https://arxiv.org/abs/1707.06347)
//! - [The Surprising Effectiveness of PPO in Cooperative Multi-Agent Games](https://arxiv.org/abs/2103.01955)

pub mod config;
pub mod loss;
pub mod stats;
#[cfg(feature = "training")]
pub mod trainer;

pub use config::MappoConfig;
pub use loss::explained_variance;
#[cfg(feature = "training")]
pub use loss::{compute_entropy_loss, compute_policy_loss, compute_value_loss};
pub use stats::TrainingStats;
#[cfg(feature = "training")]
pub use trainer::MappoTrainer;
