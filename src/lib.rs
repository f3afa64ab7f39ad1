//! # SkyBattle
//!
//! Deterministic multi-drone aerial combat with MAPPO self-play training.
//!
//! Two teams of drones fight in a bounded 3D arena. The engine, the
//! observation/action codec, pure-Rust policy inference and match hosting
//! build without any native dependencies; the tch-based trainer is behind
//! the `training` feature.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skybattle::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = CombatConfig::default().symmetric(3).time_limit(300);
//! let report = play_match(config, TeamController::Idle, TeamController::Idle)?;
//! assert_eq!(report.outcome, Outcome::Draw);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

/// Error taxonomy shared by every module
pub mod error;

/// Combat engine and the parallel environment pool
pub mod env;

/// Observation/action encoding and model signatures
pub mod codec;

/// Pure Rust forward passes and model artifacts
pub mod inference;

/// Actor and critic models; tch networks with the `training` feature
pub mod policy;

/// Trajectory storage and advantage estimation
pub mod buffer;

/// MAPPO configuration, losses and (with `training`) the trainer
pub mod train;

/// Self-play collection, opponent pool and training runs
pub mod multi_agent;

/// Match sessions and the session registry
pub mod host;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::codec::{ModelSignature, ObservationCodec};
    pub use crate::env::combat::{CombatConfig, CombatEnv, Outcome, Role, StateSnapshot, Team};
    pub use crate::error::SkyBattleError;
    pub use crate::host::{play_match, GameSession, LifecycleCommand, SessionRegistry, TeamController};
    pub use crate::inference::PolicyArtifact;
    pub use crate::multi_agent::{MultiAgentEnvironment, OpponentPool, RolloutCollector, TrainingEvent};
    pub use crate::policy::{ActorModel, CriticModel, PolicySnapshot, RolePolicies};
    pub use crate::train::MappoConfig;

    #[cfg(feature = "training")]
    pub use crate::multi_agent::{SelfPlayLearner, TrainingRequest};
    #[cfg(feature = "training")]
    pub use crate::train::MappoTrainer;
}

/// Current version of skybattle
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
