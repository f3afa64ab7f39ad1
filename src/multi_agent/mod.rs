//! Self-play infrastructure
//!
//! # Architecture
//!
//! - **environment**: reset/step contract shared by every multi-agent env
//! - **collector**: steps a pool of engines with a frozen learner snapshot
//!   against opponents drawn from the pool
//! - **population**: bounded pool of frozen policies with win records
//! - **matchmaking**: strategies for picking the next opponent
//! - **learner**: background training runs (`training` feature)
//!
//! # Example
//!
//! ```rust,no_run
//! # #[cfg(feature = "training")]
//! # fn main() -> anyhow::Result<()> {
//! use skybattle::{
//!     env::combat::CombatConfig,
//!     multi_agent::{SelfPlayLearner, TrainingEvent, TrainingRequest},
//!     train::MappoConfig,
//! };
//!
//! let mut learner = SelfPlayLearner::new(CombatConfig::default(), MappoConfig::default());
//! let run = learner.start(TrainingRequest::new(1_000, 3))?;
//! for event in run.events.iter() {
//!     if let TrainingEvent::Update(metrics) = event {
//!         println!("update {} win rate {:.2}", metrics.update, metrics.win_rate);
//!     }
//! }
//! run.join()?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "training"))]
//! # fn main() {}
//! ```

pub mod collector;
pub mod environment;
#[cfg(feature = "training")]
pub mod learner;
pub mod matchmaking;
pub mod messages;
pub mod population;

pub use collector::{CollectTarget, CollectedBatch, RolloutCollector};
pub use environment::{AgentId, JointAction, MultiAgentEnvironment, MultiAgentResult};
#[cfg(feature = "training")]
pub use learner::{Algorithm, RunId, SelfPlayLearner, TrainingRequest, TrainingRun};
pub use matchmaking::{Matchmaker, MatchmakingStrategy, Opponent, OpponentSelector};
pub use messages::{ControlMessage, EpisodeSummary, MatchResult, TrainingEvent, UpdateMetrics};
pub use population::{OpponentPool, PoolEntry};
