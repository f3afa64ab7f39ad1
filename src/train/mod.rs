//! Training algorithms
//!
//! MAPPO configuration and losses are always available; the trainer itself
//! needs the `training` feature.

pub mod mappo;

pub use mappo::{MappoConfig, TrainingStats};
#[cfg(feature = "training")]
pub use mappo::MappoTrainer;
