//! Message types for training runs
//!
//! - Learner → caller: [`TrainingEvent`] metrics, episode summaries and
//!   lifecycle notices
//! - Caller → learner: [`ControlMessage`] requests

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::matchmaking::Opponent;
use crate::env::combat::{Outcome, Team};

/// Result of an episode from the learner's side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    Win,
    Loss,
    Draw,
}

impl MatchResult {
    /// Unfinished episodes count as draws
    pub fn for_team(outcome: Option<Outcome>, team: Team) -> Self {
        match outcome.and_then(Outcome::winner) {
            Some(winner) if winner == team => MatchResult::Win,
            Some(_) => MatchResult::Loss,
            None => MatchResult::Draw,
        }
    }
}

/// Summary of one finished episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    /// Episode index within the run
    pub episode: usize,
    /// Summed reward of the learner's team
    pub total_reward: f32,
    /// Ticks played
    pub steps: u32,
    pub winner: Option<Team>,
    pub learner_team: Team,
    pub opponent: Opponent,
    pub result: MatchResult,
}

/// Metrics reported after each update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateMetrics {
    pub update: u64,
    /// Episodes finished so far
    pub episode: usize,
    /// Environment ticks so far
    pub step: u64,
    pub actor_loss: f64,
    pub critic_loss: f64,
    pub entropy: f64,
    pub clip_fraction: f64,
    pub approx_kl: f64,
    pub explained_var: f64,
    /// Mean learner reward over the recent episode window
    pub mean_reward: f64,
    /// Learner win rate over the recent episode window
    pub win_rate: f64,
    pub pool_size: usize,
}

/// Progress notifications from a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrainingEvent {
    Update(UpdateMetrics),
    Episode(EpisodeSummary),
    /// An update produced non-finite values and was rolled back
    Divergence { update: u64, reason: String, consecutive: usize },
    Checkpoint { update: u64, path: PathBuf },
    Finished { episodes: usize, updates: u64, model_path: Option<PathBuf>, error: Option<String> },
}

/// Control message for a running training loop
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Stop after the current batch and export the model
    Shutdown,

    /// Save a checkpoint after the current batch
    SaveCheckpoint { path: PathBuf },
}
