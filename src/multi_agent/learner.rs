//! Self-play training runs
//!
//! [`SelfPlayLearner::start`] spawns one background thread that alternates
//! collection and MAPPO updates. Progress comes back as [`TrainingEvent`]s on
//! a channel, and [`ControlMessage`]s are checked between batches.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::Arc,
    thread::JoinHandle,
};

use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use tch::Device;

use super::{
    collector::{CollectTarget, RolloutCollector},
    matchmaking::{Opponent, OpponentSelector},
    messages::{ControlMessage, EpisodeSummary, MatchResult, TrainingEvent, UpdateMetrics},
    population::OpponentPool,
};
use crate::{
    codec::ModelSignature,
    env::combat::{config::MAX_TEAM_SIZE, CombatConfig},
    error::SkyBattleError,
    inference::PolicyArtifact,
    train::{MappoConfig, MappoTrainer},
};

/// Episodes in the rolling reward and win-rate window
const RECENT_EPISODES: usize = 100;

/// Training algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    Mappo,
}

/// Parameters of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub algorithm: Algorithm,
    /// Episodes to play before the run finishes
    pub episodes: usize,
    /// Drones per team
    pub team_size: usize,
    pub lr_actor: f64,
    pub lr_critic: f64,
}

impl TrainingRequest {
    pub fn new(episodes: usize, team_size: usize) -> Self {
        let defaults = MappoConfig::default();
        Self {
            algorithm: Algorithm::Mappo,
            episodes,
            team_size,
            lr_actor: defaults.lr_actor,
            lr_critic: defaults.lr_critic,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| -> Result<()> { Err(SkyBattleError::config(msg).into()) };

        if self.episodes == 0 {
            return fail("episodes must be positive");
        }
        if self.team_size == 0 || self.team_size > MAX_TEAM_SIZE {
            return fail("team_size out of range");
        }
        if !(self.lr_actor > 0.0 && self.lr_actor.is_finite()) {
            return fail("lr_actor must be positive");
        }
        if !(self.lr_critic > 0.0 && self.lr_critic.is_finite()) {
            return fail("lr_critic must be positive");
        }
        Ok(())
    }
}

/// Identifier of a training run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Handle to a running training thread
pub struct TrainingRun {
    pub id: RunId,
    pub events: Receiver<TrainingEvent>,
    control: Sender<ControlMessage>,
    handle: JoinHandle<Result<()>>,
}

impl TrainingRun {
    /// Ask the run to stop after the current batch
    pub fn shutdown(&self) -> Result<()> {
        self.send(ControlMessage::Shutdown)
    }

    /// Ask the run to write a checkpoint after the current batch
    pub fn save_checkpoint(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.send(ControlMessage::SaveCheckpoint { path: path.into() })
    }

    /// Wait for the thread and return its outcome
    pub fn join(self) -> Result<()> {
        self.handle.join().map_err(|_| anyhow!("training thread for {} panicked", self.id))?
    }

    fn send(&self, message: ControlMessage) -> Result<()> {
        self.control.send(message).map_err(|e| anyhow!("training run {} has finished: {e}", self.id))
    }
}

/// Starts self-play training runs
pub struct SelfPlayLearner {
    combat: CombatConfig,
    config: MappoConfig,
    output_dir: Option<PathBuf>,
    /// Artifact every run continues from
    resume: Option<PathBuf>,
    next_run: u64,
}

impl SelfPlayLearner {
    pub fn new(combat: CombatConfig, config: MappoConfig) -> Self {
        Self { combat, config, output_dir: None, resume: None, next_run: 0 }
    }

    /// Directory for checkpoints and the final model
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Continue from a saved checkpoint instead of fresh weights
    pub fn with_resume(mut self, path: impl Into<PathBuf>) -> Self {
        self.resume = Some(path.into());
        self
    }

    /// Validate a request and spawn its training thread
    pub fn start(&mut self, request: TrainingRequest) -> Result<TrainingRun> {
        request.validate()?;
        let combat = self.combat.clone().symmetric(request.team_size);
        combat.validate()?;
        let config = self.config.clone().lr_actor(request.lr_actor).lr_critic(request.lr_critic);
        config.validate()?;
        if let Some(dir) = &self.output_dir {
            std::fs::create_dir_all(dir)?;
        }

        self.next_run += 1;
        let id = RunId(self.next_run);
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let output_dir = self.output_dir.clone();
        let resume = self.resume.clone();

        tracing::info!(%id, episodes = request.episodes, team_size = request.team_size, "starting training run");
        let handle = std::thread::Builder::new()
            .name(format!("skybattle-{id}"))
            .spawn(move || match RunLoop::new(combat, config, output_dir, resume.as_deref(), event_tx.clone(), control_rx) {
                Ok(mut run) => run.execute(request.episodes),
                Err(e) => {
                    let _ = event_tx.send(TrainingEvent::Finished {
                        episodes: 0,
                        updates: 0,
                        model_path: None,
                        error: Some(format!("{e:#}")),
                    });
                    Err(e)
                }
            })?;

        Ok(TrainingRun { id, events: event_rx, control: control_tx, handle })
    }
}

/// State owned by the training thread
struct RunLoop {
    trainer: MappoTrainer,
    collector: RolloutCollector,
    /// Replaced between batches, read-only during collection
    pool: Arc<OpponentPool>,
    selector: OpponentSelector,
    output_dir: Option<PathBuf>,
    events: Sender<TrainingEvent>,
    control: Receiver<ControlMessage>,
    recent: VecDeque<EpisodeSummary>,
    episodes: usize,
}

impl RunLoop {
    fn new(
        combat: CombatConfig,
        config: MappoConfig,
        output_dir: Option<PathBuf>,
        resume: Option<&Path>,
        events: Sender<TrainingEvent>,
        control: Receiver<ControlMessage>,
    ) -> Result<Self> {
        let signature = ModelSignature::for_team_size(combat.team_size());
        let collector = RolloutCollector::new(combat, config.num_envs, config.seed)?;
        let mut pool = OpponentPool::new(config.pool_capacity, config.snapshot_interval);
        let selector = OpponentSelector::new(config.matchmaking, config.current_policy_prob);
        let mut trainer = MappoTrainer::new(config, signature, Device::cuda_if_available())?;

        if let Some(path) = resume {
            let artifact = PolicyArtifact::load_checked(path, &signature)?;
            trainer.load_artifact(&artifact)?;
            // The resumed weights are the first frozen opponent
            pool.push(trainer.snapshot());
            tracing::info!(path = %path.display(), version = trainer.updates(), "resumed from checkpoint");
        }
        let pool = Arc::new(pool);

        Ok(Self {
            trainer,
            collector,
            pool,
            selector,
            output_dir,
            events,
            control,
            recent: VecDeque::with_capacity(RECENT_EPISODES),
            episodes: 0,
        })
    }

    /// Run to completion; a `Finished` event is always the last one sent
    fn execute(&mut self, target_episodes: usize) -> Result<()> {
        let result = self.train(target_episodes);
        let model_path = match &result {
            Ok(()) => self.export_final(),
            Err(_) => None,
        };
        let error = result.as_ref().err().map(|e| format!("{e:#}"));
        tracing::info!(episodes = self.episodes, updates = self.trainer.updates(), ?error, "training run finished");
        self.emit(TrainingEvent::Finished {
            episodes: self.episodes,
            updates: self.trainer.updates(),
            model_path,
            error,
        });
        result
    }

    fn train(&mut self, target_episodes: usize) -> Result<()> {
        let config = self.trainer.config().clone();

        while self.episodes < target_episodes {
            if !self.handle_control()? {
                tracing::info!("shutdown requested");
                break;
            }

            // Collect with a fixed snapshot
            let snapshot = self.trainer.snapshot();
            let target = CollectTarget { transitions: config.steps_per_batch, episodes: target_episodes - self.episodes };
            let collected = self.collector.collect(&snapshot, &self.pool, &mut self.selector, target);

            // Update-then-publish the pool's records
            let pool = Arc::make_mut(&mut self.pool);
            for summary in &collected.episodes {
                if let Opponent::Frozen(version) = summary.opponent {
                    pool.record_result(version, summary.result);
                }
            }
            for summary in collected.episodes {
                self.record_episode(summary);
            }

            let batch = collected.buffer.into_batch(config.gamma as f32, config.gae_lambda as f32, config.normalize_advantages);
            if batch.is_empty() {
                continue;
            }

            match self.trainer.update(&batch) {
                Ok(stats) => {
                    let (mean_reward, win_rate) = self.recent_performance();
                    let metrics = UpdateMetrics {
                        update: self.trainer.updates(),
                        episode: self.episodes,
                        step: self.collector.total_steps(),
                        actor_loss: stats.actor_loss,
                        critic_loss: stats.critic_loss,
                        entropy: stats.entropy,
                        clip_fraction: stats.clip_fraction,
                        approx_kl: stats.approx_kl,
                        explained_var: stats.explained_var,
                        mean_reward,
                        win_rate,
                        pool_size: self.pool.len(),
                    };
                    tracing::info!(
                        "Update {} | Episode {} | Actor: {:.3} | Critic: {:.3} | Entropy: {:.3} | Reward: {:.2} | Win: {:.2}",
                        metrics.update,
                        metrics.episode,
                        metrics.actor_loss,
                        metrics.critic_loss,
                        metrics.entropy,
                        metrics.mean_reward,
                        metrics.win_rate,
                    );
                    self.emit(TrainingEvent::Update(metrics));
                }
                Err(e) => match e.downcast_ref::<SkyBattleError>() {
                    Some(SkyBattleError::TrainingDivergence { reason, .. }) => {
                        self.emit(TrainingEvent::Divergence {
                            update: self.trainer.updates(),
                            reason: reason.clone(),
                            consecutive: self.trainer.consecutive_divergences(),
                        });
                        if self.trainer.is_exhausted() {
                            return Err(e);
                        }
                        continue;
                    }
                    _ => return Err(e),
                },
            }

            let updates = self.trainer.updates();
            if self.pool.should_snapshot(updates) {
                if let Some(evicted) = Arc::make_mut(&mut self.pool).push(self.trainer.snapshot()) {
                    tracing::debug!(evicted, "opponent pool full, evicted oldest snapshot");
                }
            }
            if updates % config.save_interval == 0 {
                if let Some(dir) = &self.output_dir {
                    let path = dir.join(format!("checkpoint_{updates:06}.json"));
                    self.checkpoint(&path)?;
                }
            }
        }
        Ok(())
    }

    /// Apply pending control messages; false once shutdown is requested
    fn handle_control(&mut self) -> Result<bool> {
        loop {
            match self.control.try_recv() {
                Ok(ControlMessage::Shutdown) => return Ok(false),
                Ok(ControlMessage::SaveCheckpoint { path }) => self.checkpoint(&path)?,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Ok(true),
            }
        }
    }

    fn checkpoint(&self, path: &Path) -> Result<()> {
        self.trainer.save_checkpoint(path)?;
        self.emit(TrainingEvent::Checkpoint { update: self.trainer.updates(), path: path.to_path_buf() });
        Ok(())
    }

    fn record_episode(&mut self, summary: EpisodeSummary) {
        self.episodes += 1;
        if self.recent.len() == RECENT_EPISODES {
            self.recent.pop_front();
        }
        self.recent.push_back(summary.clone());
        self.emit(TrainingEvent::Episode(summary));
    }

    /// Mean learner reward and win rate over the recent window
    fn recent_performance(&self) -> (f64, f64) {
        if self.recent.is_empty() {
            return (0.0, 0.0);
        }
        let n = self.recent.len() as f64;
        let reward = self.recent.iter().map(|s| s.total_reward as f64).sum::<f64>() / n;
        let wins = self.recent.iter().filter(|s| s.result == MatchResult::Win).count() as f64;
        (reward, wins / n)
    }

    fn export_final(&self) -> Option<PathBuf> {
        let path = self.output_dir.as_ref()?.join("final.json");
        match self.trainer.save_checkpoint(&path) {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::warn!("failed to export final model: {e:#}");
                None
            }
        }
    }

    fn emit(&self, event: TrainingEvent) {
        // The caller may have stopped listening; training continues regardless
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ModelSignature;

    fn tiny_learner() -> SelfPlayLearner {
        let combat = CombatConfig::default().time_limit(20);
        let config = MappoConfig::new()
            .hidden(vec![16], vec![16])
            .n_epochs(1)
            .batch_size(32)
            .num_envs(2)
            .steps_per_batch(64)
            .pool(1, 4)
            .save_interval(1);
        SelfPlayLearner::new(combat, config)
    }

    #[test]
    fn test_request_validation() {
        assert!(TrainingRequest::new(10, 3).validate().is_ok());
        assert!(TrainingRequest::new(0, 3).validate().is_err());
        assert!(TrainingRequest::new(10, 0).validate().is_err());
        let bad_lr = TrainingRequest { lr_actor: -1.0, ..TrainingRequest::new(10, 1) };
        let err = bad_lr.validate().unwrap_err();
        assert!(matches!(err.downcast_ref::<SkyBattleError>(), Some(SkyBattleError::Config(_))));
    }

    #[test]
    fn test_invalid_request_does_not_start() {
        let mut learner = tiny_learner();
        assert!(learner.start(TrainingRequest::new(0, 1)).is_err());
    }

    #[test]
    fn test_run_ids_increase() {
        assert_eq!(RunId(3).to_string(), "run-3");
        assert!(RunId(1) < RunId(2));
    }

    #[test]
    fn test_short_run_emits_events_and_model() {
        let dir = tempfile::tempdir().unwrap();
        let mut learner = tiny_learner().with_output_dir(dir.path());
        let run = learner.start(TrainingRequest::new(4, 1)).unwrap();
        assert_eq!(run.id, RunId(1));

        let events: Vec<TrainingEvent> = run.events.iter().collect();
        run.join().unwrap();

        let episodes = events.iter().filter(|e| matches!(e, TrainingEvent::Episode(_))).count();
        assert!(episodes >= 4);
        assert!(events.iter().any(|e| matches!(e, TrainingEvent::Update(_))));
        assert!(events.iter().any(|e| matches!(e, TrainingEvent::Checkpoint { .. })));

        match events.last() {
            Some(TrainingEvent::Finished { model_path: Some(path), error: None, .. }) => {
                let artifact = PolicyArtifact::load_checked(path, &ModelSignature::for_team_size(1)).unwrap();
                assert!(artifact.critic.is_some());
            }
            other => panic!("unexpected final event {other:?}"),
        }
    }

    #[test]
    fn test_missing_resume_checkpoint_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut learner = tiny_learner().with_resume(dir.path().join("absent.json"));
        let run = learner.start(TrainingRequest::new(2, 1)).unwrap();

        let last = run.events.iter().last();
        assert!(run.join().is_err());
        assert!(matches!(last, Some(TrainingEvent::Finished { episodes: 0, error: Some(_), .. })));
    }

    #[test]
    fn test_shutdown_finishes_run() {
        let mut learner = tiny_learner();
        let run = learner.start(TrainingRequest::new(100_000, 1)).unwrap();
        run.shutdown().unwrap();

        let last = run.events.iter().last();
        run.join().unwrap();
        assert!(matches!(last, Some(TrainingEvent::Finished { error: None, .. })));
    }
}
