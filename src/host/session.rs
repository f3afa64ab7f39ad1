//! Interactive game sessions
//!
//! A [`GameSession`] wraps one engine with a controller per team and a
//! small lifecycle state machine. Ticks only happen while the session is
//! running; each tick pushes a [`StateSnapshot`] to the outbound channel.

use std::fmt;

use anyhow::Result;
use crossbeam_channel::Sender;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::{
    codec::{idle_action, ModelSignature, ObservationCodec},
    env::combat::{CombatConfig, CombatEnv, CombatEvent, Outcome, StateSnapshot, Team, WorldState},
    error::SkyBattleError,
    multi_agent::{JointAction, MultiAgentEnvironment, MultiAgentResult},
    policy::PolicySnapshot,
};

/// Identifier of a session within a registry
pub type SessionId = u64;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Running,
    Paused,
    /// The episode ended; the final state is still readable
    Finished,
    /// The engine was dropped
    Stopped,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Commands accepted by [`GameSession::control`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleCommand {
    Start,
    Pause,
    Resume,
    Stop,
    /// Begin a fresh episode from any state but `Created`
    Restart,
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Who flies a team's drones
#[derive(Debug, Clone, Default)]
pub enum TeamController {
    /// Neutral controls, no triggers
    #[default]
    Idle,
    /// Actions sampled from a policy
    Policy(PolicySnapshot),
}

/// Messages pushed to a session's listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionMessage {
    State(StateSnapshot),
    Finished { outcome: Outcome, steps: u32 },
}

/// Result of one complete match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub outcome: Outcome,
    pub steps: u32,
    pub red_alive: usize,
    pub blue_alive: usize,
    pub red_kills: usize,
    pub blue_kills: usize,
    pub red_reward: f32,
    pub blue_reward: f32,
}

/// One engine under lifecycle control
#[derive(Debug)]
pub struct GameSession {
    id: SessionId,
    config: CombatConfig,
    codec: ObservationCodec,
    red: TeamController,
    blue: TeamController,
    env: Option<CombatEnv>,
    status: SessionStatus,
    /// Action sampling for policy controllers
    rng: Pcg32,
    /// Supplies a fresh seed to every Start and Restart
    seed_source: Pcg32,
    sink: Option<Sender<SessionMessage>>,
}

impl GameSession {
    /// Create a session; policies must match the configured team size
    pub fn new(id: SessionId, config: CombatConfig, red: TeamController, blue: TeamController) -> Result<Self> {
        config.validate()?;
        let codec = ObservationCodec::from_config(&config);
        let expected = ModelSignature::for_team_size(codec.team_size());
        for controller in [&red, &blue] {
            if let TeamController::Policy(snapshot) = controller {
                match snapshot.actors.obs_dim() {
                    Some(dim) if dim == expected.obs_dim => {}
                    found => {
                        return Err(SkyBattleError::SignatureMismatch {
                            expected: expected.to_string(),
                            found: format!("obs={found:?}"),
                        }
                        .into())
                    }
                }
            }
        }

        let seed_source = Pcg32::seed_from_u64(config.seed);
        let rng = Pcg32::seed_from_u64(config.seed);
        Ok(Self {
            id,
            config,
            codec,
            red,
            blue,
            env: None,
            status: SessionStatus::Created,
            rng,
            seed_source,
            sink: None,
        })
    }

    /// Send snapshots and the final result to `sink`
    pub fn with_sink(mut self, sink: Sender<SessionMessage>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Current world, if an engine exists
    pub fn world(&self) -> Option<&WorldState> {
        self.env.as_ref().map(CombatEnv::world)
    }

    pub fn snapshot(&self) -> Option<StateSnapshot> {
        self.env.as_ref().map(CombatEnv::snapshot)
    }

    /// Apply a lifecycle command
    ///
    /// Invalid transitions fail with [`SkyBattleError::InvalidCommand`] and
    /// leave the session untouched.
    pub fn control(&mut self, command: LifecycleCommand) -> Result<SessionStatus> {
        use LifecycleCommand as C;
        use SessionStatus as S;

        let next = match (self.status, command) {
            (S::Created, C::Start) => {
                self.begin_episode()?;
                S::Running
            }
            (S::Running, C::Pause) => S::Paused,
            (S::Paused, C::Resume) => S::Running,
            (S::Created | S::Running | S::Paused | S::Finished, C::Stop) => {
                self.env = None;
                S::Stopped
            }
            (S::Running | S::Paused | S::Finished | S::Stopped, C::Restart) => {
                self.begin_episode()?;
                S::Running
            }
            (status, command) => {
                tracing::warn!(session = self.id, %command, %status, "rejected lifecycle command");
                return Err(SkyBattleError::InvalidCommand { command: command.to_string(), status: status.to_string() }.into());
            }
        };

        tracing::debug!(session = self.id, %command, from = %self.status, to = %next, "session transition");
        self.status = next;
        Ok(next)
    }

    /// Advance one tick when running; `None` otherwise
    pub fn tick(&mut self) -> Option<MultiAgentResult> {
        if self.status != SessionStatus::Running {
            return None;
        }
        let env = self.env.as_mut()?;

        let actions = joint_action(env.world(), &self.codec, &self.red, &self.blue, &mut self.rng);
        let result = env.step(&actions);

        if let Some(sink) = &self.sink {
            let _ = sink.send(SessionMessage::State(env.snapshot()));
        }
        if result.done {
            self.status = SessionStatus::Finished;
            let world = env.world();
            let outcome = world.outcome.unwrap_or(Outcome::Draw);
            tracing::info!(session = self.id, ?outcome, steps = world.step, "session finished");
            if let Some(sink) = &self.sink {
                let _ = sink.send(SessionMessage::Finished { outcome, steps: world.step });
            }
        }
        Some(result)
    }

    /// Tick until the session stops running; returns the ticks taken
    pub fn run_until_stopped(&mut self) -> u32 {
        let mut ticks = 0;
        while self.tick().is_some() {
            ticks += 1;
        }
        ticks
    }

    fn begin_episode(&mut self) -> Result<()> {
        let seed: u64 = self.seed_source.gen();
        let mut env = CombatEnv::new(self.config.clone())?;
        env.reset(Some(seed));
        self.rng = Pcg32::seed_from_u64(seed);
        tracing::debug!(session = self.id, seed, "episode started");
        self.env = Some(env);
        Ok(())
    }
}

/// Decide every alive drone's action for one tick
fn joint_action(
    world: &WorldState,
    codec: &ObservationCodec,
    red: &TeamController,
    blue: &TeamController,
    rng: &mut Pcg32,
) -> JointAction {
    let mut joint = JointAction::new();
    for drone in world.drones.iter().filter(|d| d.alive) {
        let controller = match drone.team {
            Team::Red => red,
            Team::Blue => blue,
        };
        let action = match controller {
            TeamController::Idle => idle_action(),
            TeamController::Policy(snapshot) => {
                let obs = codec.encode_observation(world, drone.id);
                snapshot.act(&obs, None, drone.role, rng).0.action
            }
        };
        joint.insert(drone.id, action);
    }
    joint
}

/// Play one full match between two controllers
pub fn play_match(config: CombatConfig, red: TeamController, blue: TeamController) -> Result<MatchReport> {
    let mut session = GameSession::new(0, config, red, blue)?;
    session.control(LifecycleCommand::Start)?;

    let (mut red_reward, mut blue_reward) = (0.0, 0.0);
    let (mut red_kills, mut blue_kills) = (0, 0);
    while let Some(result) = session.tick() {
        let Some(world) = session.world() else { break };
        for (id, reward) in &result.rewards {
            match world.drone(*id).map(|d| d.team) {
                Some(Team::Red) => red_reward += reward,
                Some(Team::Blue) => blue_reward += reward,
                None => {}
            }
        }
        for event in &result.info.events {
            if let CombatEvent::Kill { attacker, .. } = event {
                match world.drone(*attacker).map(|d| d.team) {
                    Some(Team::Red) => red_kills += 1,
                    Some(Team::Blue) => blue_kills += 1,
                    None => {}
                }
            }
        }
    }

    let world = session.world().ok_or_else(|| anyhow::anyhow!("session ended without a world"))?;
    Ok(MatchReport {
        outcome: world.outcome.unwrap_or(Outcome::Draw),
        steps: world.step,
        red_alive: world.alive_count(Team::Red),
        blue_alive: world.alive_count(Team::Blue),
        red_kills,
        blue_kills,
        red_reward,
        blue_reward,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ActorModel, RolePolicies};

    fn short_config() -> CombatConfig {
        CombatConfig::default().symmetric(1).time_limit(10).seed(4)
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut session = GameSession::new(1, short_config(), TeamController::Idle, TeamController::Idle).unwrap();
        assert_eq!(session.status(), SessionStatus::Created);
        assert!(session.world().is_none());

        assert_eq!(session.control(LifecycleCommand::Start).unwrap(), SessionStatus::Running);
        assert_eq!(session.control(LifecycleCommand::Pause).unwrap(), SessionStatus::Paused);
        assert_eq!(session.control(LifecycleCommand::Resume).unwrap(), SessionStatus::Running);
        assert_eq!(session.control(LifecycleCommand::Stop).unwrap(), SessionStatus::Stopped);
        assert!(session.world().is_none());
        assert_eq!(session.control(LifecycleCommand::Restart).unwrap(), SessionStatus::Running);
        assert!(session.world().is_some());
    }

    #[test]
    fn test_invalid_command_leaves_session_untouched() {
        let mut session = GameSession::new(2, short_config(), TeamController::Idle, TeamController::Idle).unwrap();
        let err = session.control(LifecycleCommand::Resume).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SkyBattleError>(),
            Some(&SkyBattleError::InvalidCommand { command: "Resume".into(), status: "Created".into() })
        );
        assert_eq!(session.status(), SessionStatus::Created);

        session.control(LifecycleCommand::Start).unwrap();
        assert!(session.control(LifecycleCommand::Start).is_err());
        assert_eq!(session.status(), SessionStatus::Running);
    }

    #[test]
    fn test_ticks_only_while_running() {
        let mut session = GameSession::new(3, short_config(), TeamController::Idle, TeamController::Idle).unwrap();
        assert!(session.tick().is_none());

        session.control(LifecycleCommand::Start).unwrap();
        assert!(session.tick().is_some());
        session.control(LifecycleCommand::Pause).unwrap();
        assert!(session.tick().is_none());
        assert_eq!(session.world().map(|w| w.step), Some(1));
    }

    #[test]
    fn test_snapshots_streamed_until_finished() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut session =
            GameSession::new(4, short_config(), TeamController::Idle, TeamController::Idle).unwrap().with_sink(tx);
        session.control(LifecycleCommand::Start).unwrap();
        let ticks = session.run_until_stopped();

        assert_eq!(ticks, 10);
        assert_eq!(session.status(), SessionStatus::Finished);
        let messages: Vec<SessionMessage> = rx.try_iter().collect();
        assert_eq!(messages.len(), 11);
        assert!(matches!(messages.last(), Some(SessionMessage::Finished { outcome: Outcome::Draw, steps: 10 })));
        assert!(session.control(LifecycleCommand::Pause).is_err());
    }

    #[test]
    fn test_restart_draws_a_fresh_seed() {
        let mut config = short_config();
        config.spawn.jitter = 20.0;
        let mut session = GameSession::new(6, config, TeamController::Idle, TeamController::Idle).unwrap();

        session.control(LifecycleCommand::Start).unwrap();
        session.tick();
        let first = session.world().map(|w| (w.seed, w.drones[0].position)).unwrap();
        session.control(LifecycleCommand::Restart).unwrap();
        let second = session.world().map(|w| (w.seed, w.drones[0].position)).unwrap();
        session.control(LifecycleCommand::Restart).unwrap();
        let third = session.world().map(|w| w.seed).unwrap();

        assert_eq!(session.world().map(|w| w.step), Some(0));
        assert_ne!(first.0, second.0);
        assert_ne!(second.0, third);
        assert_ne!(first.1, second.1);
    }

    #[test]
    fn test_seed_sequence_is_reproducible() {
        let seeds = || {
            let mut session = GameSession::new(7, short_config(), TeamController::Idle, TeamController::Idle).unwrap();
            session.control(LifecycleCommand::Start).unwrap();
            let mut seeds = vec![session.world().map(|w| w.seed).unwrap()];
            for _ in 0..3 {
                session.control(LifecycleCommand::Restart).unwrap();
                seeds.push(session.world().map(|w| w.seed).unwrap());
            }
            seeds
        };
        assert_eq!(seeds(), seeds());
    }

    #[test]
    fn test_policy_must_fit_team_size() {
        let mut rng = Pcg32::seed_from_u64(0);
        let wrong = ModelSignature::for_team_size(2);
        let policy = PolicySnapshot::new(0, RolePolicies::Shared(ActorModel::random(wrong.obs_dim, &[8], &mut rng)), None);
        let err = GameSession::new(5, short_config(), TeamController::Policy(policy), TeamController::Idle).unwrap_err();
        assert!(matches!(err.downcast_ref::<SkyBattleError>(), Some(SkyBattleError::SignatureMismatch { .. })));
    }

    #[test]
    fn test_play_match_is_reproducible() {
        let signature = ModelSignature::for_team_size(1);
        let mut rng = Pcg32::seed_from_u64(8);
        let policy = PolicySnapshot::new(0, RolePolicies::Shared(ActorModel::random(signature.obs_dim, &[8], &mut rng)), None);
        let config = CombatConfig::default().symmetric(1).time_limit(50).seed(12);

        let a = play_match(config.clone(), TeamController::Policy(policy.clone()), TeamController::Idle).unwrap();
        let b = play_match(config, TeamController::Policy(policy), TeamController::Idle).unwrap();
        assert_eq!(a, b);
        assert!(a.steps <= 50);
    }
}
