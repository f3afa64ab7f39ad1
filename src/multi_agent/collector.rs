//! Rollout collection for self-play
//!
//! Runs a pool of combat engines against the opponent pool and turns the
//! learner team's decisions into per-agent trajectories. Each collection
//! call uses one immutable policy snapshot; every engine advances at most
//! one tick per iteration and the engines step in parallel.

use std::{cell::Cell, collections::BTreeMap, mem};

use anyhow::Result;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::{
    environment::JointAction,
    matchmaking::{Opponent, OpponentSelector},
    messages::{EpisodeSummary, MatchResult},
    population::OpponentPool,
};
use crate::{
    buffer::{RolloutBuffer, Trajectory, Transition},
    codec::ObservationCodec,
    env::{
        combat::{CombatConfig, CombatEnv, DroneId, Team},
        pool::EnvPool,
    },
    error::SkyBattleError,
    policy::PolicySnapshot,
};

/// When a collection call stops; zero means no limit on that count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectTarget {
    pub transitions: usize,
    pub episodes: usize,
}

impl CollectTarget {
    pub fn transitions(transitions: usize) -> Self {
        Self { transitions, episodes: 0 }
    }

    pub fn episodes(episodes: usize) -> Self {
        Self { transitions: 0, episodes }
    }

    fn reached(&self, transitions: usize, episodes: usize) -> bool {
        (self.transitions > 0 && transitions >= self.transitions) || (self.episodes > 0 && episodes >= self.episodes)
    }

    fn is_unbounded(&self) -> bool {
        self.transitions == 0 && self.episodes == 0
    }
}

/// Output of one collection call
#[derive(Debug, Clone, Default)]
pub struct CollectedBatch {
    pub buffer: RolloutBuffer,
    pub episodes: Vec<EpisodeSummary>,
    /// Engine ticks taken
    pub steps: u64,
}

#[derive(Debug)]
struct Slot {
    learner: Team,
    opponent: Opponent,
    trajectories: BTreeMap<DroneId, Trajectory>,
    episode_reward: f32,
}

/// Parallel engines plus per-slot episode bookkeeping
pub struct RolloutCollector {
    envs: EnvPool<CombatEnv>,
    codec: ObservationCodec,
    /// Action sampling, one generator per slot
    rngs: Vec<Pcg32>,
    slots: Vec<Slot>,
    matchmaking_rng: Pcg32,
    episodes: usize,
    steps: u64,
}

impl RolloutCollector {
    /// Create `num_envs` engines with distinct seeds derived from `seed`
    pub fn new(config: CombatConfig, num_envs: usize, seed: u64) -> Result<Self> {
        if num_envs == 0 {
            return Err(SkyBattleError::config("num_envs must be positive").into());
        }
        config.validate()?;
        let codec = ObservationCodec::from_config(&config);

        let next = Cell::new(0u64);
        let envs = EnvPool::new(
            || {
                let index = next.get();
                next.set(index + 1);
                CombatEnv::new(config.clone().seed(slot_seed(seed, index)))
            },
            num_envs,
        )?;

        let rngs = (0..num_envs as u64).map(|i| Pcg32::seed_from_u64(slot_seed(seed ^ 0xA5A5, i))).collect();
        // Sides alternate from the start so both get played
        let slots = (0..num_envs)
            .map(|i| Slot {
                learner: if i % 2 == 0 { Team::Red } else { Team::Blue },
                opponent: Opponent::Current,
                trajectories: BTreeMap::new(),
                episode_reward: 0.0,
            })
            .collect();

        tracing::info!(num_envs, team_size = codec.team_size(), "created rollout collector");
        Ok(Self {
            envs,
            codec,
            rngs,
            slots,
            matchmaking_rng: Pcg32::seed_from_u64(seed.wrapping_add(1)),
            episodes: 0,
            steps: 0,
        })
    }

    pub fn num_envs(&self) -> usize {
        self.envs.num_envs()
    }

    pub fn codec(&self) -> &ObservationCodec {
        &self.codec
    }

    pub fn env(&self, index: usize) -> &CombatEnv {
        self.envs.env(index)
    }

    /// Episodes finished over the collector's lifetime
    pub fn episodes_completed(&self) -> usize {
        self.episodes
    }

    /// Engine ticks over the collector's lifetime
    pub fn total_steps(&self) -> u64 {
        self.steps
    }

    /// Collect experience for the learner until `target` is reached
    ///
    /// Trajectories still open at the end are closed with a bootstrap value
    /// from the snapshot's critic.
    pub fn collect(
        &mut self,
        learner: &PolicySnapshot,
        pool: &OpponentPool,
        selector: &mut OpponentSelector,
        target: CollectTarget,
    ) -> CollectedBatch {
        let mut batch = CollectedBatch::default();
        if target.is_unbounded() {
            return batch;
        }
        let mut transitions = 0;

        while !target.reached(transitions, batch.episodes.len()) {
            // Decisions for every alive drone in every engine
            let mut actions = Vec::with_capacity(self.num_envs());
            let mut pending = Vec::with_capacity(self.num_envs());
            for (i, env) in self.envs.envs().iter().enumerate() {
                let world = env.world();
                let slot = &self.slots[i];
                let rng = &mut self.rngs[i];
                let opponent = resolve_opponent(slot.opponent, learner, pool);

                let mut joint = JointAction::new();
                let mut decisions = Vec::new();
                for drone in world.drones.iter().filter(|d| d.alive) {
                    let obs = self.codec.encode_observation(world, drone.id);
                    if drone.team == slot.learner {
                        let state = self.codec.encode_state(world, drone.id);
                        let (sample, value) = learner.act(&obs, Some(&state), drone.role, rng);
                        joint.insert(drone.id, sample.action.clone());
                        decisions.push((drone.id, Transition {
                            obs,
                            state,
                            action: sample.action,
                            reward: 0.0,
                            done: false,
                            log_prob: sample.log_prob,
                            value: value.unwrap_or(0.0),
                            role: drone.role,
                        }));
                    } else {
                        let (sample, _) = opponent.act(&obs, None, drone.role, rng);
                        joint.insert(drone.id, sample.action);
                    }
                }
                actions.push(joint);
                pending.push(decisions);
            }

            let results = self.envs.step(&actions);
            self.steps += results.len() as u64;
            batch.steps += results.len() as u64;

            for (i, (result, decisions)) in results.into_iter().zip(pending).enumerate() {
                let world = self.envs.env(i).world();
                let slot = &mut self.slots[i];

                // The outcome term still reaches drones that died earlier
                if result.done {
                    for (id, trajectory) in slot.trajectories.iter_mut() {
                        if trajectory.is_terminal() {
                            if let (Some(r), Some(last)) = (result.rewards.get(id), trajectory.transitions.last_mut()) {
                                last.reward += r;
                            }
                        }
                    }
                }

                for (id, mut transition) in decisions {
                    transition.reward = result.rewards.get(&id).copied().unwrap_or(0.0);
                    transition.done = result.done || !world.drone(id).is_some_and(|d| d.alive);
                    slot.trajectories.entry(id).or_insert_with(|| Trajectory::new(id)).push(transition);
                    transitions += 1;
                }
                slot.episode_reward += world.team(slot.learner).filter_map(|d| result.rewards.get(&d.id)).sum::<f32>();

                if result.done {
                    let summary = EpisodeSummary {
                        episode: self.episodes,
                        total_reward: slot.episode_reward,
                        steps: world.step,
                        winner: world.outcome.and_then(|o| o.winner()),
                        learner_team: slot.learner,
                        opponent: slot.opponent,
                        result: MatchResult::for_team(world.outcome, slot.learner),
                    };
                    tracing::debug!(
                        episode = summary.episode,
                        steps = summary.steps,
                        reward = summary.total_reward,
                        result = ?summary.result,
                        "episode finished"
                    );

                    for (_, trajectory) in mem::take(&mut slot.trajectories) {
                        batch.buffer.push_trajectory(trajectory);
                    }
                    slot.episode_reward = 0.0;
                    slot.learner = slot.learner.opponent();
                    slot.opponent = selector.next_opponent(pool, &mut self.matchmaking_rng);
                    self.episodes += 1;
                    batch.episodes.push(summary);
                    self.envs.reset_env(i, None);
                }
            }
        }

        // Close whatever is still open
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let world = self.envs.env(i).world();
            for (id, mut trajectory) in mem::take(&mut slot.trajectories) {
                if !trajectory.is_terminal() {
                    trajectory.last_value = learner.value(&self.codec.encode_state(world, id)).unwrap_or(0.0);
                }
                batch.buffer.push_trajectory(trajectory);
            }
        }

        batch
    }
}

fn slot_seed(seed: u64, index: u64) -> u64 {
    seed.wrapping_add(index.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn resolve_opponent<'a>(opponent: Opponent, learner: &'a PolicySnapshot, pool: &'a OpponentPool) -> &'a PolicySnapshot {
    match opponent {
        Opponent::Current => learner,
        Opponent::Frozen(version) => pool.find(version).map_or(learner, |entry| &entry.snapshot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::ModelSignature,
        env::combat::{BoundaryPolicy, RewardWeights},
        multi_agent::matchmaking::MatchmakingStrategy,
        policy::{ActorModel, CriticModel, RolePolicies},
    };

    fn learner(team_size: usize) -> PolicySnapshot {
        let signature = ModelSignature::for_team_size(team_size);
        let mut rng = Pcg32::seed_from_u64(17);
        PolicySnapshot::new(
            0,
            RolePolicies::Shared(ActorModel::random(signature.obs_dim, &[16], &mut rng)),
            Some(CriticModel::random(signature.state_dim, &[16], &mut rng)),
        )
    }

    fn collector(seed: u64) -> RolloutCollector {
        let config = CombatConfig::default().symmetric(2).time_limit(20);
        RolloutCollector::new(config, 2, seed).unwrap()
    }

    #[test]
    fn test_zero_envs_rejected() {
        let err = RolloutCollector::new(CombatConfig::default(), 0, 0).err().unwrap();
        assert!(err.downcast_ref::<SkyBattleError>().is_some());
    }

    #[test]
    fn test_collect_episodes() {
        let mut collector = collector(3);
        let snapshot = learner(2);
        let pool = OpponentPool::new(4, 1);
        let mut selector = OpponentSelector::new(MatchmakingStrategy::Uniform, 0.0);

        let batch = collector.collect(&snapshot, &pool, &mut selector, CollectTarget::episodes(2));

        assert!(batch.episodes.len() >= 2);
        assert_eq!(collector.episodes_completed(), batch.episodes.len());
        assert!(batch.steps > 0);
        assert!(!batch.buffer.is_empty());

        let obs_dim = collector.codec().obs_dim();
        let state_dim = collector.codec().state_dim();
        for trajectory in batch.buffer.trajectories() {
            assert!(trajectory.transitions.iter().all(|t| t.obs.len() == obs_dim && t.state.len() == state_dim));
            // Steps are chronological, so only the last one can be terminal
            let n = trajectory.len();
            assert!(trajectory.transitions[..n - 1].iter().all(|t| !t.done));
        }
    }

    #[test]
    fn test_sides_alternate() {
        let mut collector = collector(5);
        let snapshot = learner(2);
        let pool = OpponentPool::new(4, 1);
        let mut selector = OpponentSelector::new(MatchmakingStrategy::Latest, 1.0);

        let batch = collector.collect(&snapshot, &pool, &mut selector, CollectTarget::episodes(4));
        let red = batch.episodes.iter().filter(|e| e.learner_team == Team::Red).count();
        let blue = batch.episodes.iter().filter(|e| e.learner_team == Team::Blue).count();
        assert!(red > 0 && blue > 0);
        assert!(batch.episodes.iter().all(|e| e.opponent == Opponent::Current));
    }

    #[test]
    fn test_transition_target_bootstraps() {
        let mut collector = collector(7);
        let snapshot = learner(2);
        let pool = OpponentPool::new(4, 1);
        let mut selector = OpponentSelector::new(MatchmakingStrategy::Uniform, 0.5);

        // Five ticks with two learner drones per engine
        let batch = collector.collect(&snapshot, &pool, &mut selector, CollectTarget::transitions(20));
        assert_eq!(batch.buffer.len(), 20);
        assert!(batch.episodes.is_empty());
        assert!(batch.buffer.trajectories().iter().all(|t| !t.is_terminal()));
        assert!(batch.buffer.trajectories().iter().any(|t| t.last_value != 0.0));
    }

    #[test]
    fn test_collection_is_deterministic() {
        let run = |seed| {
            let mut collector = collector(seed);
            let mut selector = OpponentSelector::new(MatchmakingStrategy::Uniform, 0.5);
            let batch = collector.collect(&learner(2), &OpponentPool::new(4, 1), &mut selector, CollectTarget::episodes(2));
            batch.buffer.into_batch(0.99, 0.95, false)
        };
        let (a, b) = (run(11), run(11));
        assert_eq!(a.rewards, b.rewards);
        assert_eq!(a.actions, b.actions);
        assert_eq!(a.observations, b.observations);
    }

    #[test]
    fn test_dead_drones_stop_earning() {
        // Survival is the only reward, so no transition can earn more than one tick of it
        let rewards = RewardWeights {
            survival: 1.0,
            damage_dealt: 0.0,
            damage_taken: 0.0,
            kill: 0.0,
            death: 0.0,
            win: 0.0,
            loss: 0.0,
            draw: 0.0,
            team_weight: 0.5,
        };
        let mut config =
            CombatConfig::default().symmetric(2).time_limit(60).boundary(BoundaryPolicy::Destroy).rewards(rewards);
        // Spawned just above the floor, drones crash as soon as they dip
        config.spawn.altitude = 2.0;
        let mut collector = RolloutCollector::new(config, 2, 19).unwrap();
        let mut selector = OpponentSelector::new(MatchmakingStrategy::Latest, 1.0);

        let batch = collector.collect(&learner(2), &OpponentPool::new(4, 1), &mut selector, CollectTarget::episodes(4));
        for trajectory in batch.buffer.trajectories() {
            for transition in &trajectory.transitions {
                assert!((0.0..=1.0 + 1e-5).contains(&transition.reward), "reward {}", transition.reward);
            }
        }
    }

    #[test]
    fn test_frozen_opponent_is_used() {
        let mut collector = collector(13);
        let snapshot = learner(2);
        let mut pool = OpponentPool::new(4, 1);
        pool.push(learner(2));
        let mut selector = OpponentSelector::new(MatchmakingStrategy::Latest, 0.0);

        let batch = collector.collect(&snapshot, &pool, &mut selector, CollectTarget::episodes(4));
        // The first episode in each slot starts against the live policy
        assert!(batch.episodes.iter().any(|e| e.opponent == Opponent::Frozen(0)));
    }
}
