//! Matchmaking strategies for self-play
//!
//! Decides which frozen policy from the opponent pool the learner faces in
//! the next episode. All strategies draw from a caller-owned seeded
//! generator so collection is reproducible.

use rand::Rng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::population::OpponentPool;

/// Trait for opponent selection strategies
pub trait Matchmaker: Send {
    /// Index into the pool of the next opponent, `None` when the pool is empty
    fn select(&mut self, pool: &OpponentPool, rng: &mut Pcg32) -> Option<usize>;
}

/// Matchmaking strategy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchmakingStrategy {
    /// Most recent snapshot
    Latest,
    /// Uniform over the pool
    #[default]
    Uniform,
    /// Cycle through the pool in order
    RoundRobin,
    /// Favour opponents the learner beats least
    Prioritized,
}

impl MatchmakingStrategy {
    /// Create a matchmaker instance from this strategy
    pub fn create_matchmaker(&self) -> Box<dyn Matchmaker> {
        match self {
            Self::Latest => Box::new(LatestMatchmaker),
            Self::Uniform => Box::new(UniformMatchmaker),
            Self::RoundRobin => Box::new(RoundRobinMatchmaker::new()),
            Self::Prioritized => Box::new(PrioritizedMatchmaker),
        }
    }
}

/// Always the newest snapshot
pub struct LatestMatchmaker;

impl Matchmaker for LatestMatchmaker {
    fn select(&mut self, pool: &OpponentPool, _rng: &mut Pcg32) -> Option<usize> {
        pool.len().checked_sub(1)
    }
}

/// Uniformly random snapshot
pub struct UniformMatchmaker;

impl Matchmaker for UniformMatchmaker {
    fn select(&mut self, pool: &OpponentPool, rng: &mut Pcg32) -> Option<usize> {
        (!pool.is_empty()).then(|| rng.gen_range(0..pool.len()))
    }
}

/// Round-robin over the pool
pub struct RoundRobinMatchmaker {
    current_round: usize,
}

impl RoundRobinMatchmaker {
    pub fn new() -> Self {
        Self { current_round: 0 }
    }
}

impl Default for RoundRobinMatchmaker {
    fn default() -> Self {
        Self::new()
    }
}

impl Matchmaker for RoundRobinMatchmaker {
    fn select(&mut self, pool: &OpponentPool, _rng: &mut Pcg32) -> Option<usize> {
        if pool.is_empty() {
            return None;
        }
        let index = self.current_round % pool.len();
        self.current_round += 1;
        Some(index)
    }
}

/// Sample opponents in proportion to how rarely the learner beats them
pub struct PrioritizedMatchmaker;

impl Matchmaker for PrioritizedMatchmaker {
    fn select(&mut self, pool: &OpponentPool, rng: &mut Pcg32) -> Option<usize> {
        if pool.is_empty() {
            return None;
        }
        // Floor keeps every opponent reachable
        let weights: Vec<f64> = pool.entries().map(|e| (1.0 - e.learner_win_rate()).max(0.05)).collect();
        let total: f64 = weights.iter().sum();
        let mut pick = rng.gen_range(0.0..total);
        for (i, w) in weights.iter().enumerate() {
            if pick < *w {
                return Some(i);
            }
            pick -= w;
        }
        Some(weights.len() - 1)
    }
}

/// Who the learner plays in an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opponent {
    /// The live policy itself
    Current,
    /// A frozen snapshot, by version
    Frozen(u64),
}

/// Combines a strategy with the chance of playing the live policy
pub struct OpponentSelector {
    matchmaker: Box<dyn Matchmaker>,
    current_policy_prob: f64,
}

impl OpponentSelector {
    pub fn new(strategy: MatchmakingStrategy, current_policy_prob: f64) -> Self {
        Self { matchmaker: strategy.create_matchmaker(), current_policy_prob: current_policy_prob.clamp(0.0, 1.0) }
    }

    /// Pick the next opponent; an empty pool means playing the live policy
    pub fn next_opponent(&mut self, pool: &OpponentPool, rng: &mut Pcg32) -> Opponent {
        if pool.is_empty() || rng.gen_bool(self.current_policy_prob) {
            return Opponent::Current;
        }
        match self.matchmaker.select(pool, rng).and_then(|i| pool.get(i)) {
            Some(entry) => Opponent::Frozen(entry.version()),
            None => Opponent::Current,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::{
        multi_agent::messages::MatchResult,
        policy::{ActorModel, PolicySnapshot, RolePolicies},
    };

    fn create_test_pool(size: u64) -> OpponentPool {
        let mut rng = Pcg32::seed_from_u64(0);
        let mut pool = OpponentPool::new(10, 1);
        for version in 1..=size {
            let actor = ActorModel::random(4, &[4], &mut rng);
            pool.push(PolicySnapshot::new(version, RolePolicies::Shared(actor), None));
        }
        pool
    }

    #[test]
    fn test_empty_pool_has_no_opponent() {
        let pool = OpponentPool::new(4, 1);
        let mut rng = Pcg32::seed_from_u64(1);
        for strategy in [
            MatchmakingStrategy::Latest,
            MatchmakingStrategy::Uniform,
            MatchmakingStrategy::RoundRobin,
            MatchmakingStrategy::Prioritized,
        ] {
            assert_eq!(strategy.create_matchmaker().select(&pool, &mut rng), None);
            assert_eq!(OpponentSelector::new(strategy, 0.0).next_opponent(&pool, &mut rng), Opponent::Current);
        }
    }

    #[test]
    fn test_latest_matchmaker() {
        let pool = create_test_pool(3);
        let mut mm = LatestMatchmaker;
        assert_eq!(mm.select(&pool, &mut Pcg32::seed_from_u64(0)), Some(2));
    }

    #[test]
    fn test_round_robin_matchmaker() {
        let pool = create_test_pool(3);
        let mut mm = RoundRobinMatchmaker::new();
        let mut rng = Pcg32::seed_from_u64(0);
        let picks: Vec<_> = (0..4).filter_map(|_| mm.select(&pool, &mut rng)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_uniform_is_seeded() {
        let pool = create_test_pool(5);
        let draw = |seed| {
            let mut rng = Pcg32::seed_from_u64(seed);
            (0..10).filter_map(|_| UniformMatchmaker.select(&pool, &mut rng)).collect::<Vec<_>>()
        };
        assert_eq!(draw(9), draw(9));
        assert!(draw(9).iter().all(|&i| i < 5));
    }

    #[test]
    fn test_prioritized_prefers_hard_opponents() {
        let mut pool = create_test_pool(2);
        for _ in 0..20 {
            pool.record_result(1, MatchResult::Win);
            pool.record_result(2, MatchResult::Loss);
        }

        let mut rng = Pcg32::seed_from_u64(3);
        let mut mm = PrioritizedMatchmaker;
        let hard = (0..1000).filter(|_| mm.select(&pool, &mut rng) == Some(1)).count();
        assert!(hard > 800, "picked the hard opponent {hard} times");
    }

    #[test]
    fn test_selector_current_probability() {
        let pool = create_test_pool(3);
        let mut rng = Pcg32::seed_from_u64(4);

        let mut always = OpponentSelector::new(MatchmakingStrategy::Uniform, 1.0);
        assert!((0..20).all(|_| always.next_opponent(&pool, &mut rng) == Opponent::Current));

        let mut never = OpponentSelector::new(MatchmakingStrategy::Latest, 0.0);
        assert!((0..20).all(|_| never.next_opponent(&pool, &mut rng) == Opponent::Frozen(3)));
    }
}
