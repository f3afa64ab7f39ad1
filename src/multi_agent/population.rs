//! Opponent pool for self-play
//!
//! Frozen snapshots of earlier learner policies, together with how the
//! learner has fared against each. The pool is read-only while a batch is
//! collected and replaced between batches.

use std::collections::VecDeque;

use super::messages::MatchResult;
use crate::policy::PolicySnapshot;

/// One frozen policy and its record against the learner
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub snapshot: PolicySnapshot,
    pub games: usize,
    pub learner_wins: usize,
    pub learner_losses: usize,
    pub draws: usize,
}

impl PoolEntry {
    fn new(snapshot: PolicySnapshot) -> Self {
        Self { snapshot, games: 0, learner_wins: 0, learner_losses: 0, draws: 0 }
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version
    }

    /// Share of games the learner won, counting draws as half; 0.5 before any game
    pub fn learner_win_rate(&self) -> f64 {
        if self.games == 0 {
            return 0.5;
        }
        (self.learner_wins as f64 + 0.5 * self.draws as f64) / self.games as f64
    }
}

/// Bounded pool of frozen opponents, oldest evicted first
#[derive(Debug, Clone)]
pub struct OpponentPool {
    entries: VecDeque<PoolEntry>,
    capacity: usize,
    snapshot_interval: u64,
}

impl OpponentPool {
    pub fn new(capacity: usize, snapshot_interval: u64) -> Self {
        Self { entries: VecDeque::with_capacity(capacity), capacity: capacity.max(1), snapshot_interval: snapshot_interval.max(1) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> impl Iterator<Item = &PoolEntry> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&PoolEntry> {
        self.entries.get(index)
    }

    pub fn find(&self, version: u64) -> Option<&PoolEntry> {
        self.entries.iter().find(|e| e.version() == version)
    }

    pub fn latest(&self) -> Option<&PoolEntry> {
        self.entries.back()
    }

    /// Whether the learner should be frozen after this many updates
    pub fn should_snapshot(&self, updates: u64) -> bool {
        updates > 0 && updates % self.snapshot_interval == 0
    }

    /// Freeze a policy; the critic is dropped. Returns the evicted version.
    pub fn push(&mut self, snapshot: PolicySnapshot) -> Option<u64> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front().map(|e| e.version())
        } else {
            None
        };
        tracing::debug!(version = snapshot.version, ?evicted, "added snapshot to opponent pool");
        self.entries.push_back(PoolEntry::new(snapshot.actors_only()));
        evicted
    }

    /// Record a finished game against a frozen opponent
    pub fn record_result(&mut self, version: u64, result: MatchResult) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.version() == version) {
            entry.games += 1;
            match result {
                MatchResult::Win => entry.learner_wins += 1,
                MatchResult::Loss => entry.learner_losses += 1,
                MatchResult::Draw => entry.draws += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    use super::*;
    use crate::policy::{ActorModel, CriticModel, RolePolicies};

    fn snapshot(version: u64) -> PolicySnapshot {
        let mut rng = Pcg32::seed_from_u64(version);
        PolicySnapshot::new(
            version,
            RolePolicies::Shared(ActorModel::random(4, &[4], &mut rng)),
            Some(CriticModel::random(6, &[4], &mut rng)),
        )
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut pool = OpponentPool::new(2, 5);
        assert_eq!(pool.push(snapshot(1)), None);
        assert_eq!(pool.push(snapshot(2)), None);
        assert_eq!(pool.push(snapshot(3)), Some(1));

        assert_eq!(pool.len(), 2);
        assert!(pool.find(1).is_none());
        assert_eq!(pool.latest().map(PoolEntry::version), Some(3));
    }

    #[test]
    fn test_frozen_snapshots_drop_critic() {
        let mut pool = OpponentPool::new(2, 1);
        pool.push(snapshot(1));
        assert!(pool.get(0).is_some_and(|e| e.snapshot.critic.is_none()));
    }

    #[test]
    fn test_snapshot_interval() {
        let pool = OpponentPool::new(4, 5);
        assert!(!pool.should_snapshot(0));
        assert!(!pool.should_snapshot(4));
        assert!(pool.should_snapshot(5));
        assert!(pool.should_snapshot(10));
    }

    #[test]
    fn test_record_results() {
        let mut pool = OpponentPool::new(4, 1);
        pool.push(snapshot(7));
        assert_eq!(pool.find(7).map(PoolEntry::learner_win_rate), Some(0.5));

        pool.record_result(7, MatchResult::Win);
        pool.record_result(7, MatchResult::Draw);
        pool.record_result(7, MatchResult::Loss);
        pool.record_result(99, MatchResult::Win);

        let entry = pool.find(7).unwrap();
        assert_eq!(entry.games, 3);
        assert!((entry.learner_win_rate() - 0.5).abs() < 1e-9);
    }
}
