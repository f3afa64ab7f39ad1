//! Policy and value networks
//!
//! The pure-Rust models in [`actor`] are what rollouts and matches run on.
//! With the `training` feature, [`mlp`] holds the tch networks that are
//! optimized and periodically exported into these models.

pub mod actor;
pub mod distribution;

#[cfg(feature = "training")]
pub mod mlp;

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

pub use actor::{ActionDistribution, ActionSample, ActorModel, CriticModel};

use crate::env::combat::Role;

/// Mapping from drone role to the actor that controls it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolePolicies {
    /// One actor for every role
    Shared(ActorModel),
    PerRole { attacker: ActorModel, support: ActorModel },
}

impl RolePolicies {
    pub fn actor(&self, role: Role) -> &ActorModel {
        match (self, role) {
            (RolePolicies::Shared(actor), _) => actor,
            (RolePolicies::PerRole { attacker, .. }, Role::Attacker) => attacker,
            (RolePolicies::PerRole { support, .. }, Role::Support) => support,
        }
    }

    /// Distinct actors, attacker first
    pub fn actors(&self) -> Vec<&ActorModel> {
        match self {
            RolePolicies::Shared(actor) => vec![actor],
            RolePolicies::PerRole { attacker, support } => vec![attacker, support],
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, RolePolicies::Shared(_))
    }

    /// Observation length every actor expects, if they agree
    pub fn obs_dim(&self) -> Option<usize> {
        let dims: Vec<usize> = self.actors().iter().map(|a| a.obs_dim()).collect();
        dims.first().copied().filter(|d| dims.iter().all(|x| x == d))
    }

    pub fn is_consistent(&self) -> bool {
        self.actors().iter().all(|a| a.is_consistent())
    }
}

/// Immutable set of weights used for one collection batch
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    /// Number of updates the weights have seen
    pub version: u64,
    pub actors: Arc<RolePolicies>,
    pub critic: Option<Arc<CriticModel>>,
}

impl PolicySnapshot {
    pub fn new(version: u64, actors: RolePolicies, critic: Option<CriticModel>) -> Self {
        Self { version, actors: Arc::new(actors), critic: critic.map(Arc::new) }
    }

    /// Same actors without the critic, as stored in the opponent pool
    pub fn actors_only(&self) -> Self {
        Self { version: self.version, actors: Arc::clone(&self.actors), critic: None }
    }

    /// Sample an action for a drone and, given a state and a critic, its value
    pub fn act<R: Rng>(
        &self,
        obs: &[f32],
        state: Option<&[f32]>,
        role: Role,
        rng: &mut R,
    ) -> (ActionSample, Option<f32>) {
        let sample = self.actors.actor(role).act(obs, rng, false);
        let value = state.and_then(|s| self.value(s));
        (sample, value)
    }

    /// Mode of the action distribution
    pub fn act_deterministic(&self, obs: &[f32], role: Role) -> Vec<f32> {
        self.actors.actor(role).distribution(obs).mode()
    }

    pub fn value(&self, state: &[f32]) -> Option<f32> {
        self.critic.as_ref().map(|c| c.value(state))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    use super::*;

    fn per_role() -> RolePolicies {
        let mut rng = Pcg32::seed_from_u64(2);
        RolePolicies::PerRole {
            attacker: ActorModel::random(6, &[8], &mut rng),
            support: ActorModel::random(6, &[8], &mut rng),
        }
    }

    #[test]
    fn test_role_mapping() {
        let policies = per_role();
        let RolePolicies::PerRole { attacker, support } = &policies else {
            panic!("expected per-role policies");
        };
        assert_eq!(policies.actor(Role::Attacker), attacker);
        assert_eq!(policies.actor(Role::Support), support);
        assert_eq!(policies.actors().len(), 2);
        assert_eq!(policies.obs_dim(), Some(6));
    }

    #[test]
    fn test_shared_serves_all_roles() {
        let mut rng = Pcg32::seed_from_u64(4);
        let policies = RolePolicies::Shared(ActorModel::random(6, &[8], &mut rng));
        assert!(policies.is_shared());
        assert_eq!(policies.actor(Role::Attacker), policies.actor(Role::Support));
    }

    #[test]
    fn test_mismatched_actor_dims() {
        let mut rng = Pcg32::seed_from_u64(4);
        let policies = RolePolicies::PerRole {
            attacker: ActorModel::random(6, &[8], &mut rng),
            support: ActorModel::random(7, &[8], &mut rng),
        };
        assert_eq!(policies.obs_dim(), None);
    }

    #[test]
    fn test_snapshot_value_requires_critic() {
        let mut rng = Pcg32::seed_from_u64(8);
        let critic = CriticModel::random(10, &[8], &mut rng);
        let snapshot = PolicySnapshot::new(3, per_role(), Some(critic));

        let (sample, value) = snapshot.act(&[0.0; 6], Some(&[0.0; 10]), Role::Support, &mut rng);
        assert_eq!(sample.action.len(), crate::codec::ACTION_DIM);
        assert!(value.is_some());

        let frozen = snapshot.actors_only();
        assert_eq!(frozen.version, 3);
        assert!(frozen.value(&[0.0; 10]).is_none());
        assert!(Arc::ptr_eq(&frozen.actors, &snapshot.actors));
    }
}
