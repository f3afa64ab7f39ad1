//! Multi-drone aerial combat environment
//!
//! Two teams of drones fight inside a bounded 3D arena.
//! - Fixed timestep physics with bounded speed and turn rates
//! - Guns, guided missiles with a bounded turn rate, and decoy flares
//! - Shields absorb damage before health
//! - The episode ends when a team is eliminated or the time limit is reached
//!
//! Everything is deterministic given the configuration, the episode seed and
//! the action sequence.

pub use arena::{Arena, BoundaryContact};
pub use config::{
    ArenaConfig, BoundaryPolicy, CombatConfig, DroneLimits, MissileFallback, RewardWeights,
    SpawnConfig, TimeLimitRule, WeaponConfig,
};
pub use drone::{ControlInput, Drone};
pub use engine::CombatEnv;
pub use reward::{compute_rewards, DroneDelta, TickDeltas};
pub use snapshot::StateSnapshot;
pub use types::{CombatEvent, DroneId, EntityId, Outcome, Role, Team, WeaponKind};
pub use weapons::{Flare, Missile, Projectile};
pub use world::WorldState;

pub mod arena;
pub mod config;
pub mod drone;
mod engine;
pub mod reward;
pub mod snapshot;
pub mod types;
pub mod weapons;
mod world;
