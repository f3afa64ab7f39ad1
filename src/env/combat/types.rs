//! Basic types for the combat environment
//!
//! Teams, roles, identifiers, episode outcomes and the per-tick event log.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a drone within an episode
///
/// Red drones are numbered first, then blue, so ids double as indices into
/// the world's drone table.
pub type DroneId = u32;

/// Identifier of a transient entity (gun round, missile, flare)
pub type EntityId = u32;

/// Side a drone fights for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    /// The opposing team
    pub fn opponent(self) -> Self {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }

    /// Both teams in id order
    pub fn all() -> [Team; 2] {
        [Team::Red, Team::Blue]
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Team::Red => write!(f, "red"),
            Team::Blue => write!(f, "blue"),
        }
    }
}

/// Tactical role assigned at spawn
///
/// Roles are metadata for policy selection only; they do not change physics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Attacker,
    Support,
}

impl Role {
    /// Index used for one-hot encodings
    pub fn index(self) -> usize {
        match self {
            Role::Attacker => 0,
            Role::Support => 1,
        }
    }

    /// Number of distinct roles
    pub const COUNT: usize = 2;
}

/// Final result of an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win(Team),
    Draw,
}

impl Outcome {
    /// Winning team, if any
    pub fn winner(self) -> Option<Team> {
        match self {
            Outcome::Win(team) => Some(team),
            Outcome::Draw => None,
        }
    }
}

/// Weapon that produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeaponKind {
    Gun,
    Missile,
    Splash,
    /// Contact with the arena floor
    Ground,
}

/// Something notable that happened during a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CombatEvent {
    /// Damage landed on a drone
    Hit { attacker: DroneId, target: DroneId, weapon: WeaponKind, damage: f32 },
    /// A drone was destroyed by an enemy
    Kill { attacker: DroneId, target: DroneId },
    /// A drone was destroyed by the arena (floor or boundary)
    Crash { drone: DroneId },
    /// A missile lost its lock and continues unguided
    LockLost { missile: EntityId },
    /// A missile was removed without hitting anything
    SelfDestruct { missile: EntityId },
}
