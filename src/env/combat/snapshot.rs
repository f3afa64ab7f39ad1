//! Serializable state snapshots for viewers
//!
//! Positions are in arena coordinates, orientation in radians.

use serde::{Deserialize, Serialize};

use super::{
    types::{DroneId, EntityId, Outcome, Role, Team},
    world::WorldState,
};

/// One drone as seen by a viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneView {
    pub id: DroneId,
    pub team: Team,
    pub role: Role,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    /// Roll, pitch, yaw
    pub orientation: [f32; 3],
    pub health: f32,
    pub shield: f32,
    pub alive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileView {
    pub id: EntityId,
    pub position: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissileView {
    pub id: EntityId,
    pub position: [f32; 3],
    pub target: Option<DroneId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlareView {
    pub id: EntityId,
    pub position: [f32; 3],
}

/// Full snapshot emitted once per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub step: u32,
    pub drones: Vec<DroneView>,
    pub projectiles: Vec<ProjectileView>,
    pub missiles: Vec<MissileView>,
    pub flares: Vec<FlareView>,
    pub outcome: Option<Outcome>,
}

impl StateSnapshot {
    /// Capture the current world
    pub fn capture(world: &WorldState) -> Self {
        Self {
            step: world.step,
            drones: world
                .drones
                .iter()
                .map(|d| DroneView {
                    id: d.id,
                    team: d.team,
                    role: d.role,
                    position: d.position.to_array(),
                    velocity: d.velocity.to_array(),
                    orientation: d.orientation.to_array(),
                    health: d.health,
                    shield: d.shield,
                    alive: d.alive,
                })
                .collect(),
            projectiles: world
                .projectiles
                .iter()
                .map(|p| ProjectileView { id: p.id, position: p.position.to_array() })
                .collect(),
            missiles: world
                .missiles
                .iter()
                .map(|m| MissileView { id: m.id, position: m.position.to_array(), target: m.target })
                .collect(),
            flares: world
                .flares
                .iter()
                .map(|f| FlareView { id: f.id, position: f.position.to_array() })
                .collect(),
            outcome: world.outcome,
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn alive_count(&self, team: Team) -> usize {
        self.drones.iter().filter(|d| d.team == team && d.alive).count()
    }
}
