//! Observation and centralized state encoding
//!
//! Layouts are fixed per team size so networks can be built once. Slots for
//! allies and enemies are ordered by drone id; a slot whose drone is dead,
//! out of sensor range or missing is all zeros.

use std::f32::consts::PI;

use glam::Vec3;

use crate::env::combat::{CombatConfig, Drone, DroneId, Role, Team, WorldState};

/// Features describing the observing drone itself
pub const SELF_FEATURES: usize = 14;
/// Features per ally slot
pub const ALLY_FEATURES: usize = 9;
/// Features per enemy slot
pub const ENEMY_FEATURES: usize = 11;
/// Arena position, time remaining and role one-hot
pub const CONTEXT_FEATURES: usize = 3 + 1 + Role::COUNT;
/// Features per drone slot in the centralized state
pub const STATE_SLOT_FEATURES: usize = 15;

/// Encoder for local observations and centralized critic states
#[derive(Debug, Clone)]
pub struct ObservationCodec {
    team_size: usize,
    max_speed: f32,
    sensor_range: f32,
    max_health: f32,
    max_shield: f32,
    max_energy: f32,
    max_ammo: f32,
    max_missiles: f32,
}

impl ObservationCodec {
    /// Codec with default normalization constants
    pub fn new(team_size: usize) -> Self {
        Self::from_config(&CombatConfig::default().symmetric(team_size))
    }

    /// Codec using a configuration's limits; the layout uses the larger team
    pub fn from_config(config: &CombatConfig) -> Self {
        let limits = &config.drone;
        Self {
            team_size: config.team_size(),
            max_speed: limits.max_speed,
            sensor_range: config.sensor_range,
            max_health: limits.max_health,
            max_shield: limits.max_shield.max(f32::EPSILON),
            max_energy: limits.max_energy.max(f32::EPSILON),
            max_ammo: (limits.max_ammo as f32).max(1.0),
            max_missiles: (limits.max_missiles as f32).max(1.0),
        }
    }

    pub fn team_size(&self) -> usize {
        self.team_size
    }

    /// Length of a local observation
    pub fn obs_dim(&self) -> usize {
        let n = self.team_size;
        SELF_FEATURES + ALLY_FEATURES * n.saturating_sub(1) + ENEMY_FEATURES * n + CONTEXT_FEATURES
    }

    /// Length of a centralized state vector
    pub fn state_dim(&self) -> usize {
        let n = self.team_size;
        2 * n * STATE_SLOT_FEATURES + 1 + n
    }

    /// Encode the local observation of one drone
    ///
    /// A dead or unknown drone gets an all-zero observation.
    pub fn encode_observation(&self, world: &WorldState, id: DroneId) -> Vec<f32> {
        let mut obs = Vec::with_capacity(self.obs_dim());
        let Some(me) = world.alive_drone(id) else {
            return vec![0.0; self.obs_dim()];
        };

        let center = world.arena.center();
        let half = world.arena.half_extent();

        // Self
        push_vec3(&mut obs, (me.position - center) / half);
        push_vec3(&mut obs, me.velocity / self.max_speed);
        push_vec3(&mut obs, me.orientation / PI);
        self.push_resources(&mut obs, me);

        // Allies then enemies, each in id order
        let allies = world.team(me.team).filter(|d| d.id != me.id);
        self.push_slots(&mut obs, me, allies, self.team_size.saturating_sub(1), ALLY_FEATURES);
        let enemies = world.team(me.team.opponent());
        self.push_slots(&mut obs, me, enemies, self.team_size, ENEMY_FEATURES);

        // Context
        push_vec3(&mut obs, world.arena.normalized(me.position));
        obs.push(world.time_remaining());
        let mut role = [0.0; Role::COUNT];
        role[me.role.index()] = 1.0;
        obs.extend_from_slice(&role);

        debug_assert_eq!(obs.len(), self.obs_dim());
        obs
    }

    /// Encode the centralized state from one agent's perspective
    ///
    /// Own-team slots come first, then enemy slots, then time remaining and a
    /// one-hot of the agent's index within its team.
    pub fn encode_state(&self, world: &WorldState, id: DroneId) -> Vec<f32> {
        let mut state = Vec::with_capacity(self.state_dim());
        let Some(me) = world.drone(id) else {
            return vec![0.0; self.state_dim()];
        };
        let team = me.team;

        for side in [team, team.opponent()] {
            let mut written = 0;
            for drone in world.team(side).take(self.team_size) {
                self.push_state_slot(&mut state, world, drone);
                written += 1;
            }
            state.resize(state.len() + (self.team_size - written) * STATE_SLOT_FEATURES, 0.0);
        }

        state.push(world.time_remaining());
        let mut index = vec![0.0; self.team_size];
        if let Some(slot) = team_index(world, team, id) {
            if slot < self.team_size {
                index[slot] = 1.0;
            }
        }
        state.extend_from_slice(&index);

        debug_assert_eq!(state.len(), self.state_dim());
        state
    }

    fn push_resources(&self, out: &mut Vec<f32>, drone: &Drone) {
        out.push(drone.health / self.max_health);
        out.push(drone.shield / self.max_shield);
        out.push(drone.energy / self.max_energy);
        out.push(drone.ammo as f32 / self.max_ammo);
        out.push(drone.missiles as f32 / self.max_missiles);
    }

    fn push_slots<'a>(
        &self,
        out: &mut Vec<f32>,
        me: &Drone,
        others: impl Iterator<Item = &'a Drone>,
        slots: usize,
        width: usize,
    ) {
        let mut written = 0;
        for other in others.take(slots) {
            let offset = other.position - me.position;
            let distance = offset.length();
            if other.alive && distance <= self.sensor_range {
                out.push(1.0);
                push_vec3(out, offset / self.sensor_range);
                push_vec3(out, (other.velocity - me.velocity) / self.max_speed);
                out.push(other.health / self.max_health);
                out.push(distance / self.sensor_range);
                if width == ENEMY_FEATURES {
                    let bearing = if distance > f32::EPSILON {
                        me.forward().angle_between(offset / distance)
                    } else {
                        0.0
                    };
                    out.push(bearing / PI);
                    out.push(other.shield / self.max_shield);
                }
            } else {
                out.resize(out.len() + width, 0.0);
            }
            written += 1;
        }
        out.resize(out.len() + (slots - written) * width, 0.0);
    }

    fn push_state_slot(&self, out: &mut Vec<f32>, world: &WorldState, drone: &Drone) {
        if !drone.alive {
            out.resize(out.len() + STATE_SLOT_FEATURES, 0.0);
            return;
        }
        out.push(1.0);
        push_vec3(out, (drone.position - world.arena.center()) / world.arena.half_extent());
        push_vec3(out, drone.velocity / self.max_speed);
        push_vec3(out, drone.orientation / PI);
        self.push_resources(out, drone);
    }
}

/// Position of a drone within its team, in id order
pub fn team_index(world: &WorldState, team: Team, id: DroneId) -> Option<usize> {
    world.team(team).position(|d| d.id == id)
}

fn push_vec3(out: &mut Vec<f32>, v: Vec3) {
    out.extend_from_slice(&v.to_array());
}
