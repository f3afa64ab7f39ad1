//! Drone entity
//!
//! Kinematics, resource bookkeeping and damage for a single drone. Every
//! mutation ends with [`Drone::enforce_bounds`] so resources never leave
//! their ranges.

use std::f32::consts::PI;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{
    config::DroneLimits,
    types::{DroneId, Role, Team},
};

/// Per-tick control input after decoding and sanitization
///
/// Rates and throttle are in `[-1, 1]`; they are clamped again on entry to
/// the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlInput {
    pub throttle: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    pub boost: bool,
    pub fire_gun: bool,
    pub fire_missile: bool,
    pub deploy_flare: bool,
}

impl ControlInput {
    /// Input that does nothing
    pub fn idle() -> Self {
        Self::default()
    }

    /// Copy with every axis forced into `[-1, 1]` and NaN replaced by zero
    pub fn sanitized(self) -> Self {
        let axis = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) };
        Self {
            throttle: axis(self.throttle),
            pitch: axis(self.pitch),
            yaw: axis(self.yaw),
            roll: axis(self.roll),
            ..self
        }
    }
}

/// Result of applying damage to a drone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageReport {
    /// Damage absorbed by shield plus health lost
    pub applied: f32,
    /// True only for the hit that destroyed the drone
    pub killed: bool,
}

/// A combat drone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drone {
    pub id: DroneId,
    pub team: Team,
    pub role: Role,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Roll, pitch, yaw in radians, each in `[-π, π)`
    pub orientation: Vec3,
    pub health: f32,
    pub shield: f32,
    pub energy: f32,
    pub ammo: u32,
    pub missiles: u32,
    pub alive: bool,
    pub boosting: bool,
    pub missile_cooldown: u32,
    pub flare_cooldown: u32,
    /// Took damage during the previous tick; suppresses regeneration
    pub damaged_last_tick: bool,
    /// Took damage during the current tick
    pub damaged_this_tick: bool,
    pub damage_dealt: f32,
    pub damage_taken: f32,
    pub kills: u32,
    pub death_tick: Option<u32>,
    missile_regen_timer: u32,
}

impl Drone {
    /// Spawn a drone at full resources
    pub fn new(
        id: DroneId,
        team: Team,
        role: Role,
        position: Vec3,
        yaw: f32,
        limits: &DroneLimits,
    ) -> Self {
        Self {
            id,
            team,
            role,
            position,
            velocity: Vec3::ZERO,
            orientation: Vec3::new(0.0, 0.0, wrap_angle(yaw)),
            health: limits.max_health,
            shield: limits.max_shield,
            energy: limits.max_energy,
            ammo: limits.max_ammo,
            missiles: limits.max_missiles,
            alive: true,
            boosting: false,
            missile_cooldown: 0,
            flare_cooldown: 0,
            damaged_last_tick: false,
            damaged_this_tick: false,
            damage_dealt: 0.0,
            damage_taken: 0.0,
            kills: 0,
            death_tick: None,
            missile_regen_timer: 0,
        }
    }

    pub fn roll(&self) -> f32 {
        self.orientation.x
    }

    pub fn pitch(&self) -> f32 {
        self.orientation.y
    }

    pub fn yaw(&self) -> f32 {
        self.orientation.z
    }

    /// Unit vector along the nose
    pub fn forward(&self) -> Vec3 {
        let (pitch, yaw) = (self.pitch(), self.yaw());
        Vec3::new(pitch.cos() * yaw.cos(), pitch.cos() * yaw.sin(), pitch.sin())
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Integrate one tick of flight (semi-implicit Euler)
    pub fn apply_control(&mut self, input: &ControlInput, limits: &DroneLimits, dt: f32) {
        let input = input.sanitized();

        self.missile_cooldown = self.missile_cooldown.saturating_sub(1);
        self.flare_cooldown = self.flare_cooldown.saturating_sub(1);

        let rates = Vec3::new(input.roll, input.pitch, input.yaw) * limits.max_turn_rate;
        let orientation = self.orientation + rates * dt;
        self.orientation = Vec3::new(
            wrap_angle(orientation.x),
            wrap_angle(orientation.y),
            wrap_angle(orientation.z),
        );

        self.boosting = input.boost && self.energy >= limits.boost_cost * dt;
        let boost = if self.boosting { limits.boost_multiplier } else { 1.0 };

        let thrust = self.forward() * input.throttle * limits.max_acceleration * boost;
        let drag = self.velocity * self.speed() * limits.drag;
        let acceleration = thrust - drag;

        self.velocity += acceleration * dt;
        self.velocity = self.velocity.clamp_length_max(limits.max_speed);
        self.position += self.velocity * dt;
    }

    /// Boost drain and passive regeneration for one tick
    pub fn regenerate(&mut self, limits: &DroneLimits, dt: f32) {
        if self.boosting {
            self.energy -= limits.boost_cost * dt;
        } else if !self.damaged_last_tick {
            let mut rate = limits.energy_regen;
            if self.speed() < limits.slow_speed_threshold {
                rate *= limits.slow_regen_multiplier;
            }
            self.energy += rate * dt;
        }

        if !self.damaged_last_tick {
            self.shield += limits.shield_regen * dt;
        }

        if let Some(period) = limits.missile_regen_ticks {
            if self.missiles < limits.max_missiles {
                self.missile_regen_timer += 1;
                if self.missile_regen_timer >= period {
                    self.missile_regen_timer = 0;
                    self.missiles += 1;
                }
            } else {
                self.missile_regen_timer = 0;
            }
        }

        self.enforce_bounds(limits);
    }

    /// Apply damage, shield first
    ///
    /// Returns what was actually applied. A drone that is already dead
    /// absorbs nothing.
    pub fn take_damage(&mut self, amount: f32, tick: u32, limits: &DroneLimits) -> DamageReport {
        if !self.alive || !(amount > 0.0) {
            return DamageReport { applied: 0.0, killed: false };
        }

        let absorbed = amount.min(self.shield);
        self.shield -= absorbed;
        let overflow = amount - absorbed;
        let health_lost = overflow.min(self.health);
        self.health -= overflow;

        self.damaged_this_tick = true;
        self.damage_taken += absorbed + health_lost;

        let killed = self.health <= 0.0;
        if killed {
            self.kill(tick);
        }
        self.enforce_bounds(limits);

        DamageReport { applied: absorbed + health_lost, killed }
    }

    /// Mark the drone destroyed; later calls are no-ops
    pub fn kill(&mut self, tick: u32) {
        if !self.alive {
            return;
        }
        self.alive = false;
        self.health = 0.0;
        self.velocity = Vec3::ZERO;
        self.boosting = false;
        self.death_tick = Some(tick);
    }

    /// Roll the per-tick damage flag over at the start of a tick
    pub fn begin_tick(&mut self) {
        self.damaged_last_tick = self.damaged_this_tick;
        self.damaged_this_tick = false;
    }

    /// Clamp every resource into its range
    pub fn enforce_bounds(&mut self, limits: &DroneLimits) {
        self.health = self.health.clamp(0.0, limits.max_health);
        self.shield = self.shield.clamp(0.0, limits.max_shield);
        self.energy = self.energy.clamp(0.0, limits.max_energy);
        self.ammo = self.ammo.min(limits.max_ammo);
        self.missiles = self.missiles.min(limits.max_missiles);
        if !self.alive {
            self.health = 0.0;
        }
    }
}

/// Wrap an angle into `[-π, π)`
pub fn wrap_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    // rem_euclid can round up to exactly 2π
    if wrapped >= PI {
        wrapped - 2.0 * PI
    } else {
        wrapped
    }
}
