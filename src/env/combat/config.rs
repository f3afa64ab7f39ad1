//! Combat environment configuration
//!
//! Every tunable of the simulation lives here. All sections carry serde
//! defaults so a TOML file only needs the keys it changes.

use std::path::Path;

use anyhow::Result;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::types::Role;
use crate::error::SkyBattleError;

/// Largest team the observation layout is exercised with
pub const MAX_TEAM_SIZE: usize = 16;

/// What happens to a drone that reaches the arena boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Clamp onto the boundary and cancel the outward velocity
    Clamp,
    /// Clamp and reflect the outward velocity scaled by the restitution
    Bounce,
    /// The drone is destroyed
    Destroy,
}

/// How a missile behaves once its target is gone, out of range or decoyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissileFallback {
    /// Drop the lock and keep flying on the current heading
    ContinueStraight,
    /// Remove the missile without dealing damage
    SelfDestruct,
}

/// How the winner is decided when the time limit is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeLimitRule {
    /// Always a draw
    Draw,
    /// More drones alive wins, then more total health and shield
    ScoreBased,
}

/// Arena geometry and boundary handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Minimum corner (x, y, floor altitude)
    pub min: Vec3,
    /// Maximum corner (x, y, ceiling altitude)
    pub max: Vec3,
    /// Boundary policy, fixed for the whole episode
    pub boundary: BoundaryPolicy,
    /// Velocity retained when bouncing
    pub restitution: f32,
    /// Damage taken when touching the floor
    pub ground_impact_damage: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            min: Vec3::new(-500.0, -500.0, 0.0),
            max: Vec3::new(500.0, 500.0, 300.0),
            boundary: BoundaryPolicy::Clamp,
            restitution: 0.5,
            ground_impact_damage: 5.0,
        }
    }
}

/// Drone flight envelope and resource economy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DroneLimits {
    pub max_speed: f32,
    pub max_acceleration: f32,
    /// Maximum roll/pitch/yaw rate in rad/s
    pub max_turn_rate: f32,
    /// Quadratic drag coefficient
    pub drag: f32,
    pub max_health: f32,
    pub max_shield: f32,
    pub max_energy: f32,
    pub max_ammo: u32,
    pub max_missiles: u32,
    /// Shield regeneration per second
    pub shield_regen: f32,
    /// Energy regeneration per second
    pub energy_regen: f32,
    /// Below this speed energy regenerates faster
    pub slow_speed_threshold: f32,
    pub slow_regen_multiplier: f32,
    pub boost_multiplier: f32,
    /// Energy drained per second of boost
    pub boost_cost: f32,
    pub missile_energy_cost: f32,
    pub flare_energy_cost: f32,
    pub missile_cooldown_ticks: u32,
    pub flare_cooldown_ticks: u32,
    /// Restore one missile every this many ticks (None disables)
    pub missile_regen_ticks: Option<u32>,
}

impl Default for DroneLimits {
    fn default() -> Self {
        Self {
            max_speed: 200.0,
            max_acceleration: 50.0,
            max_turn_rate: 2.0,
            drag: 0.02,
            max_health: 100.0,
            max_shield: 50.0,
            max_energy: 100.0,
            max_ammo: 500,
            max_missiles: 4,
            shield_regen: 2.0,
            energy_regen: 5.0,
            slow_speed_threshold: 60.0,
            slow_regen_multiplier: 1.5,
            boost_multiplier: 1.5,
            boost_cost: 20.0,
            missile_energy_cost: 15.0,
            flare_energy_cost: 10.0,
            missile_cooldown_ticks: 50,
            flare_cooldown_ticks: 80,
            missile_regen_ticks: None,
        }
    }
}

/// Gun, missile and flare parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponConfig {
    pub gun_speed: f32,
    pub gun_damage: f32,
    pub gun_lifetime_ticks: u32,
    /// Uniform spread per axis applied to the firing direction
    pub gun_spread: f32,
    pub gun_hit_radius: f32,
    /// Distance ahead of the drone where rounds spawn
    pub muzzle_offset: f32,
    pub missile_speed: f32,
    pub missile_damage: f32,
    pub missile_fuel_ticks: u32,
    /// Maximum heading change in rad/s
    pub missile_turn_rate: f32,
    pub missile_lock_range: f32,
    pub missile_hit_radius: f32,
    pub splash_radius: f32,
    pub splash_damage: f32,
    pub missile_fallback: MissileFallback,
    pub flare_lifetime_ticks: u32,
    pub flare_radius: f32,
    pub flare_fall_speed: f32,
}

impl Default for WeaponConfig {
    fn default() -> Self {
        Self {
            gun_speed: 600.0,
            gun_damage: 8.0,
            gun_lifetime_ticks: 12,
            gun_spread: 0.08,
            gun_hit_radius: 12.0,
            muzzle_offset: 5.0,
            missile_speed: 150.0,
            missile_damage: 40.0,
            missile_fuel_ticks: 35,
            missile_turn_rate: 1.5,
            missile_lock_range: 600.0,
            missile_hit_radius: 15.0,
            splash_radius: 25.0,
            splash_damage: 15.0,
            missile_fallback: MissileFallback::ContinueStraight,
            flare_lifetime_ticks: 30,
            flare_radius: 50.0,
            flare_fall_speed: 5.0,
        }
    }
}

/// Reward shaping weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardWeights {
    /// Per tick alive
    pub survival: f32,
    /// Per point of damage dealt
    pub damage_dealt: f32,
    /// Per point of damage taken
    pub damage_taken: f32,
    pub kill: f32,
    pub death: f32,
    pub win: f32,
    pub loss: f32,
    pub draw: f32,
    /// Blend between individual and team-mean reward
    pub team_weight: f32,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            survival: 0.1,
            damage_dealt: 0.5,
            damage_taken: 0.3,
            kill: 50.0,
            death: 30.0,
            win: 100.0,
            loss: 100.0,
            draw: 0.0,
            team_weight: 0.3,
        }
    }
}

/// Starting formation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Distance of each team's line from the arena centre along x
    pub separation: f32,
    /// Lateral distance between wingmen
    pub spacing: f32,
    pub altitude: f32,
    /// Uniform random offset per axis, drawn from the episode seed
    pub jitter: f32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self { separation: 120.0, spacing: 50.0, altitude: 100.0, jitter: 0.0 }
    }
}

/// Complete configuration of a combat episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    pub red_size: usize,
    pub blue_size: usize,
    /// Fixed timestep in seconds
    pub dt: f32,
    /// Episode length in ticks
    pub time_limit: u32,
    pub time_limit_rule: TimeLimitRule,
    /// Seed of the environment's seed sequence
    pub seed: u64,
    /// Roles assigned to each team's drones in order, cycled
    pub roles: Vec<Role>,
    /// Range within which allies and enemies appear in observations
    pub sensor_range: f32,
    pub arena: ArenaConfig,
    pub drone: DroneLimits,
    pub weapons: WeaponConfig,
    pub rewards: RewardWeights,
    pub spawn: SpawnConfig,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            red_size: 3,
            blue_size: 3,
            dt: 0.1,
            time_limit: 3000,
            time_limit_rule: TimeLimitRule::Draw,
            seed: 42,
            roles: vec![Role::Attacker, Role::Support],
            sensor_range: 800.0,
            arena: ArenaConfig::default(),
            drone: DroneLimits::default(),
            weapons: WeaponConfig::default(),
            rewards: RewardWeights::default(),
            spawn: SpawnConfig::default(),
        }
    }
}

impl CombatConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| SkyBattleError::config(format!("failed to parse combat config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Larger of the two team sizes; fixes the observation layout
    pub fn team_size(&self) -> usize {
        self.red_size.max(self.blue_size)
    }

    /// Total number of drones
    pub fn num_drones(&self) -> usize {
        self.red_size + self.blue_size
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| -> Result<()> { Err(SkyBattleError::config(msg).into()) };

        if self.num_drones() == 0 {
            return fail("at least one team must have a drone");
        }
        if self.team_size() > MAX_TEAM_SIZE {
            return fail("team size exceeds the supported maximum");
        }
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return fail("dt must be positive");
        }
        if self.time_limit == 0 {
            return fail("time_limit must be positive");
        }
        if self.roles.is_empty() {
            return fail("roles must not be empty");
        }
        if self.sensor_range <= 0.0 {
            return fail("sensor_range must be positive");
        }
        let extent = self.arena.max - self.arena.min;
        if !(extent.x > 0.0 && extent.y > 0.0 && extent.z > 0.0) {
            return fail("arena max must exceed min on every axis");
        }
        if !(0.0..=1.0).contains(&self.arena.restitution) {
            return fail("restitution must be in [0, 1]");
        }
        let d = &self.drone;
        if d.max_speed <= 0.0 || d.max_acceleration < 0.0 || d.max_turn_rate < 0.0 {
            return fail("drone flight limits must be positive");
        }
        if d.max_health <= 0.0 || d.max_shield < 0.0 || d.max_energy < 0.0 {
            return fail("drone resource maxima must be non-negative and health positive");
        }
        if d.missile_regen_ticks == Some(0) {
            return fail("missile_regen_ticks must be positive when set");
        }
        let w = &self.weapons;
        if w.gun_hit_radius <= 0.0 || w.missile_hit_radius <= 0.0 {
            return fail("hit radii must be positive");
        }
        if w.missile_turn_rate < 0.0 || w.missile_lock_range <= 0.0 {
            return fail("missile guidance parameters must be positive");
        }
        if !(0.0..=1.0).contains(&self.rewards.team_weight) {
            return fail("team_weight must be in [0, 1]");
        }
        Ok(())
    }

    /// Set both team sizes
    pub fn team_sizes(mut self, red: usize, blue: usize) -> Self {
        self.red_size = red;
        self.blue_size = blue;
        self
    }

    /// Set the same size for both teams
    pub fn symmetric(self, team_size: usize) -> Self {
        self.team_sizes(team_size, team_size)
    }

    /// Set the episode length in ticks
    pub fn time_limit(mut self, ticks: u32) -> Self {
        self.time_limit = ticks;
        self
    }

    /// Set the time limit rule
    pub fn time_limit_rule(mut self, rule: TimeLimitRule) -> Self {
        self.time_limit_rule = rule;
        self
    }

    /// Set the seed of the environment's seed sequence
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the boundary policy
    pub fn boundary(mut self, policy: BoundaryPolicy) -> Self {
        self.arena.boundary = policy;
        self
    }

    /// Set the missile fallback behaviour
    pub fn missile_fallback(mut self, fallback: MissileFallback) -> Self {
        self.weapons.missile_fallback = fallback;
        self
    }

    /// Set the reward weights
    pub fn rewards(mut self, rewards: RewardWeights) -> Self {
        self.rewards = rewards;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = CombatConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.team_size(), 3);
        assert_eq!(config.num_drones(), 6);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(CombatConfig::default().team_sizes(0, 0).validate().is_err());
        assert!(CombatConfig::default().time_limit(0).validate().is_err());
        assert!(CombatConfig::default().symmetric(MAX_TEAM_SIZE + 1).validate().is_err());

        let mut config = CombatConfig::default();
        config.arena.max.z = config.arena.min.z;
        assert!(config.validate().is_err());

        let mut config = CombatConfig::default();
        config.rewards.team_weight = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_one_empty_team_is_valid() {
        assert!(CombatConfig::default().team_sizes(2, 0).validate().is_ok());
    }

    #[test]
    fn test_validation_error_is_typed() {
        let err = CombatConfig::default().time_limit(0).validate().unwrap_err();
        assert!(matches!(err.downcast_ref::<SkyBattleError>(), Some(SkyBattleError::Config(_))));
    }

    #[test]
    fn test_partial_toml() {
        let config = CombatConfig::from_toml_str(
            r#"
            red_size = 2
            blue_size = 2
            time_limit = 300
            time_limit_rule = "score_based"

            [arena]
            boundary = "bounce"

            [weapons]
            missile_fallback = "self_destruct"
            "#,
        )
        .unwrap();

        assert_eq!(config.team_size(), 2);
        assert_eq!(config.time_limit, 300);
        assert_eq!(config.time_limit_rule, TimeLimitRule::ScoreBased);
        assert_eq!(config.arena.boundary, BoundaryPolicy::Bounce);
        assert_eq!(config.weapons.missile_fallback, MissileFallback::SelfDestruct);
        assert_eq!(config.drone.max_speed, 200.0);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = CombatConfig::from_toml_str("red_size = \"three\"").unwrap_err();
        assert!(matches!(err.downcast_ref::<SkyBattleError>(), Some(SkyBattleError::Config(_))));
    }

    #[test]
    fn test_builder_pattern() {
        let config = CombatConfig::new()
            .symmetric(4)
            .seed(7)
            .boundary(BoundaryPolicy::Destroy)
            .time_limit_rule(TimeLimitRule::ScoreBased);

        assert_eq!(config.red_size, 4);
        assert_eq!(config.blue_size, 4);
        assert_eq!(config.seed, 7);
        assert_eq!(config.arena.boundary, BoundaryPolicy::Destroy);
    }
}
