//! Combat engine
//!
//! [`CombatEnv`] owns the world of one episode and advances it one fixed
//! timestep at a time. Each tick runs the same phases in the same order:
//!
//! 1. controls and flight integration
//! 2. boost drain and regeneration
//! 3. weapon spawning
//! 4. missile guidance and entity movement
//! 5. projectile and boundary collisions
//! 6. damage application
//! 7. termination
//! 8. rewards
//!
//! Given the same configuration, seed and action sequence, the engine
//! produces the same states bit for bit.

use std::collections::BTreeMap;

use anyhow::Result;
use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::{
    arena::BoundaryContact,
    config::{CombatConfig, MissileFallback},
    drone::ControlInput,
    reward::{compute_rewards, DroneDelta, TickDeltas},
    snapshot::StateSnapshot,
    types::{CombatEvent, DroneId, EntityId, Team, WeaponKind},
    weapons::{Flare, Missile, Projectile},
    world::WorldState,
};
use crate::{
    codec::{action::decode_action, ObservationCodec, ACTION_DIM},
    env::{SpaceInfo, SpaceType, StepInfo},
    multi_agent::environment::{AgentId, JointAction, MultiAgentEnvironment, MultiAgentResult},
};

/// Damage waiting to be applied in phase 6
#[derive(Debug, Clone, Copy)]
struct PendingDamage {
    attacker: Option<DroneId>,
    target: DroneId,
    amount: f32,
    weapon: WeaponKind,
}

/// Deterministic multi-drone combat environment
#[derive(Debug, Clone)]
pub struct CombatEnv {
    config: CombatConfig,
    world: WorldState,
    /// Supplies episode seeds when reset is called without one
    seed_source: Pcg32,
    episode: u64,
}

impl CombatEnv {
    /// Create an environment; the first episode is spawned immediately
    pub fn new(config: CombatConfig) -> Result<Self> {
        config.validate()?;
        let mut seed_source = Pcg32::seed_from_u64(config.seed);
        let seed = seed_source.gen();
        let world = WorldState::spawn(&config, seed);
        Ok(Self { config, world, seed_source, episode: 0 })
    }

    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// Current world state
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Episodes started so far, including the current one
    pub fn episode(&self) -> u64 {
        self.episode
    }

    /// Viewer snapshot of the current world
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::capture(&self.world)
    }

    /// Start a new episode
    ///
    /// With `None` the next seed from the environment's seed sequence is used.
    pub fn reset(&mut self, seed: Option<u64>) -> &WorldState {
        let seed = seed.unwrap_or_else(|| self.seed_source.gen());
        self.world = WorldState::spawn(&self.config, seed);
        self.episode += 1;
        &self.world
    }

    /// Advance one tick with decoded controls
    ///
    /// Drones without an entry idle. Stepping a finished episode changes
    /// nothing and returns zero rewards with `done` set.
    pub fn step_controls(&mut self, controls: &BTreeMap<DroneId, ControlInput>) -> MultiAgentResult {
        if self.world.is_terminal() {
            return self.terminal_result();
        }

        let Self { config, world, .. } = self;
        let dt = config.dt;
        let tick = world.step;
        let mut events = Vec::new();
        let mut deltas: Vec<DroneDelta> =
            world.drones.iter().map(|d| DroneDelta::quiet(d.id, d.team, d.alive)).collect();

        for drone in world.drones.iter_mut() {
            drone.begin_tick();
        }

        // 1. Controls
        for drone in world.drones.iter_mut().filter(|d| d.alive) {
            let input = controls.get(&drone.id).copied().unwrap_or_default();
            drone.apply_control(&input, &config.drone, dt);
        }

        // 2. Regeneration
        for drone in world.drones.iter_mut().filter(|d| d.alive) {
            drone.regenerate(&config.drone, dt);
        }

        // 3. Spawning
        spawn_weapons(world, config, controls);

        // 4. Guidance and movement
        advance_entities(world, config, &mut events);

        // 5. Collisions
        let (direct, splash) = resolve_impacts(world, config);
        let mut environment = Vec::new();
        let mut destroyed = Vec::new();
        let arena = world.arena;
        for drone in world.drones.iter_mut().filter(|d| d.alive) {
            let contact = arena.constrain(
                &mut drone.position,
                &mut drone.velocity,
                config.arena.boundary,
                config.arena.restitution,
            );
            match contact {
                BoundaryContact::Floor if config.arena.ground_impact_damage > 0.0 => {
                    environment.push(PendingDamage {
                        attacker: None,
                        target: drone.id,
                        amount: config.arena.ground_impact_damage,
                        weapon: WeaponKind::Ground,
                    });
                }
                BoundaryContact::Destroyed => destroyed.push(drone.id),
                _ => {}
            }
        }

        // 6. Damage
        for hit in direct.iter().chain(&splash).chain(&environment) {
            apply_damage(world, config, hit, tick, &mut deltas, &mut events);
        }
        for id in destroyed {
            let drone = &mut world.drones[id as usize];
            if drone.alive {
                drone.kill(tick);
                deltas[id as usize].died = true;
                events.push(CombatEvent::Crash { drone: id });
            }
        }

        // 7. Termination
        world.step += 1;
        world.outcome = world.evaluate_outcome(config.time_limit_rule);

        // 8. Rewards
        for (delta, drone) in deltas.iter_mut().zip(&world.drones) {
            delta.alive = drone.alive;
        }
        let rewards = compute_rewards(&TickDeltas { drones: deltas }, world.outcome, &config.rewards);

        if let Some(outcome) = world.outcome {
            tracing::debug!(step = world.step, seed = world.seed, ?outcome, "episode finished");
        }

        MultiAgentResult {
            rewards: world.drones.iter().map(|d| d.id).zip(rewards).collect(),
            done: world.is_terminal(),
            info: step_info(world, events),
        }
    }

    fn terminal_result(&self) -> MultiAgentResult {
        MultiAgentResult {
            rewards: self.world.drones.iter().map(|d| (d.id, 0.0)).collect(),
            done: true,
            info: step_info(&self.world, Vec::new()),
        }
    }
}

impl MultiAgentEnvironment for CombatEnv {
    type State = WorldState;

    fn num_agents(&self) -> usize {
        self.world.drones.len()
    }

    fn reset(&mut self, seed: Option<u64>) -> &WorldState {
        CombatEnv::reset(self, seed)
    }

    fn step(&mut self, actions: &JointAction) -> MultiAgentResult {
        let controls: BTreeMap<DroneId, ControlInput> =
            actions.iter().map(|(&id, action)| (id, decode_action(action))).collect();
        self.step_controls(&controls)
    }

    fn state(&self) -> &WorldState {
        &self.world
    }

    fn active_agents(&self) -> Vec<AgentId> {
        self.world.drones.iter().filter(|d| d.alive).map(|d| d.id).collect()
    }

    fn observation_space(&self) -> SpaceInfo {
        let codec = ObservationCodec::new(self.config.team_size());
        SpaceInfo { shape: vec![codec.obs_dim()], dtype: SpaceType::Continuous }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![ACTION_DIM], dtype: SpaceType::Continuous }
    }
}

fn step_info(world: &WorldState, events: Vec<CombatEvent>) -> StepInfo {
    StepInfo {
        step: world.step,
        red_alive: world.alive_count(Team::Red),
        blue_alive: world.alive_count(Team::Blue),
        outcome: world.outcome,
        events,
    }
}

/// Nearest live enemy of `team` within `range`, ties to the lowest id
fn nearest_enemy(world: &WorldState, team: Team, from: Vec3, range: f32) -> Option<DroneId> {
    world
        .drones
        .iter()
        .filter(|d| d.alive && d.team != team)
        .map(|d| (d.position.distance(from), d.id))
        .filter(|(dist, _)| *dist <= range)
        .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(_, id)| id)
}

fn spawn_weapons(
    world: &mut WorldState,
    config: &CombatConfig,
    controls: &BTreeMap<DroneId, ControlInput>,
) {
    let limits = &config.drone;
    let weapons = &config.weapons;

    for index in 0..world.drones.len() {
        let drone = &world.drones[index];
        if !drone.alive {
            continue;
        }
        let Some(input) = controls.get(&drone.id) else {
            continue;
        };
        let (id, team, position, velocity, forward) =
            (drone.id, drone.team, drone.position, drone.velocity, drone.forward());

        if input.fire_gun && world.drones[index].ammo > 0 {
            let spread = weapons.gun_spread;
            let jitter = if spread > 0.0 {
                let rng = world.rng_mut();
                Vec3::new(
                    rng.gen_range(-spread..=spread),
                    rng.gen_range(-spread..=spread),
                    rng.gen_range(-spread..=spread),
                )
            } else {
                Vec3::ZERO
            };
            let direction = (forward + jitter).normalize_or(forward);
            let round_id = world.allocate_id();
            world.projectiles.push(Projectile {
                id: round_id,
                owner: id,
                team,
                position: position + direction * weapons.muzzle_offset,
                velocity: direction * weapons.gun_speed + velocity,
                lifetime: weapons.gun_lifetime_ticks,
                damage: weapons.gun_damage,
                hit_radius: weapons.gun_hit_radius,
            });
            world.drones[index].ammo -= 1;
        }

        let drone = &world.drones[index];
        if input.fire_missile
            && drone.missiles > 0
            && drone.missile_cooldown == 0
            && drone.energy >= limits.missile_energy_cost
        {
            let target = nearest_enemy(world, team, position, weapons.missile_lock_range);
            let missile_id = world.allocate_id();
            world.missiles.push(Missile {
                id: missile_id,
                owner: id,
                team,
                position: position + forward * weapons.muzzle_offset,
                velocity: forward * weapons.missile_speed,
                target,
                fuel: weapons.missile_fuel_ticks,
                damage: weapons.missile_damage,
                splash_damage: weapons.splash_damage,
                splash_radius: weapons.splash_radius,
                hit_radius: weapons.missile_hit_radius,
            });
            let drone = &mut world.drones[index];
            drone.missiles -= 1;
            drone.energy -= limits.missile_energy_cost;
            drone.missile_cooldown = limits.missile_cooldown_ticks;
            drone.enforce_bounds(limits);
        }

        let drone = &world.drones[index];
        if input.deploy_flare && drone.flare_cooldown == 0 && drone.energy >= limits.flare_energy_cost {
            let flare_id = world.allocate_id();
            world.flares.push(Flare {
                id: flare_id,
                owner: id,
                team,
                position,
                lifetime: weapons.flare_lifetime_ticks,
                radius: weapons.flare_radius,
                fall_speed: weapons.flare_fall_speed,
            });
            let drone = &mut world.drones[index];
            drone.energy -= limits.flare_energy_cost;
            drone.flare_cooldown = limits.flare_cooldown_ticks;
            drone.enforce_bounds(limits);
        }
    }
}

fn advance_entities(world: &mut WorldState, config: &CombatConfig, events: &mut Vec<CombatEvent>) {
    let dt = config.dt;
    let arena = world.arena;

    world.projectiles.retain_mut(|p| p.advance(dt) && arena.contains(p.position));
    world.flares.retain_mut(|f| f.advance(dt) && arena.contains(f.position));

    let max_turn = config.weapons.missile_turn_rate * dt;
    let lock_range = config.weapons.missile_lock_range;
    let missiles = std::mem::take(&mut world.missiles);
    let mut kept = Vec::with_capacity(missiles.len());

    for mut missile in missiles {
        let aim = missile
            .target
            .and_then(|id| world.alive_drone(id))
            .filter(|t| t.position.distance(missile.position) <= lock_range)
            .map(|t| t.position);
        let decoyed = world.flares.iter().any(|f| f.team != missile.team && f.covers(missile.position));

        match aim {
            Some(aim) if !decoyed => missile.steer_towards(aim, max_turn),
            _ => match config.weapons.missile_fallback {
                MissileFallback::ContinueStraight => {
                    if missile.target.take().is_some() {
                        events.push(CombatEvent::LockLost { missile: missile.id });
                    }
                }
                MissileFallback::SelfDestruct => {
                    events.push(CombatEvent::SelfDestruct { missile: missile.id });
                    continue;
                }
            },
        }

        if missile.advance(dt) && arena.contains(missile.position) {
            kept.push(missile);
        }
    }
    world.missiles = kept;
}

/// Distance from `point` to the segment travelled during the last tick
fn swept_distance(start: Vec3, end: Vec3, point: Vec3) -> f32 {
    let segment = end - start;
    let len_sq = segment.length_squared();
    if len_sq <= f32::EPSILON {
        return end.distance(point);
    }
    let t = ((point - start).dot(segment) / len_sq).clamp(0.0, 1.0);
    (start + segment * t).distance(point)
}

/// First live enemy hit along a path: nearest, ties to the lowest id
fn first_hit(world: &WorldState, team: Team, start: Vec3, end: Vec3, radius: f32) -> Option<DroneId> {
    world
        .drones
        .iter()
        .filter(|d| d.alive && d.team != team)
        .map(|d| (swept_distance(start, end, d.position), d.id))
        .filter(|(dist, _)| *dist <= radius)
        .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(_, id)| id)
}

/// Collect hits for every round and missile, in entity id order
fn resolve_impacts(world: &mut WorldState, config: &CombatConfig) -> (Vec<PendingDamage>, Vec<PendingDamage>) {
    enum Impactor {
        Round(usize),
        Missile(usize),
    }

    let dt = config.dt;
    let mut order: Vec<(EntityId, Impactor)> = world
        .projectiles
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id, Impactor::Round(i)))
        .chain(world.missiles.iter().enumerate().map(|(i, m)| (m.id, Impactor::Missile(i))))
        .collect();
    order.sort_by_key(|(id, _)| *id);

    let mut direct = Vec::new();
    let mut splash = Vec::new();
    let mut consumed = Vec::new();

    for (id, impactor) in order {
        match impactor {
            Impactor::Round(i) => {
                let p = &world.projectiles[i];
                let start = p.position - p.velocity * dt;
                if let Some(target) = first_hit(world, p.team, start, p.position, p.hit_radius) {
                    direct.push(PendingDamage {
                        attacker: Some(p.owner),
                        target,
                        amount: p.damage,
                        weapon: WeaponKind::Gun,
                    });
                    consumed.push(id);
                }
            }
            Impactor::Missile(i) => {
                let m = &world.missiles[i];
                let start = m.position - m.velocity * dt;
                if let Some(target) = first_hit(world, m.team, start, m.position, m.hit_radius) {
                    direct.push(PendingDamage {
                        attacker: Some(m.owner),
                        target,
                        amount: m.damage,
                        weapon: WeaponKind::Missile,
                    });
                    let impact = world.drones[target as usize].position;
                    for other in world.drones.iter().filter(|d| {
                        d.alive
                            && d.team != m.team
                            && d.id != target
                            && d.position.distance(impact) <= m.splash_radius
                    }) {
                        splash.push(PendingDamage {
                            attacker: Some(m.owner),
                            target: other.id,
                            amount: m.splash_damage,
                            weapon: WeaponKind::Splash,
                        });
                    }
                    consumed.push(id);
                }
            }
        }
    }

    if !consumed.is_empty() {
        world.projectiles.retain(|p| !consumed.contains(&p.id));
        world.missiles.retain(|m| !consumed.contains(&m.id));
    }
    (direct, splash)
}

fn apply_damage(
    world: &mut WorldState,
    config: &CombatConfig,
    hit: &PendingDamage,
    tick: u32,
    deltas: &mut [DroneDelta],
    events: &mut Vec<CombatEvent>,
) {
    let target = hit.target as usize;
    let report = world.drones[target].take_damage(hit.amount, tick, &config.drone);
    if report.applied <= 0.0 {
        return;
    }
    deltas[target].damage_taken += report.applied;

    match hit.attacker {
        Some(attacker) => {
            let a = attacker as usize;
            world.drones[a].damage_dealt += report.applied;
            deltas[a].damage_dealt += report.applied;
            events.push(CombatEvent::Hit {
                attacker,
                target: hit.target,
                weapon: hit.weapon,
                damage: report.applied,
            });
            if report.killed {
                world.drones[a].kills += 1;
                deltas[a].kills += 1;
                events.push(CombatEvent::Kill { attacker, target: hit.target });
            }
        }
        None if report.killed => events.push(CombatEvent::Crash { drone: hit.target }),
        None => {}
    }

    if report.killed {
        deltas[target].died = true;
    }
}
