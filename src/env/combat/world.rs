//! World state
//!
//! Everything that exists during one episode. A fresh world is spawned on
//! every reset; nothing carries over between episodes.

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::{
    arena::Arena,
    config::{CombatConfig, TimeLimitRule},
    drone::Drone,
    types::{DroneId, EntityId, Outcome, Team},
    weapons::{Flare, Missile, Projectile},
};

/// Complete mutable state of an episode
#[derive(Debug, Clone)]
pub struct WorldState {
    /// Ticks elapsed since spawn
    pub step: u32,
    pub time_limit: u32,
    pub arena: Arena,
    /// All drones, indexed by id; dead drones stay in place
    pub drones: Vec<Drone>,
    pub projectiles: Vec<Projectile>,
    pub missiles: Vec<Missile>,
    pub flares: Vec<Flare>,
    /// Seed this episode was spawned from
    pub seed: u64,
    /// Set once the episode is over
    pub outcome: Option<Outcome>,
    next_entity_id: EntityId,
    rng: Pcg32,
}

impl WorldState {
    /// Spawn the starting formation for an episode
    ///
    /// Red lines up on the -x side facing +x, blue on the +x side facing -x.
    /// A team with zero drones makes the world terminal immediately.
    pub fn spawn(config: &CombatConfig, seed: u64) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let arena = Arena::from_config(&config.arena);
        let center = arena.center();
        let spawn = &config.spawn;

        let mut drones = Vec::with_capacity(config.num_drones());
        for (team, size) in [(Team::Red, config.red_size), (Team::Blue, config.blue_size)] {
            let (side, yaw) = match team {
                Team::Red => (-1.0, 0.0),
                Team::Blue => (1.0, std::f32::consts::PI),
            };
            for i in 0..size {
                let lateral = (i as f32 - (size as f32 - 1.0) / 2.0) * spawn.spacing;
                let mut position = Vec3::new(
                    center.x + side * spawn.separation,
                    center.y + lateral,
                    arena.min.z + spawn.altitude,
                );
                if spawn.jitter > 0.0 {
                    let j = spawn.jitter;
                    position += Vec3::new(
                        rng.gen_range(-j..=j),
                        rng.gen_range(-j..=j),
                        rng.gen_range(-j..=j),
                    );
                }
                let position = position.clamp(arena.min, arena.max);
                let role = config.roles[i % config.roles.len()];
                let id = drones.len() as DroneId;
                drones.push(Drone::new(id, team, role, position, yaw, &config.drone));
            }
        }

        let mut world = Self {
            step: 0,
            time_limit: config.time_limit,
            arena,
            drones,
            projectiles: Vec::new(),
            missiles: Vec::new(),
            flares: Vec::new(),
            seed,
            outcome: None,
            next_entity_id: 0,
            rng,
        };
        world.outcome = world.evaluate_outcome(config.time_limit_rule);
        world
    }

    /// Look up a drone by id
    pub fn drone(&self, id: DroneId) -> Option<&Drone> {
        self.drones.get(id as usize)
    }

    /// Look up a live drone by id
    pub fn alive_drone(&self, id: DroneId) -> Option<&Drone> {
        self.drone(id).filter(|d| d.alive)
    }

    /// Drones of one team in id order
    pub fn team(&self, team: Team) -> impl Iterator<Item = &Drone> {
        self.drones.iter().filter(move |d| d.team == team)
    }

    /// Number of drones on a team
    pub fn team_len(&self, team: Team) -> usize {
        self.team(team).count()
    }

    pub fn alive_count(&self, team: Team) -> usize {
        self.team(team).filter(|d| d.alive).count()
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Fraction of the time limit still remaining
    pub fn time_remaining(&self) -> f32 {
        1.0 - (self.step as f32 / self.time_limit.max(1) as f32).min(1.0)
    }

    /// Allocate a new transient entity id
    pub fn allocate_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    pub fn rng_mut(&mut self) -> &mut Pcg32 {
        &mut self.rng
    }

    /// Decide whether the episode is over
    pub fn evaluate_outcome(&self, rule: TimeLimitRule) -> Option<Outcome> {
        let red = self.alive_count(Team::Red);
        let blue = self.alive_count(Team::Blue);

        match (red, blue) {
            (0, 0) => return Some(Outcome::Draw),
            (0, _) => return Some(Outcome::Win(Team::Blue)),
            (_, 0) => return Some(Outcome::Win(Team::Red)),
            _ => {}
        }

        if self.step < self.time_limit {
            return None;
        }

        match rule {
            TimeLimitRule::Draw => Some(Outcome::Draw),
            TimeLimitRule::ScoreBased => {
                let durability = |team| -> f32 {
                    self.team(team).filter(|d| d.alive).map(|d| d.health + d.shield).sum()
                };
                let (red_hp, blue_hp) = (durability(Team::Red), durability(Team::Blue));
                let outcome = if red != blue {
                    Outcome::Win(if red > blue { Team::Red } else { Team::Blue })
                } else if (red_hp - blue_hp).abs() > 1e-3 {
                    Outcome::Win(if red_hp > blue_hp { Team::Red } else { Team::Blue })
                } else {
                    Outcome::Draw
                };
                Some(outcome)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_formation() {
        let config = CombatConfig::default();
        let world = WorldState::spawn(&config, 1);

        assert_eq!(world.drones.len(), 6);
        assert_eq!(world.team_len(Team::Red), 3);
        assert!(world.drones.iter().enumerate().all(|(i, d)| d.id as usize == i));
        assert!(world.team(Team::Red).all(|d| d.position.x < 0.0));
        assert!(world.team(Team::Blue).all(|d| d.position.x > 0.0));
        assert!(!world.is_terminal());
    }

    #[test]
    fn test_roles_cycle() {
        let config = CombatConfig::default();
        let world = WorldState::spawn(&config, 1);
        let roles: Vec<_> = world.team(Team::Blue).map(|d| d.role).collect();
        assert_eq!(roles, vec![config.roles[0], config.roles[1], config.roles[0]]);
    }

    #[test]
    fn test_empty_team_is_terminal_at_spawn() {
        let config = CombatConfig::default().team_sizes(0, 2);
        let world = WorldState::spawn(&config, 1);
        assert_eq!(world.outcome, Some(Outcome::Win(Team::Blue)));
    }

    #[test]
    fn test_score_based_time_limit() {
        let config = CombatConfig::default().time_limit(10);
        let mut world = WorldState::spawn(&config, 1);
        world.step = 10;
        world.drones[4].health = 50.0;

        assert_eq!(world.evaluate_outcome(TimeLimitRule::Draw), Some(Outcome::Draw));
        assert_eq!(world.evaluate_outcome(TimeLimitRule::ScoreBased), Some(Outcome::Win(Team::Red)));
    }

    #[test]
    fn test_jitter_is_seeded() {
        let mut config = CombatConfig::default();
        config.spawn.jitter = 10.0;
        let a = WorldState::spawn(&config, 5);
        let b = WorldState::spawn(&config, 5);
        let c = WorldState::spawn(&config, 6);
        assert_eq!(a.drones, b.drones);
        assert_ne!(a.drones, c.drones);
    }
}
