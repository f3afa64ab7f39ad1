//! Gun rounds, missiles and flares
//!
//! Transient entities spawned by drones. None of them own references to
//! drones: missile targets are plain ids resolved against the world each
//! tick.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::types::{DroneId, EntityId, Team};

/// Unguided gun round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    pub id: EntityId,
    pub owner: DroneId,
    pub team: Team,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Ticks until the round expires
    pub lifetime: u32,
    pub damage: f32,
    pub hit_radius: f32,
}

impl Projectile {
    /// Move one tick; returns false once expired
    pub fn advance(&mut self, dt: f32) -> bool {
        self.position += self.velocity * dt;
        self.lifetime = self.lifetime.saturating_sub(1);
        self.lifetime > 0
    }
}

/// Guided missile with a bounded turn rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Missile {
    pub id: EntityId,
    pub owner: DroneId,
    pub team: Team,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Locked target, resolved by id every tick
    pub target: Option<DroneId>,
    /// Ticks of fuel left
    pub fuel: u32,
    pub damage: f32,
    pub splash_damage: f32,
    pub splash_radius: f32,
    pub hit_radius: f32,
}

impl Missile {
    /// Rotate the heading toward `aim_point` by at most `max_angle` radians
    ///
    /// Speed is preserved.
    pub fn steer_towards(&mut self, aim_point: Vec3, max_angle: f32) {
        let speed = self.velocity.length();
        if speed <= f32::EPSILON {
            return;
        }
        let desired = aim_point - self.position;
        if desired.length_squared() <= f32::EPSILON {
            return;
        }
        let heading = self.velocity / speed;
        let new_heading = rotate_towards(heading, desired.normalize(), max_angle);
        self.velocity = new_heading * speed;
    }

    /// Move one tick; returns false once out of fuel
    pub fn advance(&mut self, dt: f32) -> bool {
        self.position += self.velocity * dt;
        self.fuel = self.fuel.saturating_sub(1);
        self.fuel > 0
    }
}

/// Decoy that breaks enemy missile locks within its radius
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flare {
    pub id: EntityId,
    pub owner: DroneId,
    pub team: Team,
    pub position: Vec3,
    pub lifetime: u32,
    pub radius: f32,
    pub fall_speed: f32,
}

impl Flare {
    /// Drift down one tick; returns false once burnt out
    pub fn advance(&mut self, dt: f32) -> bool {
        self.position.z -= self.fall_speed * dt;
        self.lifetime = self.lifetime.saturating_sub(1);
        self.lifetime > 0
    }

    /// Whether a point lies inside the decoy radius
    pub fn covers(&self, point: Vec3) -> bool {
        self.position.distance_squared(point) <= self.radius * self.radius
    }
}

/// Rotate unit vector `from` toward unit vector `to` by at most `max_angle`
///
/// When the vectors are anti-parallel the turn is made about world +Z (or +X
/// for a vertical heading).
pub fn rotate_towards(from: Vec3, to: Vec3, max_angle: f32) -> Vec3 {
    let cos = from.dot(to).clamp(-1.0, 1.0);
    let angle = cos.acos();
    if angle <= max_angle {
        return to;
    }

    let mut axis = from.cross(to);
    if axis.length_squared() < 1e-10 {
        axis = if from.cross(Vec3::Z).length_squared() > 1e-10 {
            Vec3::Z
        } else {
            Vec3::X
        };
    }
    Quat::from_axis_angle(axis.normalize(), max_angle).mul_vec3(from).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_towards_bounded() {
        let from = Vec3::X;
        let to = Vec3::Y;
        let out = rotate_towards(from, to, 0.1);
        let turned = from.dot(out).clamp(-1.0, 1.0).acos();
        assert!((turned - 0.1).abs() < 1e-4);
        assert!(out.z.abs() < 1e-6);
        assert!(out.y > 0.0);
    }

    #[test]
    fn test_rotate_towards_snaps_when_close() {
        let to = Vec3::new(1.0, 0.05, 0.0).normalize();
        assert_eq!(rotate_towards(Vec3::X, to, 0.5), to);
    }

    #[test]
    fn test_rotate_towards_opposite() {
        let out = rotate_towards(Vec3::X, -Vec3::X, 0.2);
        assert!((out.length() - 1.0).abs() < 1e-5);
        assert!((Vec3::X.dot(out).acos() - 0.2).abs() < 1e-4);
    }

    #[test]
    fn test_missile_steering_preserves_speed() {
        let mut missile = Missile {
            id: 0,
            owner: 0,
            team: Team::Red,
            position: Vec3::ZERO,
            velocity: Vec3::new(150.0, 0.0, 0.0),
            target: Some(3),
            fuel: 35,
            damage: 40.0,
            splash_damage: 15.0,
            splash_radius: 25.0,
            hit_radius: 15.0,
        };
        missile.steer_towards(Vec3::new(0.0, 100.0, 0.0), 0.15);
        assert!((missile.velocity.length() - 150.0).abs() < 1e-2);
        assert!(missile.velocity.y > 0.0);
    }

    #[test]
    fn test_projectile_expires() {
        let mut round = Projectile {
            id: 1,
            owner: 0,
            team: Team::Blue,
            position: Vec3::ZERO,
            velocity: Vec3::new(600.0, 0.0, 0.0),
            lifetime: 2,
            damage: 8.0,
            hit_radius: 12.0,
        };
        assert!(round.advance(0.1));
        assert!(!round.advance(0.1));
        assert!((round.position.x - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_flare_falls_and_covers() {
        let mut flare = Flare {
            id: 2,
            owner: 1,
            team: Team::Red,
            position: Vec3::new(0.0, 0.0, 100.0),
            lifetime: 30,
            radius: 50.0,
            fall_speed: 5.0,
        };
        flare.advance(0.1);
        assert!((flare.position.z - 99.5).abs() < 1e-4);
        assert!(flare.covers(Vec3::new(30.0, 0.0, 100.0)));
        assert!(!flare.covers(Vec3::new(60.0, 0.0, 100.0)));
    }
}
