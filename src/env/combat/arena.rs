//! Arena bounds
//!
//! An axis-aligned box. Drones are constrained by the configured
//! [`BoundaryPolicy`]; every other entity is removed once it leaves.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::config::{ArenaConfig, BoundaryPolicy};

/// What the boundary did to a drone this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryContact {
    /// Inside the box
    None,
    /// Touched a wall or the ceiling
    Wall,
    /// Touched the floor
    Floor,
    /// Left the box under [`BoundaryPolicy::Destroy`]
    Destroyed,
}

/// Playable volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    pub min: Vec3,
    pub max: Vec3,
}

impl Arena {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_config(config: &ArenaConfig) -> Self {
        Self::new(config.min, config.max)
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Position mapped to `[0, 1]` per axis
    pub fn normalized(&self, point: Vec3) -> Vec3 {
        (point - self.min) / (self.max - self.min)
    }

    /// Apply the boundary policy to a drone's position and velocity
    pub fn constrain(
        &self,
        position: &mut Vec3,
        velocity: &mut Vec3,
        policy: BoundaryPolicy,
        restitution: f32,
    ) -> BoundaryContact {
        if self.contains(*position) && position.z > self.min.z {
            return BoundaryContact::None;
        }
        if policy == BoundaryPolicy::Destroy && !self.contains(*position) {
            return BoundaryContact::Destroyed;
        }

        let floor = position.z <= self.min.z;
        for axis in 0..3 {
            let (lo, hi) = (self.min[axis], self.max[axis]);
            let outward = if position[axis] < lo {
                -1.0
            } else if position[axis] > hi {
                1.0
            } else if axis == 2 && position[axis] <= lo {
                -1.0
            } else {
                continue;
            };
            position[axis] = position[axis].clamp(lo, hi);

            // Only the component pointing out of the box is affected
            if velocity[axis] * outward > 0.0 {
                velocity[axis] = match policy {
                    BoundaryPolicy::Bounce => -velocity[axis] * restitution,
                    _ => 0.0,
                };
            }
        }

        if floor {
            BoundaryContact::Floor
        } else {
            BoundaryContact::Wall
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> Arena {
        Arena::from_config(&ArenaConfig::default())
    }

    #[test]
    fn test_contains_and_normalized() {
        let arena = arena();
        assert!(arena.contains(Vec3::new(0.0, 0.0, 100.0)));
        assert!(!arena.contains(Vec3::new(600.0, 0.0, 100.0)));
        let n = arena.normalized(Vec3::new(-500.0, 500.0, 150.0));
        assert_eq!(n, Vec3::new(0.0, 1.0, 0.5));
    }

    #[test]
    fn test_clamp_cancels_outward_velocity() {
        let arena = arena();
        let mut pos = Vec3::new(510.0, 0.0, 100.0);
        let mut vel = Vec3::new(50.0, 10.0, 0.0);
        let contact = arena.constrain(&mut pos, &mut vel, BoundaryPolicy::Clamp, 0.5);
        assert_eq!(contact, BoundaryContact::Wall);
        assert_eq!(pos.x, 500.0);
        assert_eq!(vel, Vec3::new(0.0, 10.0, 0.0));
    }

    #[test]
    fn test_bounce_reflects() {
        let arena = arena();
        let mut pos = Vec3::new(0.0, -520.0, 100.0);
        let mut vel = Vec3::new(0.0, -40.0, 0.0);
        arena.constrain(&mut pos, &mut vel, BoundaryPolicy::Bounce, 0.5);
        assert_eq!(pos.y, -500.0);
        assert_eq!(vel.y, 20.0);
    }

    #[test]
    fn test_floor_contact() {
        let arena = arena();
        let mut pos = Vec3::new(0.0, 0.0, -3.0);
        let mut vel = Vec3::new(10.0, 0.0, -30.0);
        let contact = arena.constrain(&mut pos, &mut vel, BoundaryPolicy::Clamp, 0.5);
        assert_eq!(contact, BoundaryContact::Floor);
        assert_eq!(pos.z, 0.0);
        assert_eq!(vel.z, 0.0);
    }

    #[test]
    fn test_destroy_policy() {
        let arena = arena();
        let mut pos = Vec3::new(0.0, 0.0, 301.0);
        let mut vel = Vec3::ZERO;
        let contact = arena.constrain(&mut pos, &mut vel, BoundaryPolicy::Destroy, 0.5);
        assert_eq!(contact, BoundaryContact::Destroyed);
    }
}
