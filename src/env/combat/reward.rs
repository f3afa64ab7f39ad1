//! Reward computation
//!
//! Rewards are a pure function of what changed during one tick, the episode
//! outcome (if it just ended) and the configured weights.

use super::{
    config::RewardWeights,
    types::{DroneId, Outcome, Team},
};

/// What happened to one drone during a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DroneDelta {
    pub id: DroneId,
    pub team: Team,
    /// Alive at the end of the tick
    pub alive: bool,
    /// Died during this tick
    pub died: bool,
    pub damage_dealt: f32,
    pub damage_taken: f32,
    pub kills: u32,
}

impl DroneDelta {
    /// Delta for a drone that did nothing this tick
    pub fn quiet(id: DroneId, team: Team, alive: bool) -> Self {
        Self { id, team, alive, died: false, damage_dealt: 0.0, damage_taken: 0.0, kills: 0 }
    }

    /// Dead before this tick started
    pub fn was_dead(&self) -> bool {
        !self.alive && !self.died
    }
}

/// Per-drone deltas for one tick, in id order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickDeltas {
    pub drones: Vec<DroneDelta>,
}

/// Compute one reward per drone, in id order
///
/// Drones that were already dead before the tick only receive the terminal
/// outcome term. They take no part in team blending, neither as receivers
/// nor in the team mean.
pub fn compute_rewards(
    deltas: &TickDeltas,
    outcome: Option<Outcome>,
    weights: &RewardWeights,
) -> Vec<f32> {
    let mut rewards: Vec<f32> = deltas
        .drones
        .iter()
        .map(|d| {
            let mut r = 0.0;
            if d.alive {
                r += weights.survival;
            }
            r += weights.damage_dealt * d.damage_dealt;
            r -= weights.damage_taken * d.damage_taken;
            r += weights.kill * d.kills as f32;
            if d.died {
                r -= weights.death;
            }
            if let Some(outcome) = outcome {
                r += match outcome {
                    Outcome::Win(team) if team == d.team => weights.win,
                    Outcome::Win(_) => -weights.loss,
                    Outcome::Draw => weights.draw,
                };
            }
            r
        })
        .collect();

    if weights.team_weight > 0.0 {
        for team in Team::all() {
            let members: Vec<usize> = deltas
                .drones
                .iter()
                .enumerate()
                .filter(|(_, d)| d.team == team && !d.was_dead())
                .map(|(i, _)| i)
                .collect();
            if members.is_empty() {
                continue;
            }
            let mean = members.iter().map(|&i| rewards[i]).sum::<f32>() / members.len() as f32;
            for &i in &members {
                rewards[i] = (1.0 - weights.team_weight) * rewards[i] + weights.team_weight * mean;
            }
        }
    }

    rewards
}
