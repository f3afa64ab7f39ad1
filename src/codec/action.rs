//! Action vector decoding
//!
//! An action vector is `[throttle, pitch, yaw, roll, boost, fire_gun,
//! fire_missile, flare]`. The first four components are continuous axes, the
//! last four are triggers.

use crate::env::combat::ControlInput;

/// Continuous axes at the front of the vector
pub const CONTINUOUS_DIM: usize = 4;
/// Trigger flags after the continuous axes
pub const TRIGGER_DIM: usize = 4;
/// Total action vector length
pub const ACTION_DIM: usize = CONTINUOUS_DIM + TRIGGER_DIM;
/// A trigger component above this value fires
pub const TRIGGER_THRESHOLD: f32 = 0.5;

/// Decode a raw action vector into a control input
///
/// Continuous components are clamped to `[-1, 1]` with NaN mapped to zero;
/// triggers fire above [`TRIGGER_THRESHOLD`] and never on NaN. Vectors of
/// the wrong length are zero-padded or truncated.
pub fn decode_action(action: &[f32]) -> ControlInput {
    if action.len() != ACTION_DIM {
        tracing::debug!(len = action.len(), expected = ACTION_DIM, "action vector has wrong length");
    }
    let at = |i: usize| action.get(i).copied().unwrap_or(0.0);
    let axis = |i: usize| {
        let v = at(i);
        if v.is_nan() {
            0.0
        } else {
            v.clamp(-1.0, 1.0)
        }
    };
    // NaN compares false, so it never fires
    let trigger = |i: usize| at(i) > TRIGGER_THRESHOLD;

    ControlInput {
        throttle: axis(0),
        pitch: axis(1),
        yaw: axis(2),
        roll: axis(3),
        boost: trigger(4),
        fire_gun: trigger(5),
        fire_missile: trigger(6),
        deploy_flare: trigger(7),
    }
}

/// Encode a control input back into an action vector
pub fn encode_action(input: &ControlInput) -> Vec<f32> {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    vec![
        input.throttle,
        input.pitch,
        input.yaw,
        input.roll,
        flag(input.boost),
        flag(input.fire_gun),
        flag(input.fire_missile),
        flag(input.deploy_flare),
    ]
}

/// Action vector that does nothing
pub fn idle_action() -> Vec<f32> {
    vec![0.0; ACTION_DIM]
}
