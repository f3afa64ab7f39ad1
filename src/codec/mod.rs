//! Observation/action codec
//!
//! Translates between the world state and the fixed-length vectors the
//! networks consume and produce. Shapes depend only on the team size and are
//! recorded in a [`ModelSignature`] so mismatched models are rejected.

pub mod action;
pub mod observation;

use serde::{Deserialize, Serialize};

pub use action::{decode_action, encode_action, idle_action, ACTION_DIM, CONTINUOUS_DIM, TRIGGER_DIM};
pub use observation::ObservationCodec;

use crate::error::SkyBattleError;

/// Version of the observation/action layout
pub const LAYOUT_VERSION: u32 = 1;

/// Shapes a model was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub team_size: usize,
    pub obs_dim: usize,
    pub state_dim: usize,
    pub action_dim: usize,
    pub layout_version: u32,
}

impl ModelSignature {
    /// Signature of the current layout for a team size
    pub fn for_team_size(team_size: usize) -> Self {
        let codec = ObservationCodec::new(team_size);
        Self {
            team_size,
            obs_dim: codec.obs_dim(),
            state_dim: codec.state_dim(),
            action_dim: ACTION_DIM,
            layout_version: LAYOUT_VERSION,
        }
    }

    /// Fail with a signature mismatch unless `other` matches exactly
    pub fn ensure_matches(&self, other: &ModelSignature) -> anyhow::Result<()> {
        if self != other {
            return Err(SkyBattleError::SignatureMismatch {
                expected: self.to_string(),
                found: other.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl std::fmt::Display for ModelSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "team_size={} obs={} state={} action={} v{}",
            self.team_size, self.obs_dim, self.state_dim, self.action_dim, self.layout_version
        )
    }
}
