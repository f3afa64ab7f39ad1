//! Environment implementations
//!
//! The combat simulation and the parallel pool that steps many instances of
//! it at once. The multi-agent reset/step contract lives in
//! [`crate::multi_agent::environment`].

use serde::{Deserialize, Serialize};

use self::combat::{CombatEvent, Outcome};

/// Space information for observations and actions
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceInfo {
    /// Shape of the space
    pub shape: Vec<usize>,

    /// Data type
    pub dtype: SpaceType,
}

/// Space data types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpaceType {
    /// Discrete space with n options
    Discrete(usize),

    /// Continuous space (Box)
    Continuous,

    /// Multi-discrete space
    MultiDiscrete,
}

/// Additional step information shared by all agents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Tick counter after the step
    pub step: u32,

    /// Red drones still alive
    pub red_alive: usize,

    /// Blue drones still alive
    pub blue_alive: usize,

    /// Set on the tick the episode ends
    pub outcome: Option<Outcome>,

    /// Hits, kills and missile events of this tick
    pub events: Vec<CombatEvent>,
}

pub mod combat;
pub mod pool;
