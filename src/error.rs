//! Error taxonomy
//!
//! Public fallible functions return `anyhow::Result`. The variants below are
//! the structured failures callers may want to match on; recover them with
//! `err.downcast_ref::<SkyBattleError>()`.

use thiserror::Error;

/// Structured errors raised by the simulation, codec, trainer and host.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SkyBattleError {
    /// A configuration value was rejected before any work started
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A model artifact does not match the shapes the caller expects
    #[error("model signature mismatch: expected {expected}, found {found}")]
    SignatureMismatch {
        /// Signature the caller asked for
        expected: String,
        /// Signature stored in the artifact
        found: String,
    },

    /// Loss or gradients became non-finite during an update
    #[error("training diverged at update {update}: {reason}")]
    TrainingDivergence {
        /// Update counter when the divergence was detected
        update: usize,
        /// What went non-finite
        reason: String,
    },

    /// A lifecycle command is not valid in the session's current status
    #[error("command {command} is not valid while session is {status}")]
    InvalidCommand {
        /// Command that was rejected
        command: String,
        /// Status the session was in
        status: String,
    },

    /// No session is registered under the given id
    #[error("session {0} not found")]
    SessionNotFound(u64),
}

impl SkyBattleError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_from_anyhow() {
        let err: anyhow::Error = SkyBattleError::config("team_size must be positive").into();
        let typed = err.downcast_ref::<SkyBattleError>();
        assert_eq!(typed, Some(&SkyBattleError::Config("team_size must be positive".into())));
    }

    #[test]
    fn test_display() {
        let err = SkyBattleError::InvalidCommand { command: "Resume".into(), status: "Created".into() };
        assert_eq!(err.to_string(), "command Resume is not valid while session is Created");
    }
}
