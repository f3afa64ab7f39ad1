//! Hosting matches outside of training
//!
//! Sessions run one engine each under explicit lifecycle commands; the
//! registry maps session ids to sessions and is owned by the embedding
//! application.

pub mod registry;
pub mod session;

pub use registry::SessionRegistry;
pub use session::{
    play_match, GameSession, LifecycleCommand, MatchReport, SessionId, SessionMessage, SessionStatus, TeamController,
};
