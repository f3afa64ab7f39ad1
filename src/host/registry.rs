//! Session registry owned by the host

use std::collections::BTreeMap;

use anyhow::Result;

use super::session::{GameSession, LifecycleCommand, SessionId, SessionStatus, TeamController};
use crate::{env::combat::CombatConfig, error::SkyBattleError};

/// Sessions by id; ids are never reused
#[derive(Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, GameSession>,
    next_id: SessionId,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a session in the `Created` state
    pub fn create(&mut self, config: CombatConfig, red: TeamController, blue: TeamController) -> Result<SessionId> {
        let id = self.next_id + 1;
        let session = GameSession::new(id, config, red, blue)?;
        self.next_id = id;
        self.sessions.insert(id, session);
        tracing::info!(session = id, "created session");
        Ok(id)
    }

    /// Register a session built by the caller under its own id
    pub fn insert(&mut self, session: GameSession) -> SessionId {
        let id = session.id();
        self.next_id = self.next_id.max(id);
        self.sessions.insert(id, session);
        id
    }

    pub fn get(&self, id: SessionId) -> Result<&GameSession> {
        self.sessions.get(&id).ok_or_else(|| SkyBattleError::SessionNotFound(id).into())
    }

    pub fn get_mut(&mut self, id: SessionId) -> Result<&mut GameSession> {
        self.sessions.get_mut(&id).ok_or_else(|| SkyBattleError::SessionNotFound(id).into())
    }

    pub fn control(&mut self, id: SessionId, command: LifecycleCommand) -> Result<SessionStatus> {
        self.get_mut(id)?.control(command)
    }

    /// Remove a session, dropping its engine
    pub fn remove(&mut self, id: SessionId) -> Result<GameSession> {
        let session = self.sessions.remove(&id).ok_or(SkyBattleError::SessionNotFound(id))?;
        tracing::info!(session = id, "removed session");
        Ok(session)
    }

    /// Advance every running session by one tick; returns how many ticked
    pub fn tick_all(&mut self) -> usize {
        self.sessions.values_mut().filter_map(|s| s.tick()).count()
    }

    pub fn ids(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.sessions.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
