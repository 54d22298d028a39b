//! The session manager: tracks every live connection and its nickname.
//!
//! It is responsible for:
//! - Allocating a pooled [`Session`] when a transport reports a connect
//! - Returning it to the pool when the connection goes away
//! - Keeping nicknames unique across the server
//!
//! # Concurrency note
//!
//! Both maps are `DashMap`s, so the manager is shared as a plain
//! `Arc<SessionManager>` with no outer lock. Claiming a nickname goes
//! through the nickname map's entry API, which makes "check then insert"
//! atomic per nickname.

use std::net::SocketAddr;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ircforge_transport::SessionId;

use crate::session::is_valid_nickname;
use crate::{PoolConfig, Session, SessionError, SessionPool};

/// Tracks all connected sessions.
///
/// ## Lifecycle
///
/// ```text
/// connect() ──→ claim_nick() / update() ... ──→ disconnect()
///    │                                              │
///    └──── pool.acquire()              pool.release() ┘
/// ```
pub struct SessionManager {
    sessions: DashMap<SessionId, Session>,
    /// Case-folded nickname → owning session.
    nicks: DashMap<String, SessionId>,
    pool: SessionPool,
}

impl SessionManager {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            nicks: DashMap::new(),
            pool: SessionPool::new(config),
        }
    }

    /// Allocates a session for a new connection.
    ///
    /// # Errors
    /// [`SessionError::AlreadyConnected`] if `id` is already live.
    pub fn connect(
        &self,
        id: SessionId,
        endpoint: Option<SocketAddr>,
    ) -> Result<(), SessionError> {
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => Err(SessionError::AlreadyConnected(id)),
            Entry::Vacant(slot) => {
                slot.insert(self.pool.acquire(id.clone(), endpoint));
                tracing::info!(session_id = %id, ?endpoint, "session created");
                Ok(())
            }
        }
    }

    /// Removes a session, frees its nickname and returns it to the pool.
    ///
    /// Returns a copy of the final state so callers can still announce
    /// the departure (QUIT fan-out needs the old `nick!user@host`).
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if `id` is unknown.
    pub fn disconnect(&self, id: &SessionId) -> Result<Session, SessionError> {
        let (_, session) = self
            .sessions
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;

        if session.nick_sent {
            self.nicks
                .remove_if(&fold(&session.nickname), |_, owner| owner == id);
        }
        tracing::info!(session_id = %id, nick = %session.nickname, "session closed");

        let last = session.clone();
        self.pool.release(session);
        Ok(last)
    }

    /// Returns a copy of the session's current state.
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id).map(|s| s.clone())
    }

    /// Runs `f` against the live session.
    ///
    /// Nickname changes must go through [`claim_nick`](Self::claim_nick)
    /// instead, or the nickname index goes stale.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if `id` is unknown.
    pub fn update<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, SessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        Ok(f(&mut session))
    }

    /// Gives `nickname` to session `id`.
    ///
    /// Returns the nickname the session had before, if any. Changing only
    /// the case of one's own nickname is allowed.
    ///
    /// # Errors
    /// - [`SessionError::InvalidNick`] on bad syntax
    /// - [`SessionError::NickInUse`] if another session holds it
    /// - [`SessionError::NotFound`] if `id` is unknown
    pub fn claim_nick(
        &self,
        id: &SessionId,
        nickname: &str,
    ) -> Result<Option<String>, SessionError> {
        if !is_valid_nickname(nickname) {
            return Err(SessionError::InvalidNick(nickname.to_owned()));
        }
        if !self.sessions.contains_key(id) {
            return Err(SessionError::NotFound(id.clone()));
        }

        let key = fold(nickname);
        match self.nicks.entry(key.clone()) {
            Entry::Occupied(owner) if owner.get() != id => {
                return Err(SessionError::NickInUse(nickname.to_owned()));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }

        let previous = self.update(id, |session| {
            let previous = session.nick_sent.then(|| session.nickname.clone());
            session.set_nick(nickname);
            previous
        });

        let previous = match previous {
            Ok(previous) => previous,
            Err(e) => {
                // Disconnected between the check and the update.
                self.nicks.remove_if(&key, |_, owner| owner == id);
                return Err(e);
            }
        };

        if let Some(old) = &previous {
            let old_key = fold(old);
            if old_key != key {
                self.nicks.remove_if(&old_key, |_, owner| owner == id);
            }
        }
        tracing::debug!(session_id = %id, %nickname, ?previous, "nickname claimed");
        Ok(previous)
    }

    /// Looks up the session holding `nickname` (case-insensitive).
    pub fn find_by_nick(&self, nickname: &str) -> Option<SessionId> {
        self.nicks.get(&fold(nickname)).map(|id| id.clone())
    }

    pub fn nick_in_use(&self, nickname: &str) -> bool {
        self.nicks.contains_key(&fold(nickname))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

fn fold(nickname: &str) -> String {
    nickname.to_ascii_lowercase()
}

// =========================================================================
// Tests
// =========================================================================
