//! Versioned session storage with optimistic concurrency.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::game::rules::RuleError;
use crate::game::state::{GameSession, SessionId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error("session {0} already exists")]
    AlreadyExists(SessionId),
    #[error("session {session_id} moved from version {expected} to {actual}")]
    Conflict {
        session_id: SessionId,
        expected: u64,
        actual: u64,
    },
    #[error("{0}")]
    Unavailable(String),
}

impl From<StoreError> for RuleError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(session_id) => RuleError::SessionNotFound { session_id },
            StoreError::AlreadyExists(session_id) => RuleError::SessionExists { session_id },
            StoreError::Conflict { .. } => RuleError::ConcurrencyConflict { attempts: 1 },
            StoreError::Unavailable(message) => RuleError::StoreUnavailable { message },
        }
    }
}

/// A session as read from the store, tagged with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedSession {
    pub version: u64,
    pub session: GameSession,
}

pub trait SessionStore: Send + Sync {
    fn load(&self, session_id: &str) -> Result<VersionedSession, StoreError>;

    fn insert(&self, session: GameSession) -> Result<u64, StoreError>;

    /// Writes `session` only if the stored version still equals
    /// `expected_version`. Returns the new version.
    fn commit(&self, session: GameSession, expected_version: u64) -> Result<u64, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionId, VersionedSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_sessions<T>(
        &self,
        f: impl FnOnce(&mut HashMap<SessionId, VersionedSession>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| StoreError::Unavailable("session store lock poisoned".into()))?;
        f(&mut sessions)
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self, session_id: &str) -> Result<VersionedSession, StoreError> {
        self.with_sessions(|sessions| {
            sessions
                .get(session_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(session_id.to_owned()))
        })
    }

    fn insert(&self, session: GameSession) -> Result<u64, StoreError> {
        self.with_sessions(|sessions| {
            if sessions.contains_key(&session.session_id) {
                return Err(StoreError::AlreadyExists(session.session_id));
            }
            sessions.insert(
                session.session_id.clone(),
                VersionedSession {
                    version: 1,
                    session,
                },
            );
            Ok(1)
        })
    }

    fn commit(&self, session: GameSession, expected_version: u64) -> Result<u64, StoreError> {
        self.with_sessions(|sessions| {
            let stored = sessions
                .get_mut(&session.session_id)
                .ok_or_else(|| StoreError::NotFound(session.session_id.clone()))?;
            if stored.version != expected_version {
                return Err(StoreError::Conflict {
                    session_id: session.session_id,
                    expected: expected_version,
                    actual: stored.version,
                });
            }
            stored.version += 1;
            stored.session = session;
            Ok(stored.version)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::PlayerState;

    fn session(id: &str) -> GameSession {
        GameSession::new(
            id,
            "lobby",
            vec![PlayerState::new("a", 8000), PlayerState::new("b", 8000)],
        )
    }

    #[test]
    fn commit_bumps_version() {
        let store = InMemorySessionStore::new();
        assert_eq!(store.insert(session("s1")), Ok(1));

        let mut loaded = store.load("s1").expect("inserted");
        loaded.session.turn_number = 2;
        assert_eq!(store.commit(loaded.session, loaded.version), Ok(2));
        assert_eq!(store.load("s1").map(|v| v.session.turn_number), Ok(2));
    }

    #[test]
    fn stale_commit_conflicts() {
        let store = InMemorySessionStore::new();
        store.insert(session("s1")).expect("insert");
        let first = store.load("s1").expect("load");
        let second = store.load("s1").expect("load");

        store
            .commit(first.session, first.version)
            .expect("first writer wins");
        let err = store
            .commit(second.session, second.version)
            .expect_err("second writer is stale");
        assert_eq!(
            err,
            StoreError::Conflict {
                session_id: "s1".into(),
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn duplicate_insert_and_missing_load() {
        let store = InMemorySessionStore::new();
        store.insert(session("s1")).expect("insert");
        assert_eq!(
            store.insert(session("s1")),
            Err(StoreError::AlreadyExists("s1".into()))
        );
        assert_eq!(
            RuleError::from(store.load("nope").expect_err("missing")),
            RuleError::SessionNotFound {
                session_id: "nope".into()
            }
        );
    }
}
