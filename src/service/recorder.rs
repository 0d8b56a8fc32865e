//! Collaborators notified outside the rules transaction.

use std::sync::Mutex;

use tracing::info;

/// Receives one notice per finished match.
pub trait MatchRecorder: Send + Sync {
    fn match_completed(&self, lobby_id: &str, session_id: &str, winner_id: Option<&str>);
}

/// Writes completion notices to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMatchRecorder;

impl MatchRecorder for LogMatchRecorder {
    fn match_completed(&self, lobby_id: &str, session_id: &str, winner_id: Option<&str>) {
        info!(lobby = lobby_id, session = session_id, winner = ?winner_id, "match completed");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedMatch {
    pub lobby_id: String,
    pub session_id: String,
    pub winner_id: Option<String>,
}

/// Keeps completion notices in memory.
#[derive(Debug, Default)]
pub struct MemoryMatchRecorder {
    completed: Mutex<Vec<CompletedMatch>>,
}

impl MemoryMatchRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> Vec<CompletedMatch> {
        self.completed
            .lock()
            .map(|completed| completed.clone())
            .unwrap_or_default()
    }
}

impl MatchRecorder for MemoryMatchRecorder {
    fn match_completed(&self, lobby_id: &str, session_id: &str, winner_id: Option<&str>) {
        if let Ok(mut completed) = self.completed.lock() {
            completed.push(CompletedMatch {
                lobby_id: lobby_id.to_owned(),
                session_id: session_id.to_owned(),
                winner_id: winner_id.map(str::to_owned),
            });
        }
    }
}

/// Source of the millisecond timestamps stored on sessions.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that always reads the same instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.0
    }
}
