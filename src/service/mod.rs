//! Store-backed match service.
//!
//! Every intent is a read, a pure rules transaction and a versioned commit.
//! A commit that loses a race is retried from a fresh read; the rules core
//! has no hidden state, so a retry reproduces the same outcome.

mod recorder;
mod store;

pub use recorder::{
    Clock, CompletedMatch, FixedClock, LogMatchRecorder, MatchRecorder, MemoryMatchRecorder,
    SystemClock,
};
pub use store::{InMemorySessionStore, SessionStore, StoreError, VersionedSession};

use tracing::{debug, warn};

use crate::game::combat::CombatResult;
use crate::game::rules::{
    AttackAction, MatchSetup, PhaseAction, RuleEngine, RuleError, SessionSummary, SummonAction,
};
use crate::game::sba::SbaVerdict;
use crate::game::state::GameSession;
use crate::game::turn::EndTurnResult;

pub struct MatchService<S, R, C> {
    engine: RuleEngine,
    store: S,
    recorder: R,
    clock: C,
}

impl<S, R, C> MatchService<S, R, C>
where
    S: SessionStore,
    R: MatchRecorder,
    C: Clock,
{
    pub fn new(engine: RuleEngine, store: S, recorder: R, clock: C) -> Self {
        Self {
            engine,
            store,
            recorder,
            clock,
        }
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn create_match(&self, setup: &MatchSetup) -> Result<GameSession, RuleError> {
        let session = self.engine.create_match(setup, self.clock.now_millis())?;
        self.store.insert(session.clone())?;
        self.notify_if_ended(false, &session);
        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> Result<GameSession, RuleError> {
        Ok(self.store.load(session_id)?.session)
    }

    pub fn advance_phase(
        &self,
        session_id: &str,
        action: &PhaseAction,
    ) -> Result<SessionSummary, RuleError> {
        self.run(session_id, |engine, session| engine.advance_phase(session, action))
    }

    pub fn normal_summon(
        &self,
        session_id: &str,
        action: &SummonAction,
    ) -> Result<SessionSummary, RuleError> {
        self.run(session_id, |engine, session| engine.normal_summon(session, action))
    }

    pub fn declare_attack(
        &self,
        session_id: &str,
        action: &AttackAction,
    ) -> Result<CombatResult, RuleError> {
        self.run(session_id, |engine, session| engine.declare_attack(session, action))
    }

    pub fn end_turn(&self, session_id: &str, player_id: &str) -> Result<EndTurnResult, RuleError> {
        self.run(session_id, |engine, session| engine.end_turn(session, player_id))
    }

    pub fn forfeit(&self, session_id: &str, player_id: &str) -> Result<SbaVerdict, RuleError> {
        self.run(session_id, |engine, session| engine.forfeit(session, player_id))
    }

    fn run<T>(
        &self,
        session_id: &str,
        op: impl Fn(&RuleEngine, &mut GameSession) -> Result<T, RuleError>,
    ) -> Result<T, RuleError> {
        let attempts = self.engine.config().max_commit_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let VersionedSession {
                version,
                mut session,
            } = self.store.load(session_id)?;
            let was_finished = session.is_finished();

            let value = op(&self.engine, &mut session)?;
            session.last_move_at = self.clock.now_millis();

            match self.store.commit(session.clone(), version) {
                Ok(_) => {
                    self.notify_if_ended(was_finished, &session);
                    return Ok(value);
                }
                Err(StoreError::Conflict { .. }) => {
                    debug!(session = session_id, attempt, "commit conflicted, retrying");
                }
                Err(error) => return Err(error.into()),
            }
        }
        warn!(session = session_id, attempts, "giving up after repeated conflicts");
        Err(RuleError::ConcurrencyConflict { attempts })
    }

    fn notify_if_ended(&self, was_finished: bool, session: &GameSession) {
        if was_finished {
            return;
        }
        if let Some(outcome) = &session.outcome {
            self.recorder.match_completed(
                &session.lobby_id,
                &session.session_id,
                outcome.winner_id.as_deref(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::game::catalog::{CardDefinition, StaticCardCatalog};
    use crate::game::config::EngineConfig;
    use crate::game::rules::{ErrorCategory, PlayerSetup};
    use crate::game::state::GamePhase;

    /// Rejects the next `conflicts` commits as if another writer got there first.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemorySessionStore,
        conflicts: AtomicU32,
        commits: AtomicU32,
    }

    impl FlakyStore {
        fn failing(conflicts: u32) -> Self {
            Self {
                conflicts: AtomicU32::new(conflicts),
                ..Self::default()
            }
        }
    }

    impl SessionStore for FlakyStore {
        fn load(&self, session_id: &str) -> Result<VersionedSession, StoreError> {
            self.inner.load(session_id)
        }

        fn insert(&self, session: GameSession) -> Result<u64, StoreError> {
            self.inner.insert(session)
        }

        fn commit(&self, session: GameSession, expected_version: u64) -> Result<u64, StoreError> {
            let pending = self.conflicts.load(Ordering::SeqCst);
            if pending > 0 {
                self.conflicts.store(pending - 1, Ordering::SeqCst);
                return Err(StoreError::Conflict {
                    session_id: session.session_id,
                    expected: expected_version,
                    actual: expected_version + 1,
                });
            }
            self.commits.fetch_add(1, Ordering::SeqCst);
            self.inner.commit(session, expected_version)
        }
    }

    fn service(conflicts: u32) -> MatchService<FlakyStore, MemoryMatchRecorder, FixedClock> {
        let catalog = Arc::new(StaticCardCatalog::new(vec![CardDefinition::monster(
            "knight", 1800, 1200,
        )]));
        MatchService::new(
            RuleEngine::new(catalog, EngineConfig::default()),
            FlakyStore::failing(conflicts),
            MemoryMatchRecorder::new(),
            FixedClock(42),
        )
    }

    fn setup() -> MatchSetup {
        MatchSetup {
            session_id: "m-1".into(),
            lobby_id: "lobby-1".into(),
            players: vec![
                PlayerSetup {
                    id: "alice".into(),
                    deck: vec!["knight".into(); 8],
                },
                PlayerSetup {
                    id: "bob".into(),
                    deck: vec!["knight".into(); 8],
                },
            ],
        }
    }

    fn step(service: &MatchService<FlakyStore, MemoryMatchRecorder, FixedClock>, to: GamePhase) {
        service
            .advance_phase(
                "m-1",
                &PhaseAction {
                    player_id: "alice".into(),
                    requested_phase: to,
                },
            )
            .expect("legal phase step");
    }

    #[test]
    fn conflicts_are_retried_transparently() {
        let service = service(2);
        service.create_match(&setup()).expect("match created");

        step(&service, GamePhase::Standby);

        let session = service.get_session("m-1").expect("stored");
        assert_eq!(session.current_phase, GamePhase::Standby);
        assert_eq!(session.last_move_at, 42);
        assert_eq!(service.store().commits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exhausted_retries_are_transient() {
        let service = service(10);
        service.create_match(&setup()).expect("match created");

        let err = service
            .advance_phase(
                "m-1",
                &PhaseAction {
                    player_id: "alice".into(),
                    requested_phase: GamePhase::Standby,
                },
            )
            .expect_err("every commit conflicts");
        assert_eq!(err, RuleError::ConcurrencyConflict { attempts: 4 });
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert_eq!(
            service.get_session("m-1").map(|s| s.current_phase),
            Ok(GamePhase::Draw)
        );
    }

    #[test]
    fn rejected_intents_do_not_commit() {
        let service = service(0);
        service.create_match(&setup()).expect("match created");

        let err = service
            .end_turn("m-1", "alice")
            .expect_err("draw phase cannot end the turn");
        assert!(matches!(err, RuleError::CannotEndTurnYet { .. }));
        assert_eq!(service.store().commits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn completion_is_recorded_once() {
        let service = service(1);
        service.create_match(&setup()).expect("match created");

        let verdict = service.forfeit("m-1", "bob").expect("forfeit accepted");
        assert_eq!(verdict.winner_id.as_deref(), Some("alice"));

        let err = service
            .forfeit("m-1", "alice")
            .expect_err("game is already over");
        assert_eq!(err, RuleError::GameFinished);

        assert_eq!(
            service.recorder().completed(),
            vec![CompletedMatch {
                lobby_id: "lobby-1".into(),
                session_id: "m-1".into(),
                winner_id: Some("alice".into()),
            }]
        );
    }

    #[test]
    fn duplicate_match_and_unknown_session() {
        let service = service(0);
        service.create_match(&setup()).expect("match created");
        assert_eq!(
            service.create_match(&setup()).expect_err("duplicate id"),
            RuleError::SessionExists {
                session_id: "m-1".into()
            }
        );
        assert_eq!(
            service.end_turn("missing", "alice").expect_err("no session"),
            RuleError::SessionNotFound {
                session_id: "missing".into()
            }
        );
    }

    #[test]
    fn native_host_stamps_wall_clock_time() {
        let catalog = Arc::new(StaticCardCatalog::new(vec![CardDefinition::monster(
            "knight", 1800, 1200,
        )]));
        let service = MatchService::new(
            RuleEngine::new(catalog, EngineConfig::default()),
            InMemorySessionStore::new(),
            LogMatchRecorder,
            SystemClock,
        );
        let session = service.create_match(&setup()).expect("match created");
        assert!(session.created_at > 0);

        service.forfeit("m-1", "alice").expect("forfeit accepted");
        let stored = service.get_session("m-1").expect("stored");
        assert!(stored.is_finished());
        assert!(stored.last_move_at >= session.created_at);
    }
}
