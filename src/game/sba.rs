use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::state::{EndReason, GameEvent, GameOutcome, GameSession, PlayerId, PlayerState};

/// Board-legality findings. Reported, never game-ending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum BoardWarning {
    NegativeStat {
        player_id: PlayerId,
        card_id: String,
        attack: i32,
        defense: i32,
    },
    BoardOverCapacity {
        player_id: PlayerId,
        count: usize,
        capacity: u8,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SbaVerdict {
    pub game_ended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<EndReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<BoardWarning>,
}

impl SbaVerdict {
    fn from_outcome(outcome: &GameOutcome) -> Self {
        Self {
            game_ended: true,
            winner_id: outcome.winner_id.clone(),
            reasons: outcome.reasons.clone(),
            warnings: Vec::new(),
        }
    }

    pub fn is_draw(&self) -> bool {
        self.game_ended && self.winner_id.is_none()
    }
}

type LossCheck = fn(&PlayerState) -> Option<EndReason>;

fn conceded(player: &PlayerState) -> Option<EndReason> {
    player.conceded.then(|| EndReason::Forfeit {
        loser: player.id.clone(),
    })
}

fn life_points_depleted(player: &PlayerState) -> Option<EndReason> {
    (player.life_points == 0).then(|| EndReason::LifePointsDepleted {
        loser: player.id.clone(),
    })
}

fn decked_out(player: &PlayerState) -> Option<EndReason> {
    player.decked_out.then(|| EndReason::DeckOut {
        loser: player.id.clone(),
    })
}

/// Highest priority first. The first check that finds a loser decides the game.
const LOSS_CHECKS: [LossCheck; 3] = [conceded, life_points_depleted, decked_out];

/// Scans a session for game-ending conditions.
#[derive(Debug, Clone, Copy)]
pub struct StateBasedActions {
    max_board_size: u8,
}

impl StateBasedActions {
    pub fn new(max_board_size: u8) -> Self {
        Self { max_board_size }
    }

    /// Pure evaluation. A session that already carries an outcome keeps it.
    pub fn evaluate(&self, session: &GameSession) -> SbaVerdict {
        if let Some(outcome) = &session.outcome {
            return SbaVerdict::from_outcome(outcome);
        }

        let mut verdict = SbaVerdict {
            warnings: self.board_warnings(session),
            ..SbaVerdict::default()
        };

        for check in LOSS_CHECKS {
            let reasons: Vec<EndReason> = session.players.iter().filter_map(check).collect();
            if reasons.is_empty() {
                continue;
            }
            let survivors: Vec<&PlayerState> = session
                .players
                .iter()
                .filter(|player| !reasons.iter().any(|reason| reason.loser() == player.id))
                .collect();
            verdict.game_ended = true;
            verdict.winner_id = match survivors.as_slice() {
                [winner] => Some(winner.id.clone()),
                _ => None,
            };
            verdict.reasons = reasons;
            break;
        }

        verdict
    }

    /// Evaluates and, on a terminal verdict, marks the session finished.
    pub fn apply(&self, session: &mut GameSession) -> SbaVerdict {
        let already_finished = session.is_finished();
        let verdict = self.evaluate(session);

        for warning in &verdict.warnings {
            warn!(session = %session.session_id, ?warning, "board legality warning");
        }

        if verdict.game_ended && !already_finished {
            info!(
                session = %session.session_id,
                winner = ?verdict.winner_id,
                reasons = ?verdict.reasons,
                "game ended"
            );
            session.outcome = Some(GameOutcome {
                winner_id: verdict.winner_id.clone(),
                reasons: verdict.reasons.clone(),
            });
            session.record_event(GameEvent::GameEnded {
                winner_id: verdict.winner_id.clone(),
                reasons: verdict.reasons.clone(),
            });
        }

        verdict
    }

    fn board_warnings(&self, session: &GameSession) -> Vec<BoardWarning> {
        let mut warnings = Vec::new();
        for player in &session.players {
            if player.board.len() > usize::from(self.max_board_size) {
                warnings.push(BoardWarning::BoardOverCapacity {
                    player_id: player.id.clone(),
                    count: player.board.len(),
                    capacity: self.max_board_size,
                });
            }
            for entry in &player.board {
                if entry.attack < 0 || entry.defense < 0 {
                    warnings.push(BoardWarning::NegativeStat {
                        player_id: player.id.clone(),
                        card_id: entry.card.id.clone(),
                        attack: entry.attack,
                        defense: entry.defense,
                    });
                }
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{BoardEntry, CardRef};

    fn sba() -> StateBasedActions {
        StateBasedActions::new(5)
    }

    fn session() -> GameSession {
        GameSession::new(
            "s",
            "l",
            vec![
                PlayerState::new("alice", 8000),
                PlayerState::new("bob", 8000),
            ],
        )
    }

    fn set_life(session: &mut GameSession, id: &str, life: u32) {
        if let Some(player) = session.get_player_mut(id) {
            player.life_points = life;
        }
    }

    #[test]
    fn healthy_session_continues() {
        let verdict = sba().evaluate(&session());
        assert!(!verdict.game_ended);
        assert!(verdict.winner_id.is_none());
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn zero_life_points_lose() {
        let mut session = session();
        set_life(&mut session, "bob", 0);

        let verdict = sba().apply(&mut session);

        assert!(verdict.game_ended);
        assert_eq!(verdict.winner_id.as_deref(), Some("alice"));
        assert_eq!(
            verdict.reasons,
            vec![EndReason::LifePointsDepleted { loser: "bob".into() }]
        );
        assert_eq!(
            session.outcome.as_ref().and_then(|o| o.winner_id.as_deref()),
            Some("alice")
        );
        assert!(matches!(
            session.event_log.last(),
            Some(GameEvent::GameEnded { .. })
        ));
    }

    #[test]
    fn simultaneous_zero_is_a_draw() {
        let mut session = session();
        set_life(&mut session, "alice", 0);
        set_life(&mut session, "bob", 0);

        let verdict = sba().apply(&mut session);

        assert!(verdict.is_draw());
        assert_eq!(verdict.reasons.len(), 2);
        assert!(session.is_finished());
    }

    #[test]
    fn life_loss_outranks_deck_out() {
        let mut session = session();
        set_life(&mut session, "alice", 0);
        if let Some(bob) = session.get_player_mut("bob") {
            bob.decked_out = true;
        }

        let verdict = sba().evaluate(&session);

        assert_eq!(verdict.winner_id.as_deref(), Some("bob"));
        assert_eq!(
            verdict.reasons,
            vec![EndReason::LifePointsDepleted {
                loser: "alice".into()
            }]
        );
    }

    #[test]
    fn deck_out_loses() {
        let mut session = session();
        if let Some(alice) = session.get_player_mut("alice") {
            alice.decked_out = true;
        }
        let verdict = sba().evaluate(&session);
        assert_eq!(verdict.winner_id.as_deref(), Some("bob"));
        assert_eq!(
            verdict.reasons,
            vec![EndReason::DeckOut {
                loser: "alice".into()
            }]
        );
    }

    #[test]
    fn forfeit_loses_even_when_opponent_is_at_zero() {
        let mut session = session();
        set_life(&mut session, "bob", 0);
        if let Some(alice) = session.get_player_mut("alice") {
            alice.conceded = true;
        }
        let verdict = sba().evaluate(&session);
        assert_eq!(verdict.winner_id.as_deref(), Some("bob"));
    }

    #[test]
    fn stat_floor_violation_is_informational() {
        let mut session = session();
        if let Some(alice) = session.get_player_mut("alice") {
            alice.board.push(BoardEntry::new(CardRef::new("c", "d"), 0, -100, 300));
        }
        let verdict = sba().evaluate(&session);
        assert!(!verdict.game_ended);
        assert_eq!(verdict.warnings.len(), 1);
    }

    #[test]
    fn finished_session_keeps_its_outcome() {
        let mut session = session();
        set_life(&mut session, "bob", 0);
        sba().apply(&mut session);
        set_life(&mut session, "alice", 0);

        let verdict = sba().apply(&mut session);

        assert_eq!(verdict.winner_id.as_deref(), Some("alice"));
        let ended = session
            .event_log
            .iter()
            .filter(|event| matches!(event, GameEvent::GameEnded { .. }))
            .count();
        assert_eq!(ended, 1);
    }
}
