use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::{
    catalog::{CardCatalog, CardType},
    combat::{CombatResolver, CombatResult},
    config::EngineConfig,
    effects::EffectEngine,
    sba::{SbaVerdict, StateBasedActions},
    state::{
        BattlePosition, BoardEntry, CardId, CardRef, DefinitionId, GameEvent, GamePhase,
        GameSession, IntegrityError, PlayerId, PlayerState, SessionId, PLAYER_COUNT,
    },
    turn::{EndTurnResult, TurnController},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseAction {
    pub player_id: PlayerId,
    pub requested_phase: GamePhase,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttackAction {
    pub player_id: PlayerId,
    pub attacker_card_id: CardId,
    #[serde(default)]
    pub target_card_id: Option<CardId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummonAction {
    pub player_id: PlayerId,
    pub card_id: CardId,
    #[serde(default = "attack_position")]
    pub position: BattlePosition,
}

fn attack_position() -> BattlePosition {
    BattlePosition::Attack
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSetup {
    pub id: PlayerId,
    pub deck: Vec<DefinitionId>,
}

/// Match creation input. The first listed player takes the first turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchSetup {
    pub session_id: SessionId,
    pub lobby_id: String,
    pub players: Vec<PlayerSetup>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    /// Caller's fault; nothing changed.
    Validation,
    /// Corrupt data; the operation aborted without writing.
    Integrity,
    /// The game already ended.
    Terminal,
    /// Safe to retry.
    Transient,
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("the game has already ended")]
    GameFinished,
    #[error("it is {expected}'s turn, not {actual}'s")]
    NotPlayerTurn { expected: PlayerId, actual: PlayerId },
    #[error("player {player_id} is not part of this match")]
    PlayerNotFound { player_id: PlayerId },
    #[error("action not allowed during the {actual:?} phase")]
    InvalidPhase {
        allowed: Vec<GamePhase>,
        actual: GamePhase,
    },
    #[error("cannot move from {from:?} to {requested:?}")]
    PhaseSkip {
        from: GamePhase,
        requested: GamePhase,
    },
    #[error("cannot end turn yet during the {phase:?} phase")]
    CannotEndTurnYet { phase: GamePhase },
    #[error("card {card_id} not found")]
    CardNotFound { card_id: CardId },
    #[error("card {card_id} has already attacked this turn")]
    AlreadyAttacked { card_id: CardId },
    #[error("face-down card {card_id} cannot attack")]
    FaceDownAttacker { card_id: CardId },
    #[error("direct attack blocked by {count} defending monster(s)")]
    DirectAttackBlocked { count: usize },
    #[error("{player_id} has already normal summoned this turn")]
    AlreadyNormalSummoned { player_id: PlayerId },
    #[error("board is full ({capacity} zones)")]
    BoardFull { capacity: u8 },
    #[error("card {card_id} is not a monster")]
    NotAMonster { card_id: CardId },
    #[error("a chain is resolving")]
    ChainResolving,
    #[error("invalid match setup: {reason}")]
    InvalidSetup { reason: String },
    #[error("integrity violation: {error}")]
    IntegrityViolation { error: IntegrityError },
    #[error("session {session_id} not found")]
    SessionNotFound { session_id: SessionId },
    #[error("session {session_id} already exists")]
    SessionExists { session_id: SessionId },
    #[error("update conflicted {attempts} times; safe to retry")]
    ConcurrencyConflict { attempts: u32 },
    #[error("session store unavailable: {message}")]
    StoreUnavailable { message: String },
}

impl RuleError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RuleError::GameFinished => ErrorCategory::Terminal,
            RuleError::IntegrityViolation { .. } => ErrorCategory::Integrity,
            RuleError::ConcurrencyConflict { .. } | RuleError::StoreUnavailable { .. } => {
                ErrorCategory::Transient
            }
            RuleError::SessionNotFound { .. } => ErrorCategory::NotFound,
            _ => ErrorCategory::Validation,
        }
    }

    pub fn rejection(&self) -> Rejection {
        Rejection {
            category: self.category(),
            message: self.to_string(),
            error: self.clone(),
        }
    }
}

impl From<IntegrityError> for RuleError {
    fn from(error: IntegrityError) -> Self {
        RuleError::IntegrityViolation { error }
    }
}

/// Client-facing form of a `RuleError`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rejection {
    pub category: ErrorCategory,
    pub message: String,
    pub error: RuleError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub life_points: u32,
    pub hand: usize,
    pub deck: usize,
    pub board: usize,
    pub graveyard: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub turn_number: u32,
    pub current_phase: GamePhase,
    pub current_turn_player_id: PlayerId,
    pub players: Vec<PlayerSummary>,
    pub game_ended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<PlayerId>,
    #[serde(default)]
    pub events: Vec<GameEvent>,
}

impl SessionSummary {
    pub fn of(session: &GameSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            turn_number: session.turn_number,
            current_phase: session.current_phase,
            current_turn_player_id: session.current_turn_player_id.clone(),
            players: session
                .players
                .iter()
                .map(|player| PlayerSummary {
                    id: player.id.clone(),
                    life_points: player.life_points,
                    hand: player.hand.len(),
                    deck: player.deck.len(),
                    board: player.board.len(),
                    graveyard: player.graveyard.len(),
                })
                .collect(),
            game_ended: session.is_finished(),
            winner_id: session
                .outcome
                .as_ref()
                .and_then(|outcome| outcome.winner_id.clone()),
            events: Vec::new(),
        }
    }
}

pub(crate) fn ensure_turn_owner(session: &GameSession, player_id: &str) -> Result<(), RuleError> {
    if session.current_turn_player_id != player_id {
        return Err(RuleError::NotPlayerTurn {
            expected: session.current_turn_player_id.clone(),
            actual: player_id.to_owned(),
        });
    }
    Ok(())
}

fn ensure_open(session: &GameSession) -> Result<(), RuleError> {
    if session.is_finished() {
        return Err(RuleError::GameFinished);
    }
    session.integrity_check()?;
    if session.chain_resolving() {
        return Err(RuleError::ChainResolving);
    }
    Ok(())
}

/// Runs `op` on a draft copy and only writes it back on success, so a
/// rejected or failed intent never leaves a partial update behind.
fn transact<T>(
    session: &mut GameSession,
    op: impl FnOnce(&mut GameSession) -> Result<T, RuleError>,
) -> Result<(T, Vec<GameEvent>), RuleError> {
    let mut draft = session.clone();
    let mark = draft.event_log.len();
    let value = op(&mut draft)?;
    let events = draft.event_log[mark..].to_vec();
    *session = draft;
    Ok((value, events))
}

/// Validates intents and applies them to a session as single transactions.
#[derive(Clone)]
pub struct RuleEngine {
    catalog: Arc<dyn CardCatalog>,
    config: EngineConfig,
}

impl RuleEngine {
    pub fn new(catalog: Arc<dyn CardCatalog>, config: EngineConfig) -> Self {
        Self { catalog, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &dyn CardCatalog {
        self.catalog.as_ref()
    }

    fn sba(&self) -> StateBasedActions {
        StateBasedActions::new(self.config.max_board_size)
    }

    fn turns(&self) -> TurnController<'_> {
        TurnController::new(
            EffectEngine::new(self.catalog.as_ref()),
            self.sba(),
            &self.config,
        )
    }

    pub fn create_match(&self, setup: &MatchSetup, now: u64) -> Result<GameSession, RuleError> {
        if setup.players.len() != PLAYER_COUNT {
            return Err(RuleError::InvalidSetup {
                reason: format!("expected {PLAYER_COUNT} players, got {}", setup.players.len()),
            });
        }
        let ids: HashSet<&str> = setup.players.iter().map(|p| p.id.as_str()).collect();
        if ids.len() != PLAYER_COUNT || ids.contains("") {
            return Err(RuleError::InvalidSetup {
                reason: "player ids must be distinct and non-empty".into(),
            });
        }

        let mut players = Vec::with_capacity(PLAYER_COUNT);
        for player in &setup.players {
            let mut deck = Vec::with_capacity(player.deck.len());
            for (n, definition_id) in player.deck.iter().enumerate() {
                self.catalog.require(definition_id)?;
                deck.push(CardRef::new(format!("{}:{}", player.id, n + 1), definition_id.clone()));
            }
            players.push(
                PlayerState::new(player.id.clone(), self.config.starting_life_points).with_deck(deck),
            );
        }

        let mut session = GameSession::new(setup.session_id.clone(), setup.lobby_id.clone(), players);
        session.created_at = now;
        session.last_move_at = now;

        let ids: Vec<PlayerId> = session.players.iter().map(|p| p.id.clone()).collect();
        for _ in 0..self.config.opening_hand_size {
            for id in &ids {
                let has_cards = session
                    .get_player(id)
                    .map(|player| !player.deck.is_empty())
                    .unwrap_or(false);
                if has_cards {
                    session.draw_card(id);
                }
            }
        }
        session.record_event(GameEvent::TurnStarted {
            player_id: session.current_turn_player_id.clone(),
            turn_number: session.turn_number,
        });
        self.turns().draw_step(&mut session);
        self.sba().apply(&mut session);

        info!(
            session = %session.session_id,
            lobby = %session.lobby_id,
            first = %session.first_player_id,
            "match created"
        );
        Ok(session)
    }

    pub fn advance_phase(
        &self,
        session: &mut GameSession,
        action: &PhaseAction,
    ) -> Result<SessionSummary, RuleError> {
        ensure_open(session)?;
        let (_, events) = transact(session, |draft| {
            self.turns()
                .advance_phase(draft, &action.player_id, action.requested_phase)?;
            self.sba().apply(draft);
            Ok(())
        })?;
        Ok(SessionSummary {
            events,
            ..SessionSummary::of(session)
        })
    }

    pub fn normal_summon(
        &self,
        session: &mut GameSession,
        action: &SummonAction,
    ) -> Result<SessionSummary, RuleError> {
        ensure_open(session)?;
        let (_, events) = transact(session, |draft| {
            ensure_turn_owner(draft, &action.player_id)?;
            if !draft.current_phase.is_main() {
                return Err(RuleError::InvalidPhase {
                    allowed: vec![GamePhase::Main1, GamePhase::Main2],
                    actual: draft.current_phase,
                });
            }
            let capacity = self.config.max_board_size;
            let player = draft
                .get_player_mut(&action.player_id)
                .ok_or_else(|| RuleError::PlayerNotFound {
                    player_id: action.player_id.clone(),
                })?;
            if player.normal_summoned_this_turn {
                return Err(RuleError::AlreadyNormalSummoned {
                    player_id: player.id.clone(),
                });
            }
            let hand_index = player
                .find_card_in_hand_index(&action.card_id)
                .ok_or_else(|| RuleError::CardNotFound {
                    card_id: action.card_id.clone(),
                })?;
            let definition = self.catalog.require(&player.hand[hand_index].definition_id)?;
            if definition.card_type != CardType::Monster {
                return Err(RuleError::NotAMonster {
                    card_id: action.card_id.clone(),
                });
            }
            let zone_index = player
                .free_zone_index(capacity)
                .ok_or(RuleError::BoardFull { capacity })?;

            let card = player.hand.remove(hand_index);
            let entry = BoardEntry::new(card, zone_index, definition.attack, definition.defense);
            let entry = match action.position {
                BattlePosition::Attack => entry,
                BattlePosition::Defense => entry.set(),
            };
            let event = GameEvent::MonsterSummoned {
                player_id: player.id.clone(),
                card_id: action.card_id.clone(),
                zone_index,
                position: entry.position,
                face_down: entry.is_face_down,
            };
            player.board.push(entry);
            player.sort_board();
            player.normal_summoned_this_turn = true;
            draft.record_event(event);
            self.sba().apply(draft);
            Ok(())
        })?;
        Ok(SessionSummary {
            events,
            ..SessionSummary::of(session)
        })
    }

    pub fn declare_attack(
        &self,
        session: &mut GameSession,
        action: &AttackAction,
    ) -> Result<CombatResult, RuleError> {
        ensure_open(session)?;
        let resolver = CombatResolver::new(self.sba());
        let (result, events) = transact(session, |draft| resolver.declare_attack(draft, action))?;
        Ok(CombatResult { events, ..result })
    }

    pub fn end_turn(
        &self,
        session: &mut GameSession,
        player_id: &str,
    ) -> Result<EndTurnResult, RuleError> {
        ensure_open(session)?;
        let (result, events) = transact(session, |draft| self.turns().end_turn(draft, player_id))?;
        Ok(EndTurnResult { events, ..result })
    }

    /// The forfeiting player always loses. Allowed at any point of the turn,
    /// including while a chain is pending.
    pub fn forfeit(
        &self,
        session: &mut GameSession,
        player_id: &str,
    ) -> Result<SbaVerdict, RuleError> {
        if session.is_finished() {
            return Err(RuleError::GameFinished);
        }
        let (verdict, _) = transact(session, |draft| {
            let player = draft
                .get_player_mut(player_id)
                .ok_or_else(|| RuleError::PlayerNotFound {
                    player_id: player_id.to_owned(),
                })?;
            player.conceded = true;
            draft.record_event(GameEvent::PlayerForfeited {
                player_id: player_id.to_owned(),
            });
            Ok(self.sba().apply(draft))
        })?;
        Ok(verdict)
    }

    pub fn evaluate(&self, session: &GameSession) -> SbaVerdict {
        self.sba().evaluate(session)
    }
}
