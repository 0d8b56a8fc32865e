//! Phase sequence and the end-turn transition.
//!
//! A turn runs `draw -> standby -> main1 -> battle -> main2 -> end`. Phases
//! advance one step at a time; only `main2` and `end` may hand the turn over.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::EngineConfig;
use super::effects::{EffectEngine, EffectTrigger};
use super::rules::{ensure_turn_owner, RuleError};
use super::sba::{SbaVerdict, StateBasedActions};
use super::state::{GameEvent, GamePhase, GameSession, PlayerId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndTurnResult {
    pub success: bool,
    pub new_turn_number: u32,
    pub new_turn_player_id: PlayerId,
    pub verdict: SbaVerdict,
    /// Filled in by `RuleEngine` from the committed event log.
    #[serde(default)]
    pub events: Vec<GameEvent>,
}

pub struct TurnController<'a> {
    effects: EffectEngine<'a>,
    sba: StateBasedActions,
    config: &'a EngineConfig,
}

impl<'a> TurnController<'a> {
    pub fn new(effects: EffectEngine<'a>, sba: StateBasedActions, config: &'a EngineConfig) -> Self {
        Self {
            effects,
            sba,
            config,
        }
    }

    pub fn advance_phase(
        &self,
        session: &mut GameSession,
        caller: &str,
        requested: GamePhase,
    ) -> Result<GamePhase, RuleError> {
        ensure_turn_owner(session, caller)?;
        let from = session.current_phase;
        if from.next() != Some(requested) {
            return Err(RuleError::PhaseSkip { from, requested });
        }
        session.current_phase = requested;
        session.record_event(GameEvent::PhaseChanged {
            player_id: caller.to_owned(),
            from,
            to: requested,
        });
        debug!(session = %session.session_id, ?from, to = ?requested, "phase advanced");
        Ok(requested)
    }

    /// Whether the current turn player must draw at the start of this turn.
    pub fn draw_required(&self, session: &GameSession) -> bool {
        !(self.config.first_player_skips_draw
            && session.turn_number == 1
            && session.current_turn_player_id == session.first_player_id)
    }

    /// Runs the draw step for the current turn player.
    pub fn draw_step(&self, session: &mut GameSession) -> Option<GameEvent> {
        if !self.draw_required(session) {
            return None;
        }
        let player = session.current_turn_player_id.clone();
        session.draw_card(&player)
    }

    pub fn end_turn(
        &self,
        session: &mut GameSession,
        caller: &str,
    ) -> Result<EndTurnResult, RuleError> {
        ensure_turn_owner(session, caller)?;
        if !matches!(session.current_phase, GamePhase::Main2 | GamePhase::End) {
            return Err(RuleError::CannotEndTurnYet {
                phase: session.current_phase,
            });
        }

        self.effects
            .fire_triggers(session, EffectTrigger::OnTurnEnd, caller)
            .map_err(|error| RuleError::IntegrityViolation { error })?;
        session.record_event(GameEvent::TurnEnded {
            player_id: caller.to_owned(),
            turn_number: session.turn_number,
        });

        let verdict = self.sba.apply(session);
        if verdict.game_ended {
            return Ok(EndTurnResult {
                success: true,
                new_turn_number: session.turn_number,
                new_turn_player_id: session.current_turn_player_id.clone(),
                verdict,
                events: Vec::new(),
            });
        }

        session.reset_turn_flags();

        let next = session
            .opponent_of(caller)
            .ok_or_else(|| RuleError::PlayerNotFound {
                player_id: caller.to_owned(),
            })?;
        session.current_turn_player_id = next.clone();
        session.turn_number += 1;
        session.trigger_firings = 0;
        session.current_phase = GamePhase::Draw;
        session.record_event(GameEvent::TurnStarted {
            player_id: next.clone(),
            turn_number: session.turn_number,
        });
        debug!(
            session = %session.session_id,
            turn = session.turn_number,
            player = %next,
            "turn started"
        );

        self.draw_step(session);

        self.effects
            .fire_triggers(session, EffectTrigger::OnTurnStart, &next)
            .map_err(|error| RuleError::IntegrityViolation { error })?;

        let verdict = self.sba.apply(session);
        Ok(EndTurnResult {
            success: true,
            new_turn_number: session.turn_number,
            new_turn_player_id: next,
            verdict,
            events: Vec::new(),
        })
    }
}
