use serde::{Deserialize, Serialize};
use tracing::debug;

use super::rules::{ensure_turn_owner, AttackAction, RuleError};
use super::sba::{SbaVerdict, StateBasedActions};
use super::state::{
    BoardEntry, CardId, GameEvent, GamePhase, GameSession, IntegrityError, PlayerId,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Attacker,
    Defender,
}

/// The arithmetic result of one monster-vs-monster battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BattleOutcome {
    pub attacker_destroyed: bool,
    pub defender_destroyed: bool,
    pub damage: u32,
    pub damage_to: Option<Side>,
}

impl BattleOutcome {
    fn stalemate() -> Self {
        Self {
            attacker_destroyed: false,
            defender_destroyed: false,
            damage: 0,
            damage_to: None,
        }
    }
}

/// Attack position compares attack to attack; defense position compares
/// attack to defense and never destroys the attacker.
pub fn battle_outcome(attack: u32, defender_value: u32, defender_in_attack: bool) -> BattleOutcome {
    use std::cmp::Ordering::*;

    match (attack.cmp(&defender_value), defender_in_attack) {
        (Greater, _) => BattleOutcome {
            attacker_destroyed: false,
            defender_destroyed: true,
            damage: attack - defender_value,
            damage_to: Some(Side::Defender),
        },
        (Less, true) => BattleOutcome {
            attacker_destroyed: true,
            defender_destroyed: false,
            damage: defender_value - attack,
            damage_to: Some(Side::Attacker),
        },
        (Less, false) => BattleOutcome {
            damage: defender_value - attack,
            damage_to: Some(Side::Attacker),
            ..BattleOutcome::stalemate()
        },
        (Equal, true) => BattleOutcome {
            attacker_destroyed: true,
            defender_destroyed: true,
            ..BattleOutcome::stalemate()
        },
        (Equal, false) => BattleOutcome::stalemate(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CombatResult {
    pub damage: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damaged_player: Option<PlayerId>,
    pub destroyed: Vec<CardId>,
    pub attacker_life_points: u32,
    pub defender_life_points: u32,
    pub verdict: SbaVerdict,
    /// Filled in by `RuleEngine` from the committed event log.
    #[serde(default)]
    pub events: Vec<GameEvent>,
}

fn checked_stat(entry: &BoardEntry, value: i32) -> Result<u32, RuleError> {
    u32::try_from(value).map_err(|_| RuleError::IntegrityViolation {
        error: IntegrityError::CorruptStats {
            card_id: entry.card.id.clone(),
            attack: entry.attack,
            defense: entry.defense,
        },
    })
}

pub struct CombatResolver {
    sba: StateBasedActions,
}

impl CombatResolver {
    pub fn new(sba: StateBasedActions) -> Self {
        Self { sba }
    }

    pub fn declare_attack(
        &self,
        session: &mut GameSession,
        action: &AttackAction,
    ) -> Result<CombatResult, RuleError> {
        ensure_turn_owner(session, &action.player_id)?;
        if session.current_phase != GamePhase::Battle {
            return Err(RuleError::InvalidPhase {
                allowed: vec![GamePhase::Battle],
                actual: session.current_phase,
            });
        }
        let attacker_owner = action.player_id.as_str();
        let defender_owner = session
            .opponent_of(attacker_owner)
            .ok_or_else(|| RuleError::PlayerNotFound {
                player_id: attacker_owner.to_owned(),
            })?;

        let attacker = session
            .get_player(attacker_owner)
            .and_then(|player| player.find_on_board(&action.attacker_card_id))
            .ok_or_else(|| RuleError::CardNotFound {
                card_id: action.attacker_card_id.clone(),
            })?;
        if attacker.is_face_down {
            return Err(RuleError::FaceDownAttacker {
                card_id: attacker.card.id.clone(),
            });
        }
        if attacker.has_attacked {
            return Err(RuleError::AlreadyAttacked {
                card_id: attacker.card.id.clone(),
            });
        }
        let attack = checked_stat(attacker, attacker.attack)?;

        let defender_board = session
            .get_player(&defender_owner)
            .map(|player| player.board.as_slice())
            .unwrap_or_default();
        let battle = match &action.target_card_id {
            None => {
                if !defender_board.is_empty() {
                    return Err(RuleError::DirectAttackBlocked {
                        count: defender_board.len(),
                    });
                }
                None
            }
            Some(target_id) => {
                let target = defender_board
                    .iter()
                    .find(|entry| entry.card.id == *target_id)
                    .ok_or_else(|| RuleError::CardNotFound {
                        card_id: target_id.clone(),
                    })?;
                let in_attack = target.is_attack_position();
                let value = if in_attack {
                    checked_stat(target, target.attack)?
                } else {
                    checked_stat(target, target.defense)?
                };
                Some((
                    target.card.id.clone(),
                    target.is_face_down,
                    battle_outcome(attack, value, in_attack),
                ))
            }
        };

        session.record_event(GameEvent::AttackDeclared {
            attacker_owner: attacker_owner.to_owned(),
            attacker_id: action.attacker_card_id.clone(),
            defender_id: action.target_card_id.clone(),
        });
        if let Some(entry) = session
            .get_player_mut(attacker_owner)
            .and_then(|player| player.find_on_board_mut(&action.attacker_card_id))
        {
            entry.has_attacked = true;
        }

        let mut destroyed = Vec::new();
        let (damage, damaged_player) = match battle {
            None => (attack, Some(defender_owner.clone())),
            Some((target_id, was_face_down, outcome)) => {
                debug!(
                    attacker = %action.attacker_card_id,
                    defender = %target_id,
                    ?outcome,
                    "battle resolved"
                );
                if was_face_down && !outcome.defender_destroyed {
                    if let Some(entry) = session
                        .get_player_mut(&defender_owner)
                        .and_then(|player| player.find_on_board_mut(&target_id))
                    {
                        entry.is_face_down = false;
                    }
                    session.record_event(GameEvent::CardFlipped {
                        player_id: defender_owner.clone(),
                        card_id: target_id.clone(),
                    });
                }
                if outcome.attacker_destroyed
                    && session
                        .destroy_card(attacker_owner, &action.attacker_card_id)
                        .is_some()
                {
                    destroyed.push(action.attacker_card_id.clone());
                }
                if outcome.defender_destroyed
                    && session.destroy_card(&defender_owner, &target_id).is_some()
                {
                    destroyed.push(target_id);
                }
                let damaged = match outcome.damage_to {
                    Some(Side::Attacker) => Some(attacker_owner.to_owned()),
                    Some(Side::Defender) => Some(defender_owner.clone()),
                    None => None,
                };
                (outcome.damage, damaged)
            }
        };

        if let Some(target) = &damaged_player {
            session.damage_player(Some(action.attacker_card_id.as_str()), target, damage);
        }

        let verdict = self.sba.apply(session);
        let life = |id: &str| {
            session
                .get_player(id)
                .map(|player| player.life_points)
                .unwrap_or_default()
        };

        Ok(CombatResult {
            damage,
            damaged_player: damaged_player.filter(|_| damage > 0),
            destroyed,
            attacker_life_points: life(attacker_owner),
            defender_life_points: life(&defender_owner),
            verdict,
            events: Vec::new(),
        })
    }
}
