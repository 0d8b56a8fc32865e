use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use thiserror::Error;

use super::effects::EffectTrigger;

/// Match/session identifier.
pub type SessionId = String;
/// Participant identifier.
pub type PlayerId = String;
/// Session-unique card instance identifier.
pub type CardId = String;
/// Catalog key of a card definition.
pub type DefinitionId = String;

pub const PLAYER_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Draw,
    Standby,
    Main1,
    Battle,
    Main2,
    End,
}

impl Default for GamePhase {
    fn default() -> Self {
        Self::Draw
    }
}

impl GamePhase {
    /// The phase that follows this one inside a single turn. `End` has no
    /// successor; leaving it is the end-turn transition.
    pub fn next(self) -> Option<GamePhase> {
        match self {
            GamePhase::Draw => Some(GamePhase::Standby),
            GamePhase::Standby => Some(GamePhase::Main1),
            GamePhase::Main1 => Some(GamePhase::Battle),
            GamePhase::Battle => Some(GamePhase::Main2),
            GamePhase::Main2 => Some(GamePhase::End),
            GamePhase::End => None,
        }
    }

    pub fn is_main(self) -> bool {
        matches!(self, GamePhase::Main1 | GamePhase::Main2)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BattlePosition {
    Attack,
    Defense,
}

/// A card in a non-board zone: the instance plus the catalog entry it was printed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardRef {
    pub id: CardId,
    pub definition_id: DefinitionId,
}

impl CardRef {
    pub fn new(id: impl Into<CardId>, definition_id: impl Into<DefinitionId>) -> Self {
        Self {
            id: id.into(),
            definition_id: definition_id.into(),
        }
    }
}

/// A creature in play. Attack/defense are the current values and may drift
/// from the catalog base through effects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardEntry {
    pub card: CardRef,
    pub zone_index: u8,
    pub attack: i32,
    pub defense: i32,
    pub position: BattlePosition,
    #[serde(default)]
    pub has_attacked: bool,
    #[serde(default)]
    pub is_face_down: bool,
}

impl BoardEntry {
    pub fn new(card: CardRef, zone_index: u8, attack: i32, defense: i32) -> Self {
        Self {
            card,
            zone_index,
            attack,
            defense,
            position: BattlePosition::Attack,
            has_attacked: false,
            is_face_down: false,
        }
    }

    /// Face-down defense position, the way a monster is set.
    pub fn set(mut self) -> Self {
        self.position = BattlePosition::Defense;
        self.is_face_down = true;
        self
    }

    pub fn in_defense(mut self) -> Self {
        self.position = BattlePosition::Defense;
        self
    }

    pub fn id(&self) -> &str {
        &self.card.id
    }

    pub fn is_attack_position(&self) -> bool {
        self.position == BattlePosition::Attack && !self.is_face_down
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerState {
    pub id: PlayerId,
    pub life_points: u32,
    #[serde(default)]
    pub mana: u32,
    #[serde(default)]
    pub normal_summoned_this_turn: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deck: Vec<CardRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hand: Vec<CardRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub board: Vec<BoardEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spell_trap_zone: Vec<CardRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub graveyard: Vec<CardRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub banished: Vec<CardRef>,
    /// Set when a required draw found an empty deck.
    #[serde(default)]
    pub decked_out: bool,
    #[serde(default)]
    pub conceded: bool,
}

impl PlayerState {
    pub fn new(id: impl Into<PlayerId>, life_points: u32) -> Self {
        Self {
            id: id.into(),
            life_points,
            mana: 0,
            normal_summoned_this_turn: false,
            deck: Vec::new(),
            hand: Vec::new(),
            board: Vec::new(),
            spell_trap_zone: Vec::new(),
            graveyard: Vec::new(),
            banished: Vec::new(),
            decked_out: false,
            conceded: false,
        }
    }

    pub fn with_deck(mut self, deck: Vec<CardRef>) -> Self {
        self.deck = deck;
        self
    }

    pub fn with_hand(mut self, hand: Vec<CardRef>) -> Self {
        self.hand = hand;
        self
    }

    pub fn with_board(mut self, board: Vec<BoardEntry>) -> Self {
        self.board = board;
        self.sort_board();
        self
    }

    pub fn find_card_in_hand_index(&self, card_id: &str) -> Option<usize> {
        self.hand.iter().position(|card| card.id == card_id)
    }

    pub fn board_index(&self, card_id: &str) -> Option<usize> {
        self.board.iter().position(|entry| entry.card.id == card_id)
    }

    pub fn find_on_board(&self, card_id: &str) -> Option<&BoardEntry> {
        self.board.iter().find(|entry| entry.card.id == card_id)
    }

    pub fn find_on_board_mut(&mut self, card_id: &str) -> Option<&mut BoardEntry> {
        self.board.iter_mut().find(|entry| entry.card.id == card_id)
    }

    /// Lowest zone position not occupied by a board entry, if any is below `capacity`.
    pub fn free_zone_index(&self, capacity: u8) -> Option<u8> {
        (0..capacity).find(|index| !self.board.iter().any(|entry| entry.zone_index == *index))
    }

    /// Keeps the board in left-to-right zone order.
    pub fn sort_board(&mut self) {
        self.board.sort_by_key(|entry| entry.zone_index);
    }

    pub fn ready_board(&mut self) {
        for entry in &mut self.board {
            entry.has_attacked = false;
        }
        self.normal_summoned_this_turn = false;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum EndReason {
    Forfeit { loser: PlayerId },
    LifePointsDepleted { loser: PlayerId },
    DeckOut { loser: PlayerId },
}

impl EndReason {
    pub fn loser(&self) -> &str {
        match self {
            EndReason::Forfeit { loser }
            | EndReason::LifePointsDepleted { loser }
            | EndReason::DeckOut { loser } => loser,
        }
    }
}

/// Recorded once the game has ended. `winner_id == None` is a draw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<PlayerId>,
    pub reasons: Vec<EndReason>,
}

/// Event stream, appended by every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    PhaseChanged {
        player_id: PlayerId,
        from: GamePhase,
        to: GamePhase,
    },
    CardDrawn {
        player_id: PlayerId,
        card_id: CardId,
    },
    DeckedOut {
        player_id: PlayerId,
    },
    MonsterSummoned {
        player_id: PlayerId,
        card_id: CardId,
        zone_index: u8,
        position: BattlePosition,
        face_down: bool,
    },
    AttackDeclared {
        attacker_owner: PlayerId,
        attacker_id: CardId,
        #[serde(skip_serializing_if = "Option::is_none")]
        defender_id: Option<CardId>,
    },
    DamageDealt {
        #[serde(skip_serializing_if = "Option::is_none")]
        source_card: Option<CardId>,
        target_player: PlayerId,
        amount: u32,
        life_points: u32,
    },
    LifePointsGained {
        #[serde(skip_serializing_if = "Option::is_none")]
        source_card: Option<CardId>,
        player_id: PlayerId,
        amount: u32,
        life_points: u32,
    },
    CardDestroyed {
        player_id: PlayerId,
        card_id: CardId,
    },
    CardFlipped {
        player_id: PlayerId,
        card_id: CardId,
    },
    RandomChoiceMade {
        card_id: CardId,
        seed: String,
        index: usize,
        choices: usize,
    },
    EffectSkipped {
        card_id: CardId,
        reason: String,
    },
    EffectResolved {
        player_id: PlayerId,
        card_id: CardId,
        trigger: EffectTrigger,
    },
    TurnEnded {
        player_id: PlayerId,
        turn_number: u32,
    },
    TurnStarted {
        player_id: PlayerId,
        turn_number: u32,
    },
    PlayerForfeited {
        player_id: PlayerId,
    },
    GameEnded {
        #[serde(skip_serializing_if = "Option::is_none")]
        winner_id: Option<PlayerId>,
        reasons: Vec<EndReason>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum IntegrityError {
    #[error("session has {count} players, expected {}", PLAYER_COUNT)]
    InvalidPlayerCount { count: usize },
    #[error("player {player_id} is not a participant")]
    InvalidPlayerIndex { player_id: PlayerId },
    #[error("card {card_id} appears in more than one zone slot")]
    DuplicateCardId { card_id: CardId },
    #[error("zone {zone_index} of {player_id} is occupied twice")]
    DuplicateZonePosition { player_id: PlayerId, zone_index: u8 },
    #[error("no catalog definition for {definition_id}")]
    MissingCardDefinition { definition_id: DefinitionId },
    #[error("card {card_id} has corrupt stats {attack}/{defense}")]
    CorruptStats { card_id: CardId, attack: i32, defense: i32 },
}

/// The authoritative record of one match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSession {
    pub session_id: SessionId,
    pub lobby_id: String,
    pub players: Vec<PlayerState>,
    pub first_player_id: PlayerId,
    pub turn_number: u32,
    pub current_phase: GamePhase,
    pub current_turn_player_id: PlayerId,
    /// Pending activations, owned by the chain protocol. Only its emptiness is read here.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub current_chain: Vec<serde_json::Value>,
    /// Trigger firings so far in the current turn; feeds the deterministic choice seed.
    #[serde(default)]
    pub trigger_firings: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GameOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
    #[serde(default)]
    pub last_move_at: u64,
    #[serde(default)]
    pub created_at: u64,
}

impl GameSession {
    pub fn new(
        session_id: impl Into<SessionId>,
        lobby_id: impl Into<String>,
        players: Vec<PlayerState>,
    ) -> Self {
        let first_player_id = players
            .first()
            .map(|player| player.id.clone())
            .unwrap_or_default();
        Self {
            session_id: session_id.into(),
            lobby_id: lobby_id.into(),
            players,
            current_turn_player_id: first_player_id.clone(),
            first_player_id,
            turn_number: 1,
            current_phase: GamePhase::default(),
            current_chain: Vec::new(),
            trigger_firings: 0,
            outcome: None,
            event_log: Vec::new(),
            last_move_at: 0,
            created_at: 0,
        }
    }

    pub fn with_phase(mut self, phase: GamePhase) -> Self {
        self.current_phase = phase;
        self
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn get_player(&self, id: &str) -> Option<&PlayerState> {
        self.players.iter().find(|player| player.id == id)
    }

    pub fn get_player_mut(&mut self, id: &str) -> Option<&mut PlayerState> {
        self.players.iter_mut().find(|player| player.id == id)
    }

    pub fn player_index(&self, id: &str) -> Option<usize> {
        self.players.iter().position(|player| player.id == id)
    }

    pub fn opponent_of(&self, player_id: &str) -> Option<PlayerId> {
        self.players
            .iter()
            .find(|player| player.id != player_id)
            .map(|player| player.id.clone())
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn chain_resolving(&self) -> bool {
        !self.current_chain.is_empty()
    }

    /// Subtracts life points, never going below zero.
    pub fn damage_player(
        &mut self,
        source_card: Option<&str>,
        target_player: &str,
        amount: u32,
    ) -> Option<GameEvent> {
        if amount == 0 {
            return None;
        }
        let player = self.get_player_mut(target_player)?;
        player.life_points = player.life_points.saturating_sub(amount);
        let event = GameEvent::DamageDealt {
            source_card: source_card.map(str::to_owned),
            target_player: player.id.clone(),
            amount,
            life_points: player.life_points,
        };
        self.record_event(event.clone());
        Some(event)
    }

    pub fn heal_player(
        &mut self,
        source_card: Option<&str>,
        player_id: &str,
        amount: u32,
    ) -> Option<GameEvent> {
        if amount == 0 {
            return None;
        }
        let player = self.get_player_mut(player_id)?;
        player.life_points = player.life_points.saturating_add(amount);
        let event = GameEvent::LifePointsGained {
            source_card: source_card.map(str::to_owned),
            player_id: player.id.clone(),
            amount,
            life_points: player.life_points,
        };
        self.record_event(event.clone());
        Some(event)
    }

    /// Moves the top of the deck to the front of the hand. An empty deck
    /// marks the player decked out instead.
    pub fn draw_card(&mut self, player_id: &str) -> Option<GameEvent> {
        let player = self.get_player_mut(player_id)?;
        let event = if player.deck.is_empty() {
            player.decked_out = true;
            GameEvent::DeckedOut {
                player_id: player.id.clone(),
            }
        } else {
            let card = player.deck.remove(0);
            let card_id = card.id.clone();
            player.hand.insert(0, card);
            GameEvent::CardDrawn {
                player_id: player.id.clone(),
                card_id,
            }
        };
        self.record_event(event.clone());
        Some(event)
    }

    /// Moves a board entry to its owner's graveyard.
    pub fn destroy_card(&mut self, owner: &str, card_id: &str) -> Option<GameEvent> {
        let player = self.get_player_mut(owner)?;
        let index = player.board_index(card_id)?;
        let entry = player.board.remove(index);
        player.graveyard.push(entry.card);
        let event = GameEvent::CardDestroyed {
            player_id: player.id.clone(),
            card_id: card_id.to_owned(),
        };
        self.record_event(event.clone());
        Some(event)
    }

    /// Clears `has_attacked` and `normal_summoned_this_turn` for both players.
    pub fn reset_turn_flags(&mut self) {
        for player in &mut self.players {
            player.ready_board();
        }
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        if self.players.len() != PLAYER_COUNT {
            return Err(IntegrityError::InvalidPlayerCount {
                count: self.players.len(),
            });
        }
        for id in [&self.current_turn_player_id, &self.first_player_id] {
            if self.player_index(id).is_none() {
                return Err(IntegrityError::InvalidPlayerIndex {
                    player_id: id.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for player in &self.players {
            let mut zones = HashSet::new();
            for entry in &player.board {
                if !zones.insert(entry.zone_index) {
                    return Err(IntegrityError::DuplicateZonePosition {
                        player_id: player.id.clone(),
                        zone_index: entry.zone_index,
                    });
                }
            }
            for card_id in player
                .deck
                .iter()
                .chain(player.hand.iter())
                .chain(player.spell_trap_zone.iter())
                .chain(player.graveyard.iter())
                .chain(player.banished.iter())
                .map(|card| &card.id)
                .chain(player.board.iter().map(|entry| &entry.card.id))
            {
                if !seen.insert(card_id.as_str()) {
                    return Err(IntegrityError::DuplicateCardId {
                        card_id: card_id.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> GameSession {
        let alice = PlayerState::new("alice", 500)
            .with_deck(vec![CardRef::new("a1", "slime"), CardRef::new("a2", "slime")]);
        let bob = PlayerState::new("bob", 8000);
        GameSession::new("s-1", "lobby-1", vec![alice, bob])
    }

    #[test]
    fn damage_clamps_at_zero() {
        let mut session = session();
        let event = session.damage_player(None, "alice", 3000);
        assert_eq!(session.get_player("alice").map(|p| p.life_points), Some(0));
        assert!(matches!(
            event,
            Some(GameEvent::DamageDealt {
                amount: 3000,
                life_points: 0,
                ..
            })
        ));
    }

    #[test]
    fn draw_takes_top_of_deck_into_front_of_hand() {
        let mut session = session();
        session.draw_card("alice");
        session.draw_card("alice");
        let alice = session.get_player("alice").expect("alice exists");
        let hand: Vec<&str> = alice.hand.iter().map(|card| card.id.as_str()).collect();
        assert_eq!(hand, vec!["a2", "a1"]);
        assert!(!alice.decked_out);
    }

    #[test]
    fn drawing_from_empty_deck_marks_deck_out() {
        let mut session = session();
        let event = session.draw_card("bob");
        assert!(matches!(event, Some(GameEvent::DeckedOut { .. })));
        assert!(session.get_player("bob").map(|p| p.decked_out).unwrap_or(false));
    }

    #[test]
    fn integrity_rejects_shared_zone_position() {
        let mut session = session();
        if let Some(bob) = session.get_player_mut("bob") {
            bob.board = vec![
                BoardEntry::new(CardRef::new("b1", "slime"), 0, 100, 100),
                BoardEntry::new(CardRef::new("b2", "slime"), 0, 100, 100),
            ];
        }
        assert_eq!(
            session.integrity_check(),
            Err(IntegrityError::DuplicateZonePosition {
                player_id: "bob".into(),
                zone_index: 0
            })
        );
    }

    #[test]
    fn integrity_errors_describe_themselves() {
        let mut session = session();
        session.players.pop();
        let err = session.integrity_check().expect_err("one player is not a match");
        assert_eq!(err.to_string(), "session has 1 players, expected 2");
        assert_eq!(
            IntegrityError::CorruptStats {
                card_id: "c9".into(),
                attack: -5,
                defense: 10
            }
            .to_string(),
            "card c9 has corrupt stats -5/10"
        );
    }

    #[test]
    fn phases_advance_in_fixed_order() {
        let mut phase = GamePhase::Draw;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            seen.push(next);
            phase = next;
        }
        assert_eq!(
            seen,
            vec![
                GamePhase::Draw,
                GamePhase::Standby,
                GamePhase::Main1,
                GamePhase::Battle,
                GamePhase::Main2,
                GamePhase::End
            ]
        );
    }
}
