use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::catalog::CardCatalog;
use super::state::{CardId, GameEvent, GameSession, IntegrityError, PlayerId};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EffectTrigger {
    OnTurnStart,
    OnTurnEnd,
    /// Triggers owned by the activation protocol; never fired at a turn boundary.
    #[serde(other)]
    Other,
}

/// Whose life points an effect touches, relative to the card's owner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TargetOwner {
    #[serde(rename = "self")]
    Owner,
    #[serde(rename = "opponent")]
    Opponent,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EffectKind {
    Damage {
        value: u32,
        #[serde(rename = "targetOwner")]
        target_owner: TargetOwner,
    },
    Heal {
        value: u32,
        #[serde(rename = "targetOwner")]
        target_owner: TargetOwner,
    },
    DrawCard {
        #[serde(default = "one")]
        count: u32,
        #[serde(rename = "targetOwner")]
        target_owner: TargetOwner,
    },
    Sequence {
        effects: Vec<EffectKind>,
    },
    RandomChoice {
        choices: Vec<EffectKind>,
    },
    /// Any effect type this engine does not know yet.
    #[serde(other)]
    Unknown,
}

/// A card's ability as authored in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AbilityDescriptor {
    pub trigger: EffectTrigger,
    /// Only fires when the owner is the controlling player of the firing.
    #[serde(default)]
    pub self_only: bool,
    #[serde(flatten)]
    pub effect: EffectKind,
}

impl AbilityDescriptor {
    pub fn new(trigger: EffectTrigger, effect: EffectKind) -> Self {
        Self {
            trigger,
            self_only: false,
            effect,
        }
    }

    pub fn self_only(mut self) -> Self {
        self.self_only = true;
        self
    }
}

/// 32-bit FNV-1a.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

pub fn choice_seed(
    session_id: &str,
    turn_number: u32,
    card_id: &str,
    occurrence: u32,
    sequence: u32,
) -> String {
    format!("{session_id}:{turn_number}:{card_id}:{occurrence}:{sequence}")
}

/// Index into a list of `len` choices picked by hashing `seed`. `len` must be non-zero.
pub fn deterministic_index(seed: &str, len: usize) -> usize {
    (fnv1a_32(seed.as_bytes()) as usize) % len
}

/// Everything an effect needs to know about where it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectContext {
    pub trigger: EffectTrigger,
    pub session_id: String,
    pub turn_number: u32,
    pub source_player: PlayerId,
    pub source_card: CardId,
    pub occurrence: u32,
    /// `randomChoice` evaluations so far within this ability's resolution.
    pub sequence: u32,
}

impl EffectContext {
    pub fn new(
        trigger: EffectTrigger,
        session: &GameSession,
        source_player: impl Into<PlayerId>,
        source_card: impl Into<CardId>,
    ) -> Self {
        Self {
            trigger,
            session_id: session.session_id.clone(),
            turn_number: session.turn_number,
            source_player: source_player.into(),
            source_card: source_card.into(),
            occurrence: session.trigger_firings,
            sequence: 0,
        }
    }

    pub fn with_occurrence(mut self, occurrence: u32) -> Self {
        self.occurrence = occurrence;
        self
    }

    fn next_seed(&mut self) -> String {
        let seed = choice_seed(
            &self.session_id,
            self.turn_number,
            &self.source_card,
            self.occurrence,
            self.sequence,
        );
        self.sequence += 1;
        seed
    }

    fn resolve_player(&self, owner: TargetOwner, session: &GameSession) -> Option<PlayerId> {
        match owner {
            TargetOwner::Owner => Some(self.source_player.clone()),
            TargetOwner::Opponent => session.opponent_of(&self.source_player),
        }
    }
}

#[derive(Default, Debug, Clone)]
pub struct EffectResolution {
    pub events: Vec<GameEvent>,
}

impl EffectResolution {
    pub fn extend(&mut self, mut other: EffectResolution) {
        self.events.append(&mut other.events);
    }

    fn push(&mut self, event: Option<GameEvent>) {
        self.events.extend(event);
    }
}

impl EffectKind {
    pub fn apply(&self, ctx: &mut EffectContext, session: &mut GameSession) -> EffectResolution {
        let mut resolution = EffectResolution::default();
        match self {
            EffectKind::Damage {
                value,
                target_owner,
            } => {
                if let Some(target) = ctx.resolve_player(*target_owner, session) {
                    let source = Some(ctx.source_card.as_str());
                    resolution.push(session.damage_player(source, &target, *value));
                }
            }
            EffectKind::Heal {
                value,
                target_owner,
            } => {
                if let Some(target) = ctx.resolve_player(*target_owner, session) {
                    let source = Some(ctx.source_card.as_str());
                    resolution.push(session.heal_player(source, &target, *value));
                }
            }
            EffectKind::DrawCard {
                count,
                target_owner,
            } => {
                if let Some(target) = ctx.resolve_player(*target_owner, session) {
                    for _ in 0..*count {
                        let event = session.draw_card(&target);
                        let decked = matches!(event, Some(GameEvent::DeckedOut { .. }));
                        resolution.push(event);
                        if decked {
                            break;
                        }
                    }
                }
            }
            EffectKind::Sequence { effects } => {
                for effect in effects {
                    resolution.extend(effect.apply(ctx, session));
                }
            }
            EffectKind::RandomChoice { choices } => {
                if choices.is_empty() {
                    resolution.push(Some(skip(session, ctx, "randomChoice has no choices")));
                    return resolution;
                }
                let seed = ctx.next_seed();
                let index = deterministic_index(&seed, choices.len());
                debug!(card = %ctx.source_card, %seed, index, "random choice resolved");
                let event = GameEvent::RandomChoiceMade {
                    card_id: ctx.source_card.clone(),
                    seed,
                    index,
                    choices: choices.len(),
                };
                session.record_event(event.clone());
                resolution.push(Some(event));
                resolution.extend(choices[index].apply(ctx, session));
            }
            EffectKind::Unknown => {
                resolution.push(Some(skip(session, ctx, "unknown effect type")));
            }
        }
        resolution
    }
}

fn skip(session: &mut GameSession, ctx: &EffectContext, reason: &str) -> GameEvent {
    warn!(card = %ctx.source_card, session = %ctx.session_id, reason, "effect skipped");
    let event = GameEvent::EffectSkipped {
        card_id: ctx.source_card.clone(),
        reason: reason.to_owned(),
    };
    session.record_event(event.clone());
    event
}

/// Collects and resolves the board abilities that answer a trigger.
pub struct EffectEngine<'a> {
    catalog: &'a dyn CardCatalog,
}

impl<'a> EffectEngine<'a> {
    pub fn new(catalog: &'a dyn CardCatalog) -> Self {
        Self { catalog }
    }

    /// Fires `trigger` for both boards: the controlling player's board left
    /// to right, then the opponent's. Face-down monsters stay dormant. Every
    /// definition is looked up before any effect applies, so a missing
    /// catalog entry leaves the session untouched.
    pub fn fire_triggers(
        &self,
        session: &mut GameSession,
        trigger: EffectTrigger,
        controlling_player: &str,
    ) -> Result<EffectResolution, IntegrityError> {
        let mut owners = vec![controlling_player.to_owned()];
        owners.extend(session.opponent_of(controlling_player));

        let mut queued = Vec::new();
        for owner in &owners {
            let Some(player) = session.get_player(owner) else {
                continue;
            };
            let mut board: Vec<_> = player.board.iter().collect();
            board.sort_by_key(|entry| entry.zone_index);
            for entry in board {
                if entry.is_face_down {
                    continue;
                }
                let definition = self.catalog.require(&entry.card.definition_id)?;
                let Some(ability) = &definition.ability_descriptor else {
                    continue;
                };
                if ability.trigger != trigger {
                    continue;
                }
                if ability.self_only && owner != controlling_player {
                    continue;
                }
                queued.push((owner.clone(), entry.card.id.clone(), ability.effect.clone()));
            }
        }

        let occurrence = session.trigger_firings;
        session.trigger_firings += 1;
        debug!(
            session = %session.session_id,
            ?trigger,
            occurrence,
            abilities = queued.len(),
            "firing triggers"
        );

        let mut resolution = EffectResolution::default();
        for (owner, card_id, effect) in queued {
            let mut ctx = EffectContext::new(trigger, session, owner.clone(), card_id.clone())
                .with_occurrence(occurrence);
            resolution.extend(effect.apply(&mut ctx, session));
            let resolved = GameEvent::EffectResolved {
                player_id: owner,
                card_id,
                trigger,
            };
            session.record_event(resolved.clone());
            resolution.push(Some(resolved));
        }
        Ok(resolution)
    }
}
