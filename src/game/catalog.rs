use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::effects::{AbilityDescriptor, EffectKind, EffectTrigger, TargetOwner};
use super::state::{DefinitionId, IntegrityError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Monster,
    Spell,
    Trap,
}

impl Default for CardType {
    fn default() -> Self {
        CardType::Monster
    }
}

/// Static card data. Never mutated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardDefinition {
    pub id: DefinitionId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub attack: i32,
    #[serde(default)]
    pub defense: i32,
    #[serde(default)]
    pub card_type: CardType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ability_descriptor: Option<AbilityDescriptor>,
}

impl CardDefinition {
    pub fn monster(id: impl Into<DefinitionId>, attack: i32, defense: i32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            attack,
            defense,
            card_type: CardType::Monster,
            ability_descriptor: None,
        }
    }

    pub fn with_ability(mut self, ability: AbilityDescriptor) -> Self {
        self.ability_descriptor = Some(ability);
        self
    }
}

pub trait CardCatalog: Send + Sync {
    fn get_card_definition(&self, id: &str) -> Option<&CardDefinition>;

    /// Lookup that treats a missing card as an integrity failure.
    fn require(&self, id: &str) -> Result<&CardDefinition, IntegrityError> {
        self.get_card_definition(id)
            .ok_or_else(|| IntegrityError::MissingCardDefinition {
                definition_id: id.to_owned(),
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticCardCatalog {
    cards: HashMap<DefinitionId, CardDefinition>,
}

impl StaticCardCatalog {
    pub fn new(cards: impl IntoIterator<Item = CardDefinition>) -> Self {
        Self {
            cards: cards
                .into_iter()
                .map(|card| (card.id.clone(), card))
                .collect(),
        }
    }

    /// Parses a JSON array of card definitions.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let cards: Vec<CardDefinition> = serde_json::from_str(json)?;
        Ok(Self::new(cards))
    }

    pub fn insert(&mut self, card: CardDefinition) {
        self.cards.insert(card.id.clone(), card);
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

impl CardCatalog for StaticCardCatalog {
    fn get_card_definition(&self, id: &str) -> Option<&CardDefinition> {
        self.cards.get(id)
    }
}

static STARTER_CATALOG: Lazy<Arc<StaticCardCatalog>> = Lazy::new(|| {
    let burn = |value| EffectKind::Damage {
        value,
        target_owner: TargetOwner::Opponent,
    };
    let mut sealed_pot = CardDefinition::monster("sealed-pot", 0, 0);
    sealed_pot.name = "Sealed Pot".into();
    sealed_pot.card_type = CardType::Spell;

    let named = |id: &str, name: &str, attack, defense| {
        let mut card = CardDefinition::monster(id, attack, defense);
        card.name = name.into();
        card
    };

    Arc::new(StaticCardCatalog::new(vec![
        named("iron-knight", "Iron Knight", 1800, 1200),
        named("stone-golem", "Stone Golem", 1000, 2000),
        named("ember-imp", "Ember Imp", 1200, 800).with_ability(AbilityDescriptor::new(
            EffectTrigger::OnTurnEnd,
            burn(300),
        )),
        named("dawn-cleric", "Dawn Cleric", 800, 1600).with_ability(
            AbilityDescriptor::new(
                EffectTrigger::OnTurnStart,
                EffectKind::Heal {
                    value: 500,
                    target_owner: TargetOwner::Owner,
                },
            )
            .self_only(),
        ),
        named("chaos-jester", "Chaos Jester", 1400, 1000).with_ability(AbilityDescriptor::new(
            EffectTrigger::OnTurnStart,
            EffectKind::RandomChoice {
                choices: vec![
                    burn(500),
                    EffectKind::Damage {
                        value: 200,
                        target_owner: TargetOwner::Owner,
                    },
                    EffectKind::DrawCard {
                        count: 1,
                        target_owner: TargetOwner::Owner,
                    },
                ],
            },
        )),
        sealed_pot,
    ]))
});

/// A small built-in catalog for demos and local play.
pub fn starter_catalog() -> Arc<StaticCardCatalog> {
    Arc::clone(&STARTER_CATALOG)
}
