//! Rules core: session model, combat, state-based actions, triggers and turns.

pub mod catalog;
pub mod combat;
pub mod config;
pub mod effects;
pub mod rules;
pub mod sba;
pub mod state;
pub mod turn;

pub use catalog::{starter_catalog, CardCatalog, CardDefinition, CardType, StaticCardCatalog};
pub use combat::{battle_outcome, BattleOutcome, CombatResolver, CombatResult, Side};
pub use config::EngineConfig;
pub use effects::{
    choice_seed,
    deterministic_index,
    fnv1a_32,
    AbilityDescriptor,
    EffectContext,
    EffectEngine,
    EffectKind,
    EffectResolution,
    EffectTrigger,
    TargetOwner,
};
pub use rules::{
    AttackAction,
    ErrorCategory,
    MatchSetup,
    PhaseAction,
    PlayerSetup,
    Rejection,
    RuleEngine,
    RuleError,
    SessionSummary,
    SummonAction,
};
pub use sba::{BoardWarning, SbaVerdict, StateBasedActions};
pub use state::{
    BattlePosition,
    BoardEntry,
    CardId,
    CardRef,
    DefinitionId,
    EndReason,
    GameEvent,
    GameOutcome,
    GamePhase,
    GameSession,
    IntegrityError,
    PlayerId,
    PlayerState,
    SessionId,
};
pub use turn::{EndTurnResult, TurnController};
