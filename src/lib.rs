pub mod game;
pub mod service;

use std::sync::Arc;

use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

pub use game::{
    AttackAction, CardCatalog, CardDefinition, CombatResult, EffectKind, EffectTrigger,
    EndTurnResult, EngineConfig, GameEvent, GamePhase, GameSession, IntegrityError, MatchSetup,
    PhaseAction, Rejection, RuleEngine, RuleError, SbaVerdict, SessionSummary, StaticCardCatalog,
    SummonAction,
};
pub use service::{InMemorySessionStore, MatchRecorder, MatchService, SessionStore};

use game::{deterministic_index, starter_catalog, StateBasedActions};
use service::Clock;

#[cfg(all(feature = "wee_alloc", target_arch = "wasm32"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error.rejection())
        .unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(serde_to_js_error)
}

/// Reads wall-clock time from the JS host.
#[derive(Debug, Default, Clone, Copy)]
struct JsClock;

impl Clock for JsClock {
    fn now_millis(&self) -> u64 {
        web_sys::js_sys::Date::now() as u64
    }
}

/// Reports finished matches on the browser console.
#[derive(Debug, Default, Clone, Copy)]
struct ConsoleMatchRecorder;

impl MatchRecorder for ConsoleMatchRecorder {
    fn match_completed(&self, lobby_id: &str, session_id: &str, winner_id: Option<&str>) {
        let message = match winner_id {
            Some(winner) => format!("match {session_id} in lobby {lobby_id} won by {winner}"),
            None => format!("match {session_id} in lobby {lobby_id} ended in a draw"),
        };
        web_sys::console::log_1(&message.into());
    }
}

/// In-browser match host. Sessions live in memory; every call takes and
/// returns JSON, and rejections are thrown as `{category, message, error}`.
#[wasm_bindgen]
pub struct DuelEngine {
    service: MatchService<InMemorySessionStore, ConsoleMatchRecorder, JsClock>,
}

#[wasm_bindgen]
impl DuelEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(
        catalog_json: Option<String>,
        config_json: Option<String>,
    ) -> Result<DuelEngine, JsValue> {
        let catalog: Arc<dyn CardCatalog> = match catalog_json {
            Some(json) => Arc::new(StaticCardCatalog::from_json(&json).map_err(serde_to_js_error)?),
            None => starter_catalog(),
        };
        let config = match config_json {
            Some(json) => EngineConfig::from_json(&json).map_err(serde_to_js_error)?,
            None => EngineConfig::default(),
        };
        Ok(DuelEngine {
            service: MatchService::new(
                RuleEngine::new(catalog, config),
                InMemorySessionStore::new(),
                ConsoleMatchRecorder,
                JsClock,
            ),
        })
    }

    pub fn create_match_json(&self, setup_json: &str) -> Result<String, JsValue> {
        let setup: MatchSetup = serde_json::from_str(setup_json).map_err(serde_to_js_error)?;
        let session = self.service.create_match(&setup).map_err(to_js_error)?;
        to_json(&session)
    }

    pub fn session_json(&self, session_id: &str) -> Result<String, JsValue> {
        let session = self.service.get_session(session_id).map_err(to_js_error)?;
        to_json(&session)
    }

    pub fn advance_phase_json(&self, session_id: &str, action_json: &str) -> Result<String, JsValue> {
        let action: PhaseAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let summary = self
            .service
            .advance_phase(session_id, &action)
            .map_err(to_js_error)?;
        to_json(&summary)
    }

    pub fn normal_summon_json(&self, session_id: &str, action_json: &str) -> Result<String, JsValue> {
        let action: SummonAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let summary = self
            .service
            .normal_summon(session_id, &action)
            .map_err(to_js_error)?;
        to_json(&summary)
    }

    pub fn declare_attack_json(&self, session_id: &str, action_json: &str) -> Result<String, JsValue> {
        let action: AttackAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let result = self
            .service
            .declare_attack(session_id, &action)
            .map_err(to_js_error)?;
        to_json(&result)
    }

    pub fn end_turn_json(&self, session_id: &str, player_id: &str) -> Result<String, JsValue> {
        let result = self
            .service
            .end_turn(session_id, player_id)
            .map_err(to_js_error)?;
        to_json(&result)
    }

    pub fn forfeit_json(&self, session_id: &str, player_id: &str) -> Result<String, JsValue> {
        let verdict = self
            .service
            .forfeit(session_id, player_id)
            .map_err(to_js_error)?;
        to_json(&verdict)
    }
}

/// Runs the state-based checks on a session object without changing it.
#[wasm_bindgen(js_name = "evaluateState")]
pub fn evaluate_state(state: JsValue, max_board_size: Option<u8>) -> Result<JsValue, JsValue> {
    let session: GameSession = from_value(state).map_err(JsValue::from)?;
    let capacity = max_board_size.unwrap_or(EngineConfig::default().max_board_size);
    let verdict = StateBasedActions::new(capacity).evaluate(&session);
    to_value(&verdict).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let session: GameSession = from_value(state).map_err(JsValue::from)?;
    session
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))
}

/// Index a random-choice effect picks for `seed` among `count` options.
#[wasm_bindgen(js_name = "choiceIndex")]
pub fn choice_index(seed: &str, count: u32) -> Option<u32> {
    if count == 0 {
        return None;
    }
    Some(deterministic_index(seed, count as usize) as u32)
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
