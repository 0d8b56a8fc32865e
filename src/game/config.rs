use serde::{Deserialize, Serialize};

const DEFAULT_STARTING_LIFE_POINTS: u32 = 8000;
const DEFAULT_OPENING_HAND_SIZE: u8 = 5;
const DEFAULT_MAX_BOARD_SIZE: u8 = 5;
const DEFAULT_MAX_COMMIT_RETRIES: u32 = 3;

/// Engine tunables. Every field falls back to its default when missing from JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub starting_life_points: u32,
    pub opening_hand_size: u8,
    pub max_board_size: u8,
    pub max_commit_retries: u32,
    pub first_player_skips_draw: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starting_life_points: DEFAULT_STARTING_LIFE_POINTS,
            opening_hand_size: DEFAULT_OPENING_HAND_SIZE,
            max_board_size: DEFAULT_MAX_BOARD_SIZE,
            max_commit_retries: DEFAULT_MAX_COMMIT_RETRIES,
            first_player_skips_draw: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
