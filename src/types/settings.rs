//! Account preferences. Last write wins; no ordering invariant.

use serde::{Deserialize, Serialize};

/// Gameplay difficulty preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

/// Player preference record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSettings {
    pub sound_enabled: bool,
    /// Music volume, 0-100.
    pub music_volume: u8,
    pub haptics_enabled: bool,
    /// BCP 47 language tag.
    pub language: String,
    pub colorblind_mode: bool,
    pub difficulty: Difficulty,
}

impl Default for AccountSettings {
    fn default() -> Self {
        AccountSettings {
            sound_enabled: true,
            music_volume: 80,
            haptics_enabled: true,
            language: "en".to_string(),
            colorblind_mode: false,
            difficulty: Difficulty::Normal,
        }
    }
}
