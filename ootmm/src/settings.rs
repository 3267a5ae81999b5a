use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use ootmm_game::{Constraint, Game, SettingValue, SettingsView};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BossSetting {
    pub name: String,
    pub area: String,  // Namespaced area, e.g. "OOT Deku Tree Boss"
    pub event: String, // Namespaced event, e.g. "OOT_BOSS_GOHMA"
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_players")]
    pub players: usize,
    #[serde(default)]
    pub goal_events: Vec<String>,
    #[serde(default)]
    pub hint_path_boss: bool,
    #[serde(default)]
    pub hint_path_end_boss: bool,
    #[serde(default)]
    pub bosses: Vec<BossSetting>,
    #[serde(default)]
    pub end_bosses: Vec<BossSetting>,
    #[serde(default)]
    pub hero_hints: usize,
    // Options read by `setting(...)` in the logic tables.
    #[serde(flatten)]
    pub options: BTreeMap<String, SettingValue>,
}

fn default_players() -> usize {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            players: 1,
            goal_events: vec![],
            hint_path_boss: false,
            hint_path_end_boss: false,
            bosses: vec![],
            end_bosses: vec![],
            hero_hints: 0,
            options: BTreeMap::new(),
        }
    }
}

impl SettingsView for Settings {
    fn value(&self, name: &str) -> Option<&SettingValue> {
        self.options.get(name)
    }
}

pub fn parse_settings(settings_json: &str) -> Result<Settings> {
    let mut des = serde_json::Deserializer::from_str(settings_json);
    let settings = serde_path_to_error::deserialize(&mut des)?;
    Ok(settings)
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let settings_str = std::fs::read_to_string(path)
        .with_context(|| format!("Unable to load settings at {}", path.display()))?;
    parse_settings(&settings_str)
        .with_context(|| format!("Unable to parse settings at {}", path.display()))
}

fn game_of_item(item: &str) -> Option<Game> {
    Game::ALL
        .into_iter()
        .find(|g| item.strip_prefix(g.tag()).is_some_and(|r| r.starts_with('_')))
}

/// Placement constraint for the vanilla item of a check: dungeon items follow
/// their shuffle option, everything else may go anywhere.
pub fn item_constraint(item: &str, settings: &dyn SettingsView) -> Constraint {
    let game_suffix = match game_of_item(item) {
        Some(Game::Oot) => "Oot",
        Some(Game::Mm) => "Mm",
        None => return Constraint::Anywhere,
    };
    let option = if item.contains("_SMALL_KEY") {
        format!("smallKeyShuffle{game_suffix}")
    } else if item.contains("_BOSS_KEY") {
        format!("bossKeyShuffle{game_suffix}")
    } else if item.contains("_MAP_") || item.contains("_COMPASS_") {
        "mapCompassShuffle".to_string()
    } else if item.contains("_STRAY_FAIRY") {
        "strayFairyShuffle".to_string()
    } else {
        return Constraint::Anywhere;
    };
    match settings.value(&option) {
        Some(SettingValue::Str(s)) => Constraint::from_str(s).unwrap_or(Constraint::OwnDungeon),
        _ => Constraint::OwnDungeon,
    }
}
