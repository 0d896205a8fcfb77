//! Level settings written next to a saved world.

use bedrock_net::{GameRule, GameRuleValue};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Infinite terrain generator.
pub const GENERATOR_INFINITE: i32 = 1;
/// Flat generator, used with [`VOID_FLAT_LAYERS`] to make a void world.
pub const GENERATOR_FLAT: i32 = 2;

/// Flat world layers that generate nothing but air.
pub const VOID_FLAT_LAYERS: &str = r#"{"biome_id":1,"block_layers":[{"block_data":0,"block_id":0,"count":1},{"block_data":0,"block_id":0,"count":2},{"block_data":0,"block_id":0,"count":1}],"encoding_version":3,"structure_options":null}"#;

/// Gamerules stored with the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRules {
    pub command_block_output: bool,
    pub max_command_chain_length: i32,
    pub command_blocks_enabled: bool,
    pub do_daylight_cycle: bool,
    pub do_entity_drops: bool,
    pub do_fire_tick: bool,
    pub do_mob_loot: bool,
    pub do_mob_spawning: bool,
    pub do_tile_drops: bool,
    pub do_weather_cycle: bool,
    pub drowning_damage: bool,
    pub do_insomnia: bool,
    pub fall_damage: bool,
    pub fire_damage: bool,
    pub keep_inventory: bool,
    pub mob_griefing: bool,
    pub pvp: bool,
    pub show_coordinates: bool,
    pub natural_regeneration: bool,
    pub tnt_explodes: bool,
    pub send_command_feedback: bool,
    pub random_tick_speed: i32,
    pub do_immediate_respawn: bool,
    pub show_death_messages: bool,
    pub function_command_limit: i32,
    pub spawn_radius: i32,
    pub show_tags: bool,
    pub freeze_damage: bool,
    pub respawn_blocks_explode: bool,
    pub show_border_effect: bool,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            command_block_output: true,
            max_command_chain_length: 65536,
            command_blocks_enabled: true,
            do_daylight_cycle: true,
            do_entity_drops: true,
            do_fire_tick: true,
            do_mob_loot: true,
            do_mob_spawning: true,
            do_tile_drops: true,
            do_weather_cycle: true,
            drowning_damage: true,
            do_insomnia: true,
            fall_damage: true,
            fire_damage: true,
            keep_inventory: false,
            mob_griefing: true,
            pvp: true,
            show_coordinates: false,
            natural_regeneration: true,
            tnt_explodes: true,
            send_command_feedback: true,
            random_tick_speed: 1,
            do_immediate_respawn: false,
            show_death_messages: true,
            function_command_limit: 10000,
            spawn_radius: 5,
            show_tags: true,
            freeze_damage: true,
            respawn_blocks_explode: true,
            show_border_effect: true,
        }
    }
}

fn as_bool(value: GameRuleValue) -> Option<bool> {
    match value {
        GameRuleValue::Bool(v) => Some(v),
        _ => None,
    }
}

fn as_int(value: GameRuleValue) -> Option<i32> {
    match value {
        GameRuleValue::Int(v) => i32::try_from(v).ok(),
        GameRuleValue::Float(v) => Some(v as i32),
        GameRuleValue::Bool(_) => None,
    }
}

impl GameRules {
    /// Apply a server gamerule. Unknown names and mistyped values are logged
    /// and ignored; returns whether the rule was applied.
    pub fn apply(&mut self, rule: &GameRule) -> bool {
        let name = rule.name.to_ascii_lowercase();
        let bool_field = match name.as_str() {
            "commandblockoutput" => Some(&mut self.command_block_output),
            "commandblocksenabled" => Some(&mut self.command_blocks_enabled),
            "dodaylightcycle" => Some(&mut self.do_daylight_cycle),
            "doentitydrops" => Some(&mut self.do_entity_drops),
            "dofiretick" => Some(&mut self.do_fire_tick),
            "domobloot" => Some(&mut self.do_mob_loot),
            "domobspawning" => Some(&mut self.do_mob_spawning),
            "dotiledrops" => Some(&mut self.do_tile_drops),
            "doweathercycle" => Some(&mut self.do_weather_cycle),
            "drowningdamage" => Some(&mut self.drowning_damage),
            "doinsomnia" => Some(&mut self.do_insomnia),
            "falldamage" => Some(&mut self.fall_damage),
            "firedamage" => Some(&mut self.fire_damage),
            "keepinventory" => Some(&mut self.keep_inventory),
            "mobgriefing" => Some(&mut self.mob_griefing),
            "pvp" => Some(&mut self.pvp),
            "showcoordinates" => Some(&mut self.show_coordinates),
            "naturalregeneration" => Some(&mut self.natural_regeneration),
            "tntexplodes" => Some(&mut self.tnt_explodes),
            "sendcommandfeedback" => Some(&mut self.send_command_feedback),
            "doimmediaterespawn" => Some(&mut self.do_immediate_respawn),
            "showdeathmessages" => Some(&mut self.show_death_messages),
            "showtags" => Some(&mut self.show_tags),
            "freezedamage" => Some(&mut self.freeze_damage),
            "respawnblocksexplode" => Some(&mut self.respawn_blocks_explode),
            "showbordereffect" => Some(&mut self.show_border_effect),
            _ => None,
        };
        if let Some(field) = bool_field {
            return match as_bool(rule.value) {
                Some(v) => {
                    *field = v;
                    true
                }
                None => {
                    warn!("Gamerule {} expects a bool, got {:?}", rule.name, rule.value);
                    false
                }
            };
        }

        let int_field = match name.as_str() {
            "maxcommandchainlength" => &mut self.max_command_chain_length,
            "randomtickspeed" => &mut self.random_tick_speed,
            "functioncommandlimit" => &mut self.function_command_limit,
            "spawnradius" => &mut self.spawn_radius,
            _ => {
                warn!("Unknown gamerule {}", rule.name);
                return false;
            }
        };
        match as_int(rule.value) {
            Some(v) => {
                *int_field = v;
                true
            }
            None => {
                warn!("Gamerule {} expects a number, got {:?}", rule.name, rule.value);
                false
            }
        }
    }
}

/// World-level settings saved as `level.ron`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelSettings {
    pub level_name: String,
    pub random_seed: i64,
    pub spawn: [i32; 3],
    pub generator: i32,
    pub flat_world_layers: String,
    pub time: i64,
    pub base_game_version: String,
    /// Unix seconds of the capture.
    pub last_played: i64,
    pub game_rules: GameRules,
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self {
            level_name: String::from("world"),
            random_seed: 0,
            spawn: [0, 64, 0],
            generator: GENERATOR_INFINITE,
            flat_world_layers: String::new(),
            time: 0,
            base_game_version: String::from("*"),
            last_played: 0,
            game_rules: GameRules::default(),
        }
    }
}

impl LevelSettings {
    /// Switch to the empty flat generator.
    pub fn use_void_generator(&mut self) {
        self.generator = GENERATOR_FLAT;
        self.flat_world_layers = VOID_FLAT_LAYERS.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, value: GameRuleValue) -> GameRule {
        GameRule {
            name: name.into(),
            value,
        }
    }

    #[test]
    fn test_bool_and_int_rules_apply() {
        let mut rules = GameRules::default();
        assert!(rules.apply(&rule("keepInventory", GameRuleValue::Bool(true))));
        assert!(rules.apply(&rule("randomtickspeed", GameRuleValue::Int(3))));
        assert!(rules.apply(&rule("spawnradius", GameRuleValue::Float(10.0))));
        assert!(rules.keep_inventory);
        assert_eq!(rules.random_tick_speed, 3);
        assert_eq!(rules.spawn_radius, 10);
    }

    #[test]
    fn test_unknown_and_mistyped_rules_are_ignored() {
        let mut rules = GameRules::default();
        assert!(!rules.apply(&rule("recipesunlock", GameRuleValue::Bool(false))));
        assert!(!rules.apply(&rule("pvp", GameRuleValue::Int(0))));
        assert!(!rules.apply(&rule("spawnradius", GameRuleValue::Bool(true))));
        assert_eq!(rules, GameRules::default());
    }

    #[test]
    fn test_void_generator() {
        let mut settings = LevelSettings::default();
        settings.use_void_generator();
        assert_eq!(settings.generator, GENERATOR_FLAT);
        let layers: serde_json::Value = serde_json::from_str(&settings.flat_world_layers).unwrap();
        assert_eq!(layers["encoding_version"], 3);
        assert_eq!(layers["block_layers"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_settings_ron_round_trip() {
        let mut settings = LevelSettings::default();
        settings.game_rules.pvp = false;
        let text = ron::ser::to_string_pretty(&settings, ron::ser::PrettyConfig::default()).unwrap();
        let back: LevelSettings = ron::from_str(&text).unwrap();
        assert_eq!(back, settings);
    }
}
