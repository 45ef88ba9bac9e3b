//! Configuration module - environment variables and gameplay constants

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::game::host::Vec3;
use crate::game::weapons::{ConsumableType, MeleeType, RangedType};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Shared secret the host runtime signs its bridge tokens with
    pub host_secret: String,

    /// Supabase project URL (progress falls back to memory when unset)
    pub supabase_url: Option<String>,
    /// Supabase service role key (bypasses RLS - server only!)
    pub supabase_service_role_key: Option<String>,

    /// Gameplay tuning
    pub game: GameConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let game = match env::var("GAME_CONFIG") {
            Ok(path) => GameConfig::from_file(PathBuf::from(path))?,
            Err(_) => GameConfig::default(),
        };
        game.validate()?;

        let supabase_url = env::var("SUPABASE_URL").ok();
        let supabase_service_role_key = env::var("SUPABASE_SERVICE_ROLE_KEY").ok();
        if supabase_url.is_some() != supabase_service_role_key.is_some() {
            return Err(ConfigError::Missing(if supabase_url.is_some() {
                "SUPABASE_SERVICE_ROLE_KEY"
            } else {
                "SUPABASE_URL"
            }));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            host_secret: env::var("HOST_SECRET").map_err(|_| ConfigError::Missing("HOST_SECRET"))?,

            supabase_url,
            supabase_service_role_key,
            game,
        })
    }
}

/// Axis-aligned box players spawn inside
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnRegion {
    pub min: Vec3,
    pub max: Vec3,
}

/// Distance-based damage falloff thresholds
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FalloffConfig {
    /// Full damage up to this distance
    pub full_range: f32,
    /// Minimum multiplier applies from this distance on
    pub min_range: f32,
    pub min_multiplier: f32,
}

impl Default for FalloffConfig {
    fn default() -> Self {
        Self {
            full_range: 20.0,
            min_range: 60.0,
            min_multiplier: 0.5,
        }
    }
}

/// Cosmetic rank tier unlocked at an experience threshold
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankTier {
    pub name: String,
    pub threshold: u64,
}

impl RankTier {
    fn new(name: &str, threshold: u64) -> Self {
        Self {
            name: name.to_string(),
            threshold,
        }
    }
}

/// Item placed in the world when a round starts
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum LootItem {
    Melee { melee: MeleeType },
    Ranged { weapon: RangedType },
    Consumable { consumable: ConsumableType, quantity: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LootSpawn {
    pub position: Vec3,
    pub loot: LootItem,
}

/// Gameplay constants. Every field has a default so a JSON override file only
/// needs the values it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Connected players needed before the countdown starts
    pub min_players: usize,
    pub countdown_secs: u32,
    pub match_duration_ms: u64,
    /// Poll interval while waiting for players
    pub waiting_poll_ms: u64,
    /// Pause between a finished round and the next waiting check
    pub next_round_delay_ms: u64,
    pub respawn_delay_ms: u64,

    pub spawn_region: SpawnRegion,
    pub max_health: f32,
    pub max_shield: f32,
    pub falloff: FalloffConfig,

    pub ranks: Vec<RankTier>,
    pub inventory_slots: usize,

    pub kill_exp: u64,
    pub win_bonus_exp: u64,
    /// Experience accumulated beyond this triggers a save
    pub exp_save_interval: u64,

    pub heal_amount: f32,
    pub heal_interval_ms: u64,
    /// Quiet period after taking damage before regeneration kicks in
    pub heal_delay_ms: u64,

    pub out_of_bounds_check_ms: u64,
    /// Avatars below this height have fallen out of the world
    pub kill_plane_y: f32,

    pub marker_lifetime_ms: u64,

    pub loot_spawns: Vec<LootSpawn>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            countdown_secs: 10,
            match_duration_ms: 5 * 60 * 1000,
            waiting_poll_ms: 1000,
            next_round_delay_ms: 10_000,
            respawn_delay_ms: 5000,
            spawn_region: SpawnRegion {
                min: Vec3::new(-24.0, 10.0, -24.0),
                max: Vec3::new(24.0, 14.0, 24.0),
            },
            max_health: 100.0,
            max_shield: 100.0,
            falloff: FalloffConfig::default(),
            ranks: vec![
                RankTier::new("Bronze", 0),
                RankTier::new("Silver", 100),
                RankTier::new("Gold", 500),
                RankTier::new("Platinum", 1500),
                RankTier::new("Diamond", 5000),
            ],
            inventory_slots: 5,
            kill_exp: 100,
            win_bonus_exp: 500,
            exp_save_interval: 250,
            heal_amount: 5.0,
            heal_interval_ms: 1000,
            heal_delay_ms: 5000,
            out_of_bounds_check_ms: 1000,
            kill_plane_y: -32.0,
            marker_lifetime_ms: 5000,
            loot_spawns: vec![
                LootSpawn {
                    position: Vec3::new(10.0, 11.0, 10.0),
                    loot: LootItem::Ranged { weapon: RangedType::Rifle },
                },
                LootSpawn {
                    position: Vec3::new(-10.0, 11.0, -10.0),
                    loot: LootItem::Ranged { weapon: RangedType::Sniper },
                },
                LootSpawn {
                    position: Vec3::new(12.0, 11.0, -12.0),
                    loot: LootItem::Melee { melee: MeleeType::Knife },
                },
                LootSpawn {
                    position: Vec3::new(0.0, 11.0, 12.0),
                    loot: LootItem::Consumable {
                        consumable: ConsumableType::Medkit,
                        quantity: 2,
                    },
                },
                LootSpawn {
                    position: Vec3::new(0.0, 11.0, -12.0),
                    loot: LootItem::Consumable {
                        consumable: ConsumableType::ShieldPotion,
                        quantity: 1,
                    },
                },
            ],
        }
    }
}

impl GameConfig {
    /// Load a JSON override file
    pub fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Rank thresholds in ascending order
    pub fn rank_thresholds(&self) -> Vec<u64> {
        self.ranks.iter().map(|r| r.threshold).collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_players == 0 {
            return Err(ConfigError::Invalid("min_players must be at least 1"));
        }
        if self.inventory_slots < 2 {
            return Err(ConfigError::Invalid(
                "inventory_slots must hold the melee tool and the starting weapon",
            ));
        }
        if self.ranks.first().map(|r| r.threshold) != Some(0) {
            return Err(ConfigError::Invalid("first rank must start at 0 experience"));
        }
        if self.ranks.windows(2).any(|w| w[0].threshold >= w[1].threshold) {
            return Err(ConfigError::Invalid("rank thresholds must be strictly ascending"));
        }
        if self.falloff.min_range <= self.falloff.full_range {
            return Err(ConfigError::Invalid("falloff min_range must exceed full_range"));
        }
        if !(0.0..=1.0).contains(&self.falloff.min_multiplier) {
            return Err(ConfigError::Invalid("falloff min_multiplier must be within 0..=1"));
        }
        let region = &self.spawn_region;
        if region.min.x > region.max.x || region.min.y > region.max.y || region.min.z > region.max.z {
            return Err(ConfigError::Invalid("spawn_region min must not exceed max"));
        }
        if self.max_health <= 0.0 || self.max_shield < 0.0 {
            return Err(ConfigError::Invalid("max_health must be positive"));
        }
        // Repeating timers reschedule themselves at now + interval
        if self.waiting_poll_ms == 0 || self.heal_interval_ms == 0 || self.out_of_bounds_check_ms == 0 {
            return Err(ConfigError::Invalid("repeating check intervals must be at least 1 ms"));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Failed to read game config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse game config: {0}")]
    Parse(String),

    #[error("Invalid game config: {0}")]
    Invalid(&'static str),
}
