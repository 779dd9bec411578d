//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! The game section has defaults matching the production deployment so a
//! minimal config file still yields a runnable service.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub game: GameConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite://sattawala.db` or `sqlite::memory:`.
    pub url: String,
}

/// Game rules that are fixed per deployment (as opposed to the
/// admin-tunable `PlatformSettings` row in the store).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GameConfig {
    /// Lowest valid chosen number (inclusive).
    pub number_min: i64,
    /// Highest valid chosen number (inclusive).
    pub number_max: i64,
    /// Credited to every new account at registration.
    pub starting_bonus: Decimal,
    /// Credited to the referrer when someone registers with their code.
    pub referral_bonus: Decimal,
    /// Minimum amount for a withdrawal request.
    pub min_withdrawal: Decimal,
    /// Daily hours (UTC, 0–23) at which results are auto-announced.
    pub result_hours: Vec<u32>,
    /// Disable to require manual result announcement only.
    pub auto_announce: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            number_min: 0,
            number_max: 9,
            starting_bonus: Decimal::from(25),
            referral_bonus: Decimal::from(25),
            min_withdrawal: Decimal::from(100),
            result_hours: vec![11, 15, 21],
            auto_announce: true,
        }
    }
}

impl GameConfig {
    /// Whether a chosen number falls in the authoritative range.
    pub fn number_in_range(&self, number: i64) -> bool {
        (self.number_min..=self.number_max).contains(&number)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        if config.game.number_min > config.game.number_max {
            anyhow::bail!(
                "Invalid number range in {path}: {}..{}",
                config.game.number_min,
                config.game.number_max,
            );
        }
        Ok(config)
    }
}
