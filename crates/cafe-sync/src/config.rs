//! # Hub Configuration
//!
//! Configuration for the order hub and the store behind it.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CAFE_DATABASE_PATH=/srv/cafe/orders.db                             │
//! │     CAFE_UTC_OFFSET_MINUTES=330                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/orders/hub.toml (Linux)                                  │
//! │     ~/Library/Application Support/com.cafe.orders/hub.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [store]
//! database_path = "cafe.db"
//! in_memory = false
//!
//! [sync]
//! max_mutation_attempts = 5
//! initial_backoff_ms = 25
//! max_backoff_ms = 1000
//! notification_capacity = 256
//! resync_max_elapsed_secs = 300
//!
//! [cafe]
//! name = "Blue Door Café"
//! utc_offset_minutes = 330   # IST
//! retention_days = 1
//! ```

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use cafe_db::DbConfig;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

/// Fourteen hours either side of UTC covers every real zone.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

// =============================================================================
// Store Settings
// =============================================================================

/// Where documents live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// SQLite file path. Ignored when `in_memory` is set.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Keep everything in process memory (demos and tests).
    #[serde(default)]
    pub in_memory: bool,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("cafe.db")
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            database_path: default_database_path(),
            in_memory: false,
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Mutation retry and resync behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Compare-and-swap attempts before a mutation gives up.
    #[serde(default = "default_max_mutation_attempts")]
    pub max_mutation_attempts: u32,

    /// First backoff after a lost compare-and-swap or failed resync.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Status-change events buffered per listener before it lags.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,

    /// How long resync backs off exponentially before settling at
    /// `max_backoff_ms`. 0 = back off without limit.
    #[serde(default = "default_resync_max_elapsed")]
    pub resync_max_elapsed_secs: u64,
}

fn default_max_mutation_attempts() -> u32 {
    5
}
fn default_initial_backoff() -> u64 {
    25
}
fn default_max_backoff() -> u64 {
    1_000
}
fn default_notification_capacity() -> usize {
    256
}
fn default_resync_max_elapsed() -> u64 {
    300
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            max_mutation_attempts: default_max_mutation_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            notification_capacity: default_notification_capacity(),
            resync_max_elapsed_secs: default_resync_max_elapsed(),
        }
    }
}

impl SyncSettings {
    /// Backoff for compare-and-swap retries. Attempts are bounded by
    /// `max_mutation_attempts`, not by elapsed time.
    pub fn conflict_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.max_backoff_ms))
            .with_multiplier(2.0)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Backoff for store resyncs. Once `resync_max_elapsed_secs` has
    /// passed the hub keeps retrying at `max_backoff_ms`.
    pub fn resync_backoff(&self) -> ExponentialBackoff {
        let max_elapsed = match self.resync_max_elapsed_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.max_backoff_ms))
            .with_multiplier(2.0)
            .with_max_elapsed_time(max_elapsed)
            .build()
    }
}

// =============================================================================
// Café Settings
// =============================================================================

/// Business settings used by reports and purging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CafeSettings {
    #[serde(default = "default_cafe_name")]
    pub name: String,

    /// Offset of the café's local time from UTC. A business day runs from
    /// local midnight to local midnight.
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Closed orders from this many previous business days survive a
    /// purge. 1 keeps yesterday; 0 keeps only today.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_cafe_name() -> String {
    "Café".to_string()
}

fn default_retention_days() -> u32 {
    1
}

impl Default for CafeSettings {
    fn default() -> Self {
        CafeSettings {
            name: default_cafe_name(),
            utc_offset_minutes: 0,
            retention_days: default_retention_days(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete hub configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub cafe: CafeSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// In-memory store with default settings.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.store.in_memory = true;
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (hub.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_path) {
            if path.exists() {
                info!(?path, "Loading hub config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load hub config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Hub config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if !self.store.in_memory && self.store.database_path.as_os_str().is_empty() {
            return Err(SyncError::InvalidConfig(
                "database_path must be set unless in_memory is true".into(),
            ));
        }

        if self.sync.max_mutation_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "max_mutation_attempts must be greater than 0".into(),
            ));
        }

        if self.sync.notification_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "notification_capacity must be greater than 0".into(),
            ));
        }

        if self.sync.initial_backoff_ms > self.sync.max_backoff_ms {
            return Err(SyncError::InvalidConfig(format!(
                "initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.sync.initial_backoff_ms, self.sync.max_backoff_ms
            )));
        }

        if self.cafe.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(SyncError::InvalidConfig(format!(
                "utc_offset_minutes must be within ±{}, got {}",
                MAX_UTC_OFFSET_MINUTES, self.cafe.utc_offset_minutes
            )));
        }

        Ok(())
    }

    /// Applies `CAFE_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup. Unparseable values are
    /// logged and skipped.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("CAFE_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.store.database_path = PathBuf::from(path);
        }

        if let Some(value) = lookup("CAFE_IN_MEMORY") {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.store.in_memory = true,
                "0" | "false" | "no" => self.store.in_memory = false,
                _ => warn!(value = %value, "Unknown CAFE_IN_MEMORY value"),
            }
        }

        if let Some(name) = lookup("CAFE_NAME") {
            self.cafe.name = name;
        }

        override_parsed(&lookup, "CAFE_MAX_MUTATION_ATTEMPTS", &mut self.sync.max_mutation_attempts);
        override_parsed(&lookup, "CAFE_UTC_OFFSET_MINUTES", &mut self.cafe.utc_offset_minutes);
        override_parsed(&lookup, "CAFE_RETENTION_DAYS", &mut self.cafe.retention_days);
    }

    /// Returns the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "cafe", "orders")
            .map(|dirs| dirs.config_dir().join("hub.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// The café's business-day offset.
    pub fn utc_offset(&self) -> SyncResult<FixedOffset> {
        FixedOffset::east_opt(self.cafe.utc_offset_minutes * 60).ok_or_else(|| {
            SyncError::InvalidConfig(format!(
                "utc_offset_minutes out of range: {}",
                self.cafe.utc_offset_minutes
            ))
        })
    }

    /// Pool settings for the SQLite store.
    pub fn db_config(&self) -> DbConfig {
        if self.store.in_memory {
            DbConfig::in_memory()
        } else {
            DbConfig::new(&self.store.database_path)
        }
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(value) => {
                debug!(key, "Overriding from environment");
                *target = value;
            }
            Err(_) => warn!(key, value = %raw, "Ignoring unparseable environment override"),
        }
    }
}
