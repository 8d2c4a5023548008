use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::RwLock;

/// Setting names as stored in the host configuration
pub mod keys {
    pub const BOSSBAR_ENABLED: &str = "bossbar_enabled";
    pub const BOSSBAR_REFRESH_RATE: &str = "bossbar_refresh_rate";
    pub const MAP_ICON_REFRESH_RATE: &str = "map_icon_refresh_rate";
    pub const TELEPORT_COOLDOWN: &str = "teleport_cooldown";
    pub const MAX_CPU_USAGE: &str = "max_cpu_usage";
    pub const MAX_MEMORY_USAGE: &str = "max_memory_usage";
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    NonPositive(&'static str),
    #[error("{0} must be a percentage (1-100)")]
    NotAPercentage(&'static str),
    #[error("setting '{0}' holds a value of a different type")]
    TypeMismatch(String),
}

/// A named setting value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigValue {
    Int(i64),
    Bool(bool),
}

/// Named integer/boolean settings with defaults, owned by the host.
///
/// Persistence across restarts is the host's business; the plugin only
/// reads and writes through this trait.
pub trait ConfigStore: Send + Sync {
    fn get_int(&self, key: &str, default: i64) -> i64;

    fn set_int(&self, key: &str, value: i64) -> Result<(), ConfigError>;

    fn get_bool(&self, key: &str, default: bool) -> bool;

    fn set_bool(&self, key: &str, value: bool) -> Result<(), ConfigError>;

    /// Store `value` only if `key` is not present yet
    fn add_default(&self, key: &str, value: ConfigValue);
}

/// In-memory `ConfigStore`
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: RwLock<HashMap<String, ConfigValue>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    fn set(&self, key: &str, value: ConfigValue) -> Result<(), ConfigError> {
        let mut values = self.values.write();
        match (values.get(key), value) {
            (Some(ConfigValue::Int(_)), ConfigValue::Bool(_))
            | (Some(ConfigValue::Bool(_)), ConfigValue::Int(_)) => {
                Err(ConfigError::TypeMismatch(key.to_string()))
            }
            _ => {
                values.insert(key.to_string(), value);
                Ok(())
            }
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.values.read().get(key) {
            Some(ConfigValue::Int(v)) => *v,
            _ => default,
        }
    }

    fn set_int(&self, key: &str, value: i64) -> Result<(), ConfigError> {
        self.set(key, ConfigValue::Int(value))
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.read().get(key) {
            Some(ConfigValue::Bool(v)) => *v,
            _ => default,
        }
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), ConfigError> {
        self.set(key, ConfigValue::Bool(value))
    }

    fn add_default(&self, key: &str, value: ConfigValue) {
        self.values.write().entry(key.to_string()).or_insert(value);
    }
}

/// Plugin configuration
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Show the coordinate status bar
    pub bossbar_enabled: bool,
    /// Status-bar refresh interval in ticks
    pub bossbar_refresh_rate: u32,
    /// Map overlay refresh interval in ticks
    pub map_icon_refresh_rate: u32,
    /// Seconds between accepted teleports per player
    pub teleport_cooldown: u32,
    /// CPU usage (percent) above which load samples are reported
    pub max_cpu_usage: u8,
    /// Memory usage (percent) above which load samples are reported
    pub max_memory_usage: u8,
    /// Ticks between load controller runs
    pub monitor_interval: u32,
    /// Map refresh interval ceiling for adaptive doubling
    pub map_refresh_ceiling: u32,
    /// Status-bar refresh interval ceiling for adaptive doubling
    pub bossbar_refresh_ceiling: u32,
    /// Ticks between an accepted teleport and the actual move
    pub teleport_delay_ticks: u32,
    /// Window after a hover in which an activate gesture toggles the full-screen map
    pub map_click_window: Duration,
    /// Host ticks per second
    pub tick_rate: u32,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            bossbar_enabled: true,
            bossbar_refresh_rate: 20,
            map_icon_refresh_rate: 5,
            teleport_cooldown: 300,
            max_cpu_usage: 70,
            max_memory_usage: 80,
            monitor_interval: 100,
            map_refresh_ceiling: 40,
            bossbar_refresh_ceiling: 80,
            teleport_delay_ticks: 60,
            map_click_window: Duration::from_millis(200),
            tick_rate: 20,
        }
    }
}

impl PluginConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("BOSSBAR_ENABLED") {
            match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => config.bossbar_enabled = true,
                "0" | "false" | "no" => config.bossbar_enabled = false,
                _ => tracing::warn!("Invalid BOSSBAR_ENABLED '{}', using default", value),
            }
        }

        if let Some(rate) = env_positive("BOSSBAR_REFRESH_RATE") {
            config.bossbar_refresh_rate = rate;
        }

        if let Some(rate) = env_positive("MAP_ICON_REFRESH_RATE") {
            config.map_icon_refresh_rate = rate;
        }

        if let Some(cooldown) = env_positive("TELEPORT_COOLDOWN") {
            config.teleport_cooldown = cooldown;
        }

        if let Some(percent) = env_percent("MAX_CPU_USAGE") {
            config.max_cpu_usage = percent;
        }

        if let Some(percent) = env_percent("MAX_MEMORY_USAGE") {
            config.max_memory_usage = percent;
        }

        if let Some(tick_rate) = env_positive("TICK_RATE") {
            config.tick_rate = tick_rate;
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bossbar_refresh_rate == 0 {
            return Err(ConfigError::NonPositive(keys::BOSSBAR_REFRESH_RATE));
        }
        if self.map_icon_refresh_rate == 0 {
            return Err(ConfigError::NonPositive(keys::MAP_ICON_REFRESH_RATE));
        }
        if self.monitor_interval == 0 {
            return Err(ConfigError::NonPositive("monitor_interval"));
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::NonPositive("tick_rate"));
        }
        if self.max_cpu_usage == 0 || self.max_cpu_usage > 100 {
            return Err(ConfigError::NotAPercentage(keys::MAX_CPU_USAGE));
        }
        if self.max_memory_usage == 0 || self.max_memory_usage > 100 {
            return Err(ConfigError::NotAPercentage(keys::MAX_MEMORY_USAGE));
        }
        Ok(())
    }

    /// Write these values into the store as defaults; existing entries win
    pub fn seed(&self, store: &dyn ConfigStore) {
        store.add_default(keys::BOSSBAR_ENABLED, ConfigValue::Bool(self.bossbar_enabled));
        store.add_default(
            keys::BOSSBAR_REFRESH_RATE,
            ConfigValue::Int(self.bossbar_refresh_rate as i64),
        );
        store.add_default(
            keys::MAP_ICON_REFRESH_RATE,
            ConfigValue::Int(self.map_icon_refresh_rate as i64),
        );
        store.add_default(
            keys::TELEPORT_COOLDOWN,
            ConfigValue::Int(self.teleport_cooldown as i64),
        );
        store.add_default(keys::MAX_CPU_USAGE, ConfigValue::Int(self.max_cpu_usage as i64));
        store.add_default(
            keys::MAX_MEMORY_USAGE,
            ConfigValue::Int(self.max_memory_usage as i64),
        );
    }

    /// Duration of one host tick
    pub fn tick_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.tick_rate.max(1) as u64)
    }
}

fn env_positive(name: &str) -> Option<u32> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<u32>() {
        Ok(parsed) if parsed > 0 => Some(parsed),
        Ok(_) => {
            tracing::warn!("{} must be > 0, using default", name);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

fn env_percent(name: &str) -> Option<u8> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<u8>() {
        Ok(parsed) if (1..=100).contains(&parsed) => Some(parsed),
        _ => {
            tracing::warn!("{} must be 1-100, got '{}', using default", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PluginConfig::default();
        assert!(config.bossbar_enabled);
        assert_eq!(config.bossbar_refresh_rate, 20);
        assert_eq!(config.map_icon_refresh_rate, 5);
        assert_eq!(config.teleport_cooldown, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = PluginConfig::load_or_default();
        assert!(config.tick_rate > 0);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = PluginConfig {
            map_icon_refresh_rate: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositive(keys::MAP_ICON_REFRESH_RATE))
        );
    }

    #[test]
    fn test_seed_does_not_overwrite() {
        let store = MemoryConfigStore::new();
        store.set_int(keys::MAP_ICON_REFRESH_RATE, 40).unwrap();

        PluginConfig::default().seed(&store);

        assert_eq!(store.get_int(keys::MAP_ICON_REFRESH_RATE, 0), 40);
        assert_eq!(store.get_int(keys::BOSSBAR_REFRESH_RATE, 0), 20);
        assert!(store.get_bool(keys::BOSSBAR_ENABLED, false));
    }

    #[test]
    fn test_store_type_mismatch() {
        let store = MemoryConfigStore::new();
        store.set_bool(keys::BOSSBAR_ENABLED, true).unwrap();

        assert!(matches!(
            store.set_int(keys::BOSSBAR_ENABLED, 3),
            Err(ConfigError::TypeMismatch(_))
        ));
        // Wrong-typed reads fall back to the default
        assert_eq!(store.get_int(keys::BOSSBAR_ENABLED, 7), 7);
    }

    #[test]
    fn test_tick_duration() {
        let config = PluginConfig::default();
        assert_eq!(config.tick_duration(), Duration::from_millis(50));
    }
}
