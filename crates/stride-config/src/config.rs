//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};
use stride_modifiers::history::DEFAULT_HISTORY_SIZE;
use stride_modifiers::{CategorySpec, ModifierCatalog};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Modifier category catalog.
    pub modifiers: ModifierConfig,
    /// Move history and resend settings.
    pub network: NetworkConfig,
    /// Loopback simulation settings.
    pub simulation: SimulationConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Modifier categories, in catalog order. A category's position is its id
/// on the wire, so reordering breaks compatibility with older peers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModifierConfig {
    pub categories: Vec<CategorySpec>,
}

/// Move history configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Saved moves kept for replay before the oldest is evicted.
    pub history_size: usize,
    /// Unacknowledged moves tolerated before the client reports a stall.
    pub max_unacked_moves: usize,
    /// Resend an old unacked move only when it changed modifier intent.
    pub resend_important_only: bool,
}

/// Loopback simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed ticks per second.
    pub tick_rate: u32,
    /// Ticks to run before exiting.
    pub ticks: u64,
    /// One-way delay of the simulated link, in ticks.
    pub latency_ticks: u32,
}

/// Debug configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level filter (e.g. "info", "debug", "stride_modifiers=trace").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for ModifierConfig {
    fn default() -> Self {
        Self {
            categories: CategorySpec::defaults(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_HISTORY_SIZE,
            max_unacked_moves: 64,
            resend_important_only: true,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            ticks: 600,
            latency_ticks: 3,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Validation ---

impl Config {
    /// Checks the category list and scalar settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.catalog()?;
        if self.network.history_size == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "network.history_size",
                reason: "must be at least 1",
            });
        }
        if self.network.max_unacked_moves == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "network.max_unacked_moves",
                reason: "must be at least 1",
            });
        }
        if self.simulation.tick_rate == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "simulation.tick_rate",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Builds the validated catalog from `modifiers.categories`.
    pub fn catalog(&self) -> Result<ModifierCatalog, ConfigError> {
        Ok(ModifierCatalog::new(self.modifiers.categories.clone())?)
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(4)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    ///
    /// A changed file that fails validation is an error; the caller keeps
    /// running on the old config.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            new_config.validate()?;
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use stride_modifiers::{AggregationMethod, MaskWidth, ModifierError, Multiplicity};

    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(4))
                .unwrap();
        assert!(ron_str.contains("\"Boost\""));
        assert!(ron_str.contains("\"Snare\""));
        assert!(ron_str.contains("history_size: 96"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.catalog().unwrap().len(), 5);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(network: (history_size: 8), debug: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.network.history_size, 8);
        assert!(config.network.resend_important_only);
        assert_eq!(config.modifiers, ModifierConfig::default());
        assert_eq!(config.simulation, SimulationConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_partial_category_fills_defaults() {
        let ron_str = r#"(modifiers: (categories: [(name: "Root", level_count: 3, method: Min)]))"#;
        let config: Config = ron::from_str(ron_str).unwrap();
        let spec = &config.modifiers.categories[0];
        assert_eq!(spec.name, "Root");
        assert_eq!(spec.method, AggregationMethod::Min);
        assert_eq!(spec.width, MaskWidth::W8);
        assert_eq!(spec.multiplicity, Multiplicity::Set);
        assert_eq!(spec.invalid_level, 0);
        config.validate().unwrap();
    }

    #[test]
    fn test_level_count_beyond_width_rejected() {
        let mut config = Config::default();
        config.modifiers.categories[0].level_count = 9;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCatalog(
                ModifierError::LevelCountExceedsWidth { .. }
            ))
        ));
    }

    #[test]
    fn test_duplicate_category_names_rejected() {
        let mut config = Config::default();
        let boost = config.modifiers.categories[0].clone();
        config.modifiers.categories.push(boost);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCatalog(_))
        ));
    }

    #[test]
    fn test_zero_tick_rate_rejected() {
        let mut config = Config::default();
        config.simulation.tick_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting {
                field: "simulation.tick_rate",
                ..
            })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.network.history_size = 32;
        config.simulation.latency_ticks = 7;
        config.modifiers.categories.truncate(2);

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_load_rejects_invalid_catalog() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.ron"),
            r#"(modifiers: (categories: [(name: "")]))"#,
        )
        .unwrap();
        assert!(Config::load_or_create(dir.path()).is_err());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.simulation.latency_ticks = 10;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().simulation.latency_ticks, 10);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }

    #[test]
    fn test_ron_comments_preserved() {
        let ron_str = "// This is a comment\n(\n  // Another comment\n)";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config, Config::default());
    }
}
