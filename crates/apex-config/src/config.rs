//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level simulator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Stepping and solver settings.
    pub physics: PhysicsConfig,
    /// Track environment (gravity, air).
    pub environment: EnvironmentConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// How the simulation thread keeps pace with the wall clock.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RealtimeSync {
    /// Run macro steps back to back.
    Off,
    /// Sleep until the simulated time catches up.
    #[default]
    Sleep,
    /// Busy-wait until the simulated time catches up.
    Spin,
}

/// Stepping, solver and contact configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Macro step size in seconds.
    pub stepsize: f32,
    /// Number of micro steps per macro step.
    pub multiplier: u32,
    /// Constraint solver iterations per micro step.
    pub iterations: u32,
    /// Maximum solver contacts kept per contact manifold.
    pub contact_points: u32,
    /// Default error reduction used as the reference for soft contacts.
    pub default_erp: f32,
    /// Default constraint force mixing.
    pub default_cfm: f32,
    /// Linear drag given to new bodies.
    pub default_linear_drag: f32,
    /// Angular drag given to new bodies.
    pub default_angular_drag: f32,
    /// Linear speed below which a body counts as idle.
    pub auto_disable_linear: f32,
    /// Angular speed below which a body counts as idle.
    pub auto_disable_angular: f32,
    /// Seconds a body must stay idle before it is put to sleep.
    pub auto_disable_time: f32,
    /// Micro steps a body must stay idle before it is put to sleep.
    pub auto_disable_steps: u32,
    /// Realtime pacing policy for the simulation thread.
    pub realtime_sync: RealtimeSync,
    /// Broadcast a new-frame signal to waiting readers after every macro step.
    pub sync_interface: bool,
}

/// Track environment the physics core reads every step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Gravity vector in m/s².
    pub gravity: [f32; 3],
    /// Air density used by the drag model (kg/m³).
    pub density: f32,
    /// Ambient wind velocity in m/s.
    pub wind: [f32; 3],
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Write a JSON log file next to the config in debug builds.
    pub log_file: bool,
}

// --- Default implementations ---

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            stepsize: 0.01,
            multiplier: 4,
            iterations: 5,
            contact_points: 20,
            default_erp: 0.8,
            default_cfm: 0.00001,
            default_linear_drag: 5.0,
            default_angular_drag: 5.0,
            auto_disable_linear: 0.05,
            auto_disable_angular: 0.10,
            auto_disable_time: 0.5,
            auto_disable_steps: 1,
            realtime_sync: RealtimeSync::Sleep,
            sync_interface: true,
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, 0.0, -9.82],
            density: 1.29,
            wind: [0.0, 0.0, 0.0],
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: true,
        }
    }
}

impl PhysicsConfig {
    /// Micro step size: `stepsize / multiplier`.
    pub fn micro_stepsize(&self) -> f32 {
        self.stepsize / self.multiplier.max(1) as f32
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for the simulator (`<config>/apex`).
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("apex"))
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
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
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Rejects values that cannot be replaced by a safe default and clamps
    /// the ones that can.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let physics = &mut self.physics;
        if !(physics.stepsize.is_finite() && physics.stepsize > 0.0) {
            return Err(ConfigError::Invalid {
                field: "physics.stepsize",
                reason: format!("must be a positive number of seconds, got {}", physics.stepsize),
            });
        }
        if physics.multiplier == 0 {
            log::warn!("physics.multiplier is 0, using 1");
            physics.multiplier = 1;
        }
        if physics.iterations == 0 {
            log::warn!("physics.iterations is 0, using 1");
            physics.iterations = 1;
        }
        if physics.contact_points == 0 {
            log::warn!("physics.contact_points is 0, using 1");
            physics.contact_points = 1;
        }
        if !(physics.default_erp > 0.0 && physics.default_erp <= 1.0) {
            log::warn!(
                "physics.default_erp {} outside (0, 1], using 0.8",
                physics.default_erp
            );
            physics.default_erp = 0.8;
        }
        if self.environment.density < 0.0 {
            log::warn!(
                "environment.density {} is negative, using 0",
                self.environment.density
            );
            self.environment.density = 0.0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(!ron_str.is_empty());
        assert!(ron_str.contains("stepsize: 0.01"));
        assert!(ron_str.contains("multiplier: 4"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_field_uses_default() {
        let ron_str = "(physics: (multiplier: 8))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.physics.multiplier, 8);
        assert_eq!(config.physics.iterations, 5);
        assert_eq!(config.environment, EnvironmentConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let ron_str = "(future_setting: true)";
        let result: Result<Config, _> = ron::from_str(ron_str);
        assert!(result.is_ok());
    }

    #[test]
    fn test_realtime_sync_parses() {
        let config: Config = ron::from_str("(physics: (realtime_sync: Spin))").unwrap();
        assert_eq!(config.physics.realtime_sync, RealtimeSync::Spin);
    }

    #[test]
    fn test_micro_stepsize() {
        let physics = PhysicsConfig::default();
        assert!((physics.micro_stepsize() - 0.0025).abs() < 1e-7);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.physics.stepsize = 0.005;
        config.environment.wind = [3.0, 0.0, 0.0];

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.physics.multiplier = 10;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_some());
        assert_eq!(result.unwrap().physics.multiplier, 10);
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
    fn test_validate_rejects_zero_stepsize() {
        let mut config = Config::default();
        config.physics.stepsize = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "physics.stepsize", .. })
        ));
    }

    #[test]
    fn test_validate_clamps_recoverable_values() {
        let mut config = Config::default();
        config.physics.multiplier = 0;
        config.physics.contact_points = 0;
        config.physics.default_erp = 3.0;
        config.environment.density = -1.0;
        config.validate().unwrap();
        assert_eq!(config.physics.multiplier, 1);
        assert_eq!(config.physics.contact_points, 1);
        assert!((config.physics.default_erp - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.environment.density, 0.0);
    }
}
