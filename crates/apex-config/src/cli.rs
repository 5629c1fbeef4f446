//! Command-line argument parsing for the Apex simulator.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, RealtimeSync};

/// Apex simulator command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "apex-sim", about = "Apex headless physics simulation")]
pub struct CliArgs {
    /// Macro step size in seconds.
    #[arg(long)]
    pub stepsize: Option<f32>,

    /// Micro steps per macro step.
    #[arg(long)]
    pub multiplier: Option<u32>,

    /// Realtime pacing: off, sleep or spin.
    #[arg(long, value_parser = parse_realtime_sync)]
    pub realtime: Option<RealtimeSync>,

    /// Simulated seconds to run before shutting down.
    #[arg(long, default_value_t = 5.0)]
    pub duration: f32,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn parse_realtime_sync(value: &str) -> Result<RealtimeSync, String> {
    match value.to_ascii_lowercase().as_str() {
        "off" => Ok(RealtimeSync::Off),
        "sleep" => Ok(RealtimeSync::Sleep),
        "spin" => Ok(RealtimeSync::Spin),
        other => Err(format!("expected off, sleep or spin, got `{other}`")),
    }
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(stepsize) = args.stepsize {
            self.physics.stepsize = stepsize;
        }
        if let Some(multiplier) = args.multiplier {
            self.physics.multiplier = multiplier;
        }
        if let Some(realtime) = args.realtime {
            self.physics.realtime_sync = realtime;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_args() -> CliArgs {
        CliArgs {
            stepsize: None,
            multiplier: None,
            realtime: None,
            duration: 5.0,
            log_level: None,
            config: None,
        }
    }

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            multiplier: Some(10),
            realtime: Some(RealtimeSync::Off),
            ..empty_args()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.physics.multiplier, 10);
        assert_eq!(config.physics.realtime_sync, RealtimeSync::Off);
        // Non-overridden fields retain defaults
        assert!((config.physics.stepsize - 0.01).abs() < f32::EPSILON);
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&empty_args());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::try_parse_from([
            "apex-sim",
            "--stepsize",
            "0.02",
            "--realtime",
            "SPIN",
            "--duration",
            "1.5",
        ])
        .unwrap();
        assert_eq!(args.stepsize, Some(0.02));
        assert_eq!(args.realtime, Some(RealtimeSync::Spin));
        assert!((args.duration - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cli_rejects_unknown_realtime_mode() {
        let result = CliArgs::try_parse_from(["apex-sim", "--realtime", "fast"]);
        assert!(result.is_err());
    }
}
