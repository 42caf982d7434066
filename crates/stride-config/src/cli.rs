//! Command-line argument parsing for the stride simulator.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Stride command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "stride", about = "Tiered modifier sync loopback simulator")]
pub struct CliArgs {
    /// Fixed ticks per second.
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// Number of ticks to simulate.
    #[arg(long)]
    pub ticks: Option<u64>,

    /// One-way link delay in ticks.
    #[arg(long)]
    pub latency_ticks: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    /// Config directory: `--config` if given, else `<platform config dir>/stride`.
    pub fn config_dir(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| dirs::config_dir().map(|base| base.join("stride")))
    }
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(rate) = args.tick_rate {
            self.simulation.tick_rate = rate;
        }
        if let Some(ticks) = args.ticks {
            self.simulation.ticks = ticks;
        }
        if let Some(latency) = args.latency_ticks {
            self.simulation.latency_ticks = latency;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_args() -> CliArgs {
        CliArgs {
            tick_rate: None,
            ticks: None,
            latency_ticks: None,
            log_level: None,
            config: None,
        }
    }

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            ticks: Some(120),
            log_level: Some("stride_modifiers=trace".to_string()),
            ..no_args()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.simulation.ticks, 120);
        assert_eq!(config.debug.log_level, "stride_modifiers=trace");
        // Non-overridden fields retain defaults
        assert_eq!(config.simulation.tick_rate, 60);
        assert_eq!(config.simulation.latency_ticks, 3);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&no_args());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from([
            "stride",
            "--latency-ticks",
            "5",
            "--tick-rate",
            "30",
            "--config",
            "/tmp/stride",
        ]);
        assert_eq!(args.latency_ticks, Some(5));
        assert_eq!(args.tick_rate, Some(30));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/stride")));
        assert!(args.ticks.is_none());
        assert_eq!(args.config_dir(), Some(PathBuf::from("/tmp/stride")));
    }
}
