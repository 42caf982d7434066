//! Runtime configuration for stride: the modifier category catalog, move
//! history tuning and simulation settings, persisted as RON with CLI
//! overrides.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, ModifierConfig, NetworkConfig, SimulationConfig};
pub use error::ConfigError;
