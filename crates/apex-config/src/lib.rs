//! Configuration system for the Apex simulator.
//!
//! Provides the physics, environment and debug settings the simulation core
//! consumes, persisted to disk as RON. Supports CLI overrides via clap,
//! hot-reload detection, and forward/backward compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, EnvironmentConfig, PhysicsConfig, RealtimeSync};
pub use error::ConfigError;
