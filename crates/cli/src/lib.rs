//! CLI tool for exercising an in-process Chord ring.
//!
//! Provides commands for:
//! - Running the five-node reference scenario
//! - Simulating joins, leaves and key placement
//! - Hashing keys onto the ring

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
