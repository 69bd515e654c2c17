//! Command-line configuration for `chordctl`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use corelib::RingConfig;

use crate::commands::Command;

/// Drive an in-process Chord ring.
#[derive(Debug, Parser)]
#[command(name = "chordctl", version, about)]
pub struct CliConfig {
    #[command(subcommand)]
    pub command: Command,

    /// Ring config as JSON. Flags below override its fields.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Identifier width M.
    #[arg(short, long, global = true)]
    pub bits: Option<u8>,

    /// Stabilization rounds after each join and leave.
    #[arg(long, global = true)]
    pub rounds: Option<usize>,

    /// Hop budget per routing walk. 0 picks one from the ring size.
    #[arg(long, global = true)]
    pub max_hops: Option<usize>,

    /// Background maintenance period in milliseconds.
    #[arg(long, global = true)]
    pub interval_ms: Option<u64>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

impl CliConfig {
    /// Resolves the ring config: defaults, then the file, then flags.
    pub fn ring_config(&self) -> anyhow::Result<RingConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
            }
            None => RingConfig::default(),
        };
        if let Some(bits) = self.bits {
            config.id_bits = bits;
        }
        if let Some(rounds) = self.rounds {
            config.stabilization_rounds = rounds;
        }
        if let Some(hops) = self.max_hops {
            config.max_hops = hops;
        }
        if let Some(ms) = self.interval_ms {
            config.maintenance_interval_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let config = self.ring_config()?;
        let result = self.command.execute(config).await?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            println!("{result}");
        }
        Ok(())
    }
}
