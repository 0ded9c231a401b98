//! FIX/OUCH engine binary.
//!
//! # Usage
//!
//! ```bash
//! fix-engine --config sessions.toml
//! ```
//!
//! The config file deserializes into [`fix_engine::EngineConfig`] (a list
//! of `[[sessions]]` tables plus the scheduled-tick periods); see
//! `fix_engine::config` for the full field list.

use std::path::PathBuf;

use clap::Parser;
use fix_engine::{Engine, EngineConfig, FileLogStore, FileLogStoreConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// FIX/OUCH protocol engine
#[derive(Parser, Debug)]
#[command(name = "fix-engine")]
#[command(about = "FIX/OUCH session engine")]
#[command(version)]
struct Args {
    /// Path to the TOML session configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Directory the log store writes persisted sessions under
    #[arg(long, default_value = "data/log")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("FIX engine starting");
    tracing::info!("Loading configuration from {}", args.config.display());

    let config_text = tokio::fs::read_to_string(&args.config).await?;
    let config: EngineConfig = toml::from_str(&config_text)?;

    tracing::info!("Managing {} session(s)", config.sessions.len());

    let log_store =
        FileLogStore::open(FileLogStoreConfig { base_dir: args.log_dir, ..Default::default() })
            .await?;

    let engine = Engine::new(config, log_store)?;
    engine.run().await?;

    Ok(())
}
