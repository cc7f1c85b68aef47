//! Collator service binary.
//!
//! Usage:
//!     collator --watch-dir ./pages --output-dir ./docs --quarantine-dir ./bad
//!     collator --config collator.toml

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use collator::{CollatorService, QueueMessenger, RenderBuilder, ServiceConfig};

#[derive(Parser, Debug)]
#[command(name = "collator", about = "Collates numbered page scans into documents")]
struct Args {
    /// TOML config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory watched for incoming numbered files (default: pages)
    #[arg(long)]
    watch_dir: Option<PathBuf>,

    /// Directory receiving built documents (default: docs)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Directory receiving failed sequences (default: quarantine)
    #[arg(long)]
    quarantine_dir: Option<PathBuf>,

    /// Queue broker address (default: tcp://127.0.0.1:5560)
    #[arg(long)]
    queue: Option<String>,

    /// Unique service name used in status messages (default: collator)
    #[arg(long)]
    name: Option<String>,

    /// Verbose console logging
    #[arg(long, short)]
    verbose: bool,
}

/// Flags given on the command line win over the config file.
fn apply_overrides(config: &mut ServiceConfig, args: &Args) {
    if let Some(dir) = &args.watch_dir {
        config.watch_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(dir) = &args.quarantine_dir {
        config.quarantine_dir = dir.clone();
    }
    if let Some(addr) = &args.queue {
        config.queue_addr = addr.clone();
    }
    if let Some(name) = &args.name {
        config.service_name = name.clone();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    collator_logging::init_logging("collator", args.verbose)
        .context("Failed to initialize logging")?;

    let mut config = match &args.config {
        Some(path) => {
            ServiceConfig::load(path).with_context(|| format!("Loading {}", path.display()))?
        }
        None => ServiceConfig::new("collator", "pages", "docs", "quarantine"),
    };
    apply_overrides(&mut config, &args);

    tracing::info!("Starting collator service");
    tracing::info!("  Watch dir: {}", config.watch_dir.display());
    tracing::info!("  Output dir: {}", config.output_dir.display());
    tracing::info!("  Quarantine dir: {}", config.quarantine_dir.display());
    tracing::info!("  Queue: {}", config.queue_addr);

    let messenger = QueueMessenger::connect(&config.queue_addr, &config.service_name)
        .await
        .context("Failed to connect to queue broker")?;
    let builder = RenderBuilder::new();

    let mut service = CollatorService::new(config, Arc::new(builder), Arc::new(messenger))?;
    service.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    service.stop().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_file_values() {
        let args = Args::parse_from([
            "collator",
            "--watch-dir",
            "/srv/pages",
            "--name",
            "collator-2",
        ]);
        let mut config = ServiceConfig::new("collator", "pages", "docs", "quarantine");

        apply_overrides(&mut config, &args);

        assert_eq!(config.watch_dir, PathBuf::from("/srv/pages"));
        assert_eq!(config.service_name, "collator-2");
        // Flags not given leave the loaded values alone.
        assert_eq!(config.output_dir, PathBuf::from("docs"));
        assert_eq!(config.queue_addr, "tcp://127.0.0.1:5560");
    }
}
