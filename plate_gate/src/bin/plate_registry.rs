use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use plate_gate::{normalize, GateConfig, VehicleRegistry};
use tracing_subscriber::EnvFilter;

/// Manage the registry of authorized vehicles.
#[derive(Parser)]
#[command(name = "plate_registry")]
struct Args {
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Registry file, overrides the configuration
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a vehicle and its route
    Add {
        plate: String,
        from: String,
        to: String,
    },
    /// Remove a registered vehicle
    Remove { plate: String },
    /// List registered vehicles
    List,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    let config = GateConfig::load_or_default(args.config.as_deref())?;
    let path = args.registry.unwrap_or(config.registry_path);
    let registry = VehicleRegistry::open(&path);

    match args.command {
        Command::Add { plate, from, to } => {
            let plate = registry.register(&plate, &from, &to)?;
            println!("Vehicle {} registered successfully!", plate);
        }
        Command::Remove { plate } => {
            let plate = normalize(&plate);
            if !registry.remove(&plate)? {
                bail!("Vehicle {} is not registered", plate);
            }
            println!("Vehicle {} removed", plate);
        }
        Command::List => {
            for record in registry.list() {
                println!("{}", record);
            }
        }
    }

    Ok(())
}
