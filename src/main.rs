use std::path::PathBuf;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use rover_motion_runtime::config::{ConfigError, FirmwareDialect, RuntimeConfig};

#[derive(Parser, Debug)]
#[command(about = "Rover motion-control runtime")]
struct Args {
    /// JSON config file; built-in defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Drive firmware dialect (legacy, v5, v6), overrides the config file
    #[arg(long)]
    dialect: Option<String>,

    /// CAN interface, e.g. can0
    #[arg(long)]
    can: Option<String>,

    /// UDP port for uplink packets
    #[arg(long)]
    uplink_port: Option<u16>,
}

fn load_config(args: Args) -> Result<RuntimeConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(name) = args.dialect.as_deref() {
        config.dialect = FirmwareDialect::by_name(name)?;
    }
    if let Some(iface) = args.can {
        config.can_interface = iface;
    }
    if let Some(port) = args.uplink_port {
        config.uplink_port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match load_config(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            error!("Config error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rover_motion_runtime::runtime::run(config).await {
        error!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
