use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use smsgate::bootstrap::Server;
use smsgate::config::Config;
use smsgate::telemetry::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(name = "smsgate")]
#[command(author, version, about = "SMS admission gateway")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (to get log settings)
    let config = Config::load(&args.config)?;

    init_tracing(&TracingConfig::from(&config.settings))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "starting smsgate"
    );

    info!(
        accounts = config.accounts.static_accounts.len(),
        kv_backend = ?config.store.backend,
        account_backend = ?config.accounts.backend,
        "configuration loaded"
    );

    // Validate only mode
    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}
