//! Click-to-dial for the 3CX webclient API.
//!
//! `click2dial <extension> <password> <number>` logs in as the extension,
//! discovers the phone currently registered to it and makes the PBX bridge
//! that phone to the destination number. The PBX host comes from the
//! `PBX_URL` environment variable.

mod config;
mod pbx;

use anyhow::Context;
use clap::Parser;

use config::PbxConfig;

#[derive(Parser)]
#[command(name = "click2dial", version, about = "Place a PBX call from the command line")]
struct Cli {
    /// Extension to call from
    extension: String,

    /// Webclient password of the extension
    password: String,

    /// Destination number (a leading + becomes 00)
    number: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("click2dial=info".parse().unwrap()))
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = PbxConfig::from_env()?;

    pbx::click_to_dial(&config, &cli.extension, &cli.password, &cli.number)
        .await
        .context("call not placed")?;

    tracing::info!("call placed, pick up the handset");
    Ok(())
}
