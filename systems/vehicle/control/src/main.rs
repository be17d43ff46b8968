//! Vehicle control binary: canbus commands in, steering and throttle out.

use anyhow::{Context, Result};
use clap::Parser;
use ecu::components::prelude::*;
use log::info;

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file for the Vehicle Control Component.
    #[arg(short, long)]
    filepath: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let component = VehicleControl::from_config_file(&args.filepath)
        .with_context(|| format!("Failed to build vehicle control from {}", args.filepath))?;
    let canbus_id = component.canbus_id().to_string();

    let summary = VehicleControlController::start(component, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Without a ctrl-c listener there is no way to stop, keep running.
            log::error!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    })
    .await
    .with_context(|| format!("Vehicle control on {canbus_id} failed"))?;

    info!(
        "Dispatched {} commands, dropped {} malformed frames",
        summary.dispatched, summary.malformed
    );
    Ok(())
}
