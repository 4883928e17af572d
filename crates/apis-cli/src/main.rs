//! Main entry point for the APIS CLI

use apis_cli::cli::Args;
use clap::Parser;
use clap_verbosity_flag::LevelFilter;
use color_eyre::eyre::{eyre, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Disable location display (file paths and line numbers)
    color_eyre::config::HookBuilder::default()
        .display_location_section(false)
        .display_env_section(false)
        .install()?;

    match args.verbosity.log_level_filter() {
        LevelFilter::Off | LevelFilter::Error => {}
        _ => {
            std::env::set_var("RUST_LIB_BACKTRACE", "1");
        }
    }

    // quiet by default; -v or RUST_LOG turns it up
    apis_common::logging::init_logging(&args.verbosity, "apis=error,apis_sdk=error")
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

    Ok(args.run().await?)
}
