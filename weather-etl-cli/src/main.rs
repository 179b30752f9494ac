//! Binary crate for the `weather-etl` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Loading the TOML configuration
//! - Setting up console and file logging
//! - Driving the pipeline once or on an interval

use clap::Parser;

mod cli;
mod logging;
mod settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    cmd.run().await
}
