//! Granary key tool
//!
//! Mints and inspects the key files used by the granary services: private
//! signing keys for daemons and build machines, and the public halves that
//! get dropped into trust-store directories.

mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};

#[derive(Parser)]
#[command(name = "granary-keys")]
#[command(about = "Granary key file management", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    handle_command(cli.command)
}
