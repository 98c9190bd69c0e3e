//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "traintastic-server", author, version, about = "Traintastic model-railway control server", long_about = None)]
pub struct Cli {
    /// Data directory (settings, worlds)
    #[arg(long)]
    pub datadir: Option<PathBuf>,

    /// Run with a tray icon where the host supports one
    #[arg(long)]
    pub tray: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
