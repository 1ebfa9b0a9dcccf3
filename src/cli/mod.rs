pub mod init;
pub mod serve;
pub mod sign;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "webhook-events")]
#[command(version)]
#[command(about = "Signed webhook delivery with retries and dead-lettering", long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value = "webhooks.toml", env = "WEBHOOK_EVENTS_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        #[arg(default_value = "webhooks.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Run the dispatcher, health monitor and management API
    Serve {
        #[arg(short = 'H', long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the signature header value for a payload (stdin when no file)
    Sign {
        #[arg(long)]
        secret: String,
        file: Option<PathBuf>,
    },
    /// Check a payload against a received signature
    Verify {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        signature: String,
        file: Option<PathBuf>,
    },
}
