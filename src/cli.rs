//! Command line interface for the `iotwire` binary.
//!
//! Sends one message to a device and, for requests, prints the reply. The
//! same definition feeds man page generation in the build script.

use std::path::PathBuf;

use clap::Parser;

/// Command line arguments for the `iotwire` binary.
#[derive(Debug, Parser)]
#[command(name = "iotwire", version, about = "Send one iotwire message to a device")]
pub struct Cli {
    /// Device address, for example `192.168.1.20:8080`.
    #[arg(short, long)]
    pub connect: String,
    /// Path the message is addressed to.
    #[arg(short, long, default_value = "/")]
    pub path: String,
    /// Message body.
    #[arg(short, long)]
    pub body: Option<String>,
    /// Header as `key=value`. May be repeated.
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,
    /// Send a REQUEST and wait for its RESPONSE instead of a SIGNAL.
    #[arg(short, long)]
    pub request: bool,
    /// TOML file with protocol settings.
    #[arg(long)]
    pub config: Option<PathBuf>,
}
