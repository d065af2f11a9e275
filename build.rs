//! Build script rendering the `iotwire` man page from the CLI definition.
//!
//! The page lands in `target/generated-man` unless `IOTWIRE_MAN_DIR` names
//! another directory.

use std::{env, fs, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed=IOTWIRE_MAN_DIR");

    let out_dir = env::var_os("IOTWIRE_MAN_DIR")
        .map_or_else(|| PathBuf::from("target/generated-man"), PathBuf::from);
    fs::create_dir_all(&out_dir)?;

    let mut page = Vec::new();
    Man::new(cli::Cli::command()).render(&mut page)?;
    fs::write(out_dir.join("iotwire.1"), page)?;
    Ok(())
}
