use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::config_file::Config;

#[derive(Debug, Parser)]
pub struct Opts {
    /// Where to write the config file
    #[clap(default_value = "./sentinel.json")]
    path: PathBuf,

    /// Overwrite an existing file
    #[clap(long)]
    force: bool,
}

pub async fn run(opts: &Opts) -> Result<()> {
    if opts.path.exists() && !opts.force {
        bail!("{} already exists, pass --force to overwrite it", opts.path.display());
    }
    Config::template().write(&opts.path)?;
    println!("Wrote default config to {}", opts.path.display());
    Ok(())
}
