mod cmds;
mod config_file;
mod logging;
mod notifier;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(version)]
#[command(about = "Watch validator uptime and RPC node health on a CometBFT network", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the validator and node health monitors until interrupted")]
    Run(cmds::run::Opts),

    #[command(about = "Poll every configured node endpoint once and print the result")]
    Poll(cmds::poll::Opts),

    #[clap(name = "init-config")]
    #[command(about = "Write a default config file")]
    InitConfig(cmds::init_config::Opts),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Run(opts) => cmds::run::run(opts).await?,
        Commands::Poll(opts) => cmds::poll::run(opts).await?,
        Commands::InitConfig(opts) => cmds::init_config::run(opts).await?,
    }

    Ok(())
}
