//! crewdeck CLI library

pub mod config;
pub mod crews;
pub mod logging;
pub mod server;
pub mod watch;

// Re-export CLI types for testing
pub use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "crewdeck")]
#[command(about = "Watch and drive crews on a crew backend")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub server: server::ServerArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List crews, optionally filtered and sorted
    List(crews::ListArgs),
    /// Follow live crew events
    Watch(watch::WatchArgs),
    /// Start a crew
    Start(crews::StartArgs),
    /// Stop a running crew
    Stop(crews::StopArgs),
    /// Inspect and edit crew configuration with local drafts
    Config {
        #[command(subcommand)]
        subcommand: config::ConfigCommands,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Commands::List(args) => args.run(&self.server).await,
            Commands::Watch(args) => args.run(&self.server).await,
            Commands::Start(args) => args.run(&self.server).await,
            Commands::Stop(args) => args.run(&self.server).await,
            Commands::Config { subcommand } => subcommand.run(&self.server).await,
        }
    }
}
