use anyhow::Result;
use cd_cli::{Cli, Parser};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cd_cli::logging::init();
    cli.run().await
}
