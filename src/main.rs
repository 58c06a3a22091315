use anyhow::Context;
use clap::Parser;
use wildweather_ingest::cli::{init_logging, run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_deref()).context("failed to set up logging")?;
    run(cli).await.context("wildweather command failed")
}
