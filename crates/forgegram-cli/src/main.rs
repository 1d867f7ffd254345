use anyhow::Result;
use clap::Parser;
use forgegram_cli::{init_tracing, run_bridge, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_bridge(cli).await
}
