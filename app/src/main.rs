use clap::Parser;
use storescan_app::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    storescan_app::init_tracing();
    storescan_app::run(Cli::parse()).await
}
