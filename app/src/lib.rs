//! storescan command-line shell
//!
//! Parses arguments, wires the browser, storage and HTTP capabilities into the
//! scanner and writes the report. Scanning logic lives in the `crates/` directory.

pub mod cli;
pub mod commands;
pub mod report;
pub mod state;
pub mod work_list;

use anyhow::Context;
use cli::{Cli, Commands, ConfigAction, TokenAction};
use state::AppState;
use tracing::info;

/// Initialize tracing subscriber for logging.
///
/// Logs go to stderr so progress lines on stdout stay clean.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,storescan=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Execute one parsed invocation.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    info!("Starting storescan v{}", env!("CARGO_PKG_VERSION"));
    let state = AppState::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Scan(args) => {
            let results = commands::scan::run(&state, &args).await?;
            let failed = results.iter().filter(|r| !r.success).count();
            if failed > 0 {
                tracing::warn!("{} of {} items failed", failed, results.len());
            }
        }
        Commands::Token { action } => {
            let storage = state.open_storage().await?;
            match action {
                TokenAction::Show => match commands::token::status(&storage, &state.config).await? {
                    Some(status) => println!("{status}"),
                    None => println!("No cached token"),
                },
                TokenAction::Clear => {
                    commands::token::clear(&storage).await?;
                    println!("Token cache cleared");
                }
                TokenAction::Fallback { setting } => {
                    commands::token::set_fallback(&storage, setting).await?;
                    println!("Fallback token override: {setting:?}");
                }
            }
            storage.close().await;
        }
        Commands::Config { action } => match action {
            ConfigAction::Path => println!("{}", commands::config::path(&state)),
            ConfigAction::Show => print!("{}", commands::config::show(&state)?),
        },
    }

    Ok(())
}
