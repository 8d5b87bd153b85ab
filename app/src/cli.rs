//! Command-line surface.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "storescan")]
#[command(version, about = "Scan catalog items at each store location")]
pub struct Cli {
    /// Config file to use instead of ~/.config/storescan/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan every item of a work list at each of its locations
    Scan(ScanArgs),

    /// Inspect or reset the cached session token
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Show where the configuration lives and what is in effect
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// TOML work list with `[locations]` and `[[tasks]]`
    #[arg(long)]
    pub work_list: PathBuf,

    /// Where to write the JSON report
    #[arg(long, default_value = "results.json")]
    pub output: PathBuf,

    /// Number of concurrent agents (overrides scanning.agents)
    #[arg(long)]
    pub agents: Option<usize>,

    /// Allow the configured static token when every other source fails
    #[arg(long)]
    pub use_fallback_token: bool,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TokenAction {
    /// Print the cached token and its age
    Show,
    /// Delete the cached token
    Clear,
    /// Persist whether the static fallback token may be used
    Fallback {
        #[arg(value_enum)]
        setting: FallbackSetting,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackSetting {
    On,
    Off,
    /// Remove the stored override and follow the config file
    Default,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the config file path
    Path,
    /// Print the effective configuration as TOML
    Show,
}
