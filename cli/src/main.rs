//! `bulwark` command-line entry point.
//!
//! ## Commands
//!
//! - `bulwark config` - print the effective configuration as TOML
//! - `bulwark retry` - run a simulated flaky operation through a retry policy
//! - `bulwark alert` - trigger alerts and print the manager summary as JSON

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use bulwark_resilience::config::{ConfigLoader, ResilienceConfig};
use clap::{Parser, Subcommand};

mod alert_cmd;
mod config_cmd;
mod retry_cmd;

/// Retry, circuit breaking and alerting for unreliable dependencies
#[derive(Debug, Parser)]
#[command(name = "bulwark", version)]
struct Cli {
    /// Config file (default: ./bulwark.toml, then XDG config, then ~/.bulwark.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the effective configuration as TOML
    Config,

    /// Run a simulated flaky operation through the async retry executor
    Retry(retry_cmd::RetryArgs),

    /// Trigger alerts and print the resulting summary as JSON
    Alert(alert_cmd::AlertArgs),
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ResilienceConfig> {
    let loaded = match path {
        Some(path) => ConfigLoader::new().with_file(path).load(),
        None => ConfigLoader::load_default(),
    };
    loaded.context("failed to load configuration")
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    bulwark_telemetry::init_tracing(&config.logging)?;

    match cli.command {
        Command::Config => config_cmd::run(&config),
        Command::Retry(args) => retry_cmd::run(&config, args).await,
        Command::Alert(args) => alert_cmd::run(&config, args).await,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_config_flag_parses_after_subcommand() {
        let cli = Cli::try_parse_from(["bulwark", "config", "--config", "/tmp/b.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/b.toml")));
        assert!(matches!(cli.command, Command::Config));
    }
}
