use std::process::ExitCode;

use anyhow::Context;
use bulwark_resilience::config::ResilienceConfig;

pub fn run(config: &ResilienceConfig) -> anyhow::Result<ExitCode> {
    println!("{}", render(config)?);
    Ok(ExitCode::SUCCESS)
}

fn render(config: &ResilienceConfig) -> anyhow::Result<String> {
    toml::to_string_pretty(config).context("failed to serialize configuration")
}
