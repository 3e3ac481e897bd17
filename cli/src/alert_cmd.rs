use std::process::ExitCode;

use bulwark_resilience::alerts::{
    AlertCategory, AlertManager, AlertSeverity, AlertSummary, Metadata,
};
use bulwark_resilience::config::ResilienceConfig;
use clap::Parser;
use serde::Serialize;

#[derive(Debug, Parser)]
pub struct AlertArgs {
    /// Alert category (authentication, api_outage, workflow_failure, ...)
    #[arg(long)]
    pub category: AlertCategory,

    #[arg(long)]
    pub title: String,

    /// Description (default: the title)
    #[arg(long)]
    pub description: Option<String>,

    /// Number of occurrences to report
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub times: u32,

    /// Severity for a newly created alert (default: the rule's severity)
    #[arg(long)]
    pub severity: Option<AlertSeverity>,
}

#[derive(Debug, Serialize)]
struct Occurrence {
    occurrence: u32,
    /// Set when this occurrence fired the alert.
    alert_id: Option<String>,
    count: Option<u64>,
}

#[derive(Debug, Serialize)]
struct Report {
    occurrences: Vec<Occurrence>,
    summary: AlertSummary,
}

fn simulate(manager: &AlertManager, args: &AlertArgs) -> Report {
    let description = args.description.as_deref().unwrap_or(&args.title);
    let occurrences = (1..=args.times)
        .map(|occurrence| {
            let fired = manager.trigger_alert(
                args.category,
                &args.title,
                description,
                Metadata::from([("occurrence".to_string(), occurrence.into())]),
                args.severity,
            );
            Occurrence {
                occurrence,
                alert_id: fired.as_ref().map(|alert| alert.id.clone()),
                count: fired.map(|alert| alert.count),
            }
        })
        .collect();
    Report {
        occurrences,
        summary: manager.summary(),
    }
}

pub async fn run(config: &ResilienceConfig, args: AlertArgs) -> anyhow::Result<ExitCode> {
    let manager = AlertManager::new(config.alert_rules()?);
    let report = simulate(&manager, &args);
    manager.flush_notifications().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}
