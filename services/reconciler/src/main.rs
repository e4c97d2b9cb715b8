//! Reconciler CLI - Loads the supplied report files and prints the merged agents
//!
//! stdout (or --out) carries only the JSON report; logs go to stderr.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use clap::Parser;
use serde::Serialize;
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reconciler::loader::load_path;
use reconciler::scoring::{summarize_teams, TeamSummary, DEFAULT_THRESHOLD};
use reconciler::{
    reconcile, AgentRecord, Coverage, Diagnostic, Settings, SourceKind, SourceSet, TabularInput,
};

#[derive(Parser, Debug)]
#[command(name = "reconciler", about = "Merges agent performance reports into one record per agent")]
struct Args {
    /// Class consumption report (.xlsx/.xls/.csv)
    #[arg(long)]
    class_consumption: Option<PathBuf>,

    /// Upgrade rate report
    #[arg(long)]
    upgrade_rate: Option<PathBuf>,

    /// Referral report
    #[arg(long)]
    referral: Option<PathBuf>,

    /// Fixed rate report (per student or per agent)
    #[arg(long)]
    fixed_rate: Option<PathBuf>,

    /// All leads report
    #[arg(long)]
    all_leads: Option<PathBuf>,

    /// Write the report here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,

    /// Processing time, "YYYY-MM-DD HH:MM:SS" (defaults to local now)
    #[arg(long, value_parser = parse_now)]
    now: Option<NaiveDateTime>,

    /// Include pipeline diagnostics in the report
    #[arg(long, default_value = "false")]
    diagnostics: bool,

    /// Include per-team score summaries
    #[arg(long, default_value = "false")]
    summary: bool,

    /// Score below which an agent counts as underperforming
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,
}

impl Args {
    fn paths(&self) -> Vec<(SourceKind, &PathBuf)> {
        [
            (SourceKind::ClassConsumption, self.class_consumption.as_ref()),
            (SourceKind::UpgradeRate, self.upgrade_rate.as_ref()),
            (SourceKind::Referral, self.referral.as_ref()),
            (SourceKind::FixedRate, self.fixed_rate.as_ref()),
            (SourceKind::AllLeads, self.all_leads.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, path)| path.map(|p| (kind, p)))
        .collect()
    }
}

fn parse_now(raw: &str) -> std::result::Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|e| format!("invalid timestamp '{}': {}", raw, e))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    success: bool,
    agents: BTreeMap<String, AgentRecord>,
    total_agents: usize,
    processed_files: Vec<SourceKind>,
    fingerprints: BTreeMap<SourceKind, String>,
    coverage: Coverage,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<Vec<Diagnostic>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    teams: Option<Vec<TeamSummary>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = Settings::from_env().context("Invalid configuration")?;
    let now = args.now.unwrap_or_else(|| Local::now().naive_local());

    let mut inputs = SourceSet::new();
    let mut fingerprints = BTreeMap::new();
    for (kind, path) in args.paths() {
        match load_path(path, settings.csv_fallback_encoding).await {
            Ok(loaded) => {
                info!(source = %kind, path = %path.display(), rows = loaded.grid.row_count(), "Loaded");
                fingerprints.insert(kind, loaded.fingerprint);
                inputs.insert(kind, loaded.grid);
            }
            Err(e) => {
                warn!(source = %kind, error = %format!("{:#}", e), "Unreadable input");
                inputs.insert(
                    kind,
                    TabularInput::Unreadable {
                        reason: format!("{:#}", e),
                    },
                );
            }
        }
    }

    let result = reconcile(&inputs, &settings.options(now))?;
    info!(
        agents = result.agents.len(),
        sources = result.processed.len(),
        "Reconciled"
    );

    let teams = args
        .summary
        .then(|| summarize_teams(&result.agents, args.threshold));
    let report = Report {
        success: true,
        total_agents: result.agents.len(),
        agents: result.agents,
        processed_files: result.processed,
        fingerprints,
        coverage: result.coverage,
        diagnostics: args.diagnostics.then_some(result.diagnostics),
        teams,
    };

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    match &args.out {
        Some(path) => {
            fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{}", json),
    }

    Ok(())
}
