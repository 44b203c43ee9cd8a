use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "route-tiles",
    version,
    about = "Offline route tile storage planning and packaging CLI"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (error|warn|info|debug|trace)
    #[arg(long, default_value = "info")]
    pub log: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Estimate the storage footprint of a route before downloading.
    Estimate(EstimateArgs),
    /// Print the budget-allocated zoom plan for a route.
    Plan(PlanArgs),
    /// Package pre-fetched corridor tiles into an offline store.
    Download(DownloadArgs),
    /// Print deduplication and compression statistics for a store.
    Stats(StatsArgs),
}

#[derive(Debug, Args)]
pub struct EstimateArgs {
    /// Route JSON (points plus classified segments).
    pub route: PathBuf,

    #[arg(long, default_value_t = 100)]
    pub budget_mb: u64,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub output: ReportFormat,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    pub route: PathBuf,

    #[arg(long, default_value_t = 100)]
    pub budget_mb: u64,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub output: ReportFormat,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    pub route: PathBuf,

    /// Output SQLite store.
    pub store: PathBuf,

    /// Directory of pre-fetched tiles laid out as z/x/y.pbf.
    #[arg(long)]
    pub tiles_dir: PathBuf,

    #[arg(long, default_value_t = 100)]
    pub budget_mb: u64,

    /// Corridor buffer around the route, in meters.
    #[arg(long, default_value_t = 1_000)]
    pub buffer_m: u64,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    pub store: PathBuf,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub output: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
}
