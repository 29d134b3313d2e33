//! Reportline CLI - pharmacy daily reports in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;
mod output;

use commands::{departments, doctor, ingest, logs, query, report, status, tenant};

/// Reportline - reconcile, roll up and query pharmacy daily reports
#[derive(Parser)]
#[command(name = "rl", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tenants (pharmacies)
    Tenant {
        #[command(subcommand)]
        command: tenant::TenantCommands,
    },

    /// Ingest extraction batches from a JSON file or directory
    Ingest {
        /// JSON file, or directory of *.json files
        path: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the reconciled record for one day
    Daily {
        tenant: String,
        /// Report date (YYYY-MM-DD)
        date: String,
        #[arg(long)]
        json: bool,
    },

    /// Show the product lines for one day
    Lines {
        tenant: String,
        /// Report date (YYYY-MM-DD)
        date: String,
        #[arg(long)]
        json: bool,
    },

    /// Show a monthly rollup
    Month {
        tenant: String,
        /// Month (YYYY-MM) or any date inside it
        month: String,
        #[arg(long)]
        json: bool,
    },

    /// Show a yearly rollup
    Year {
        tenant: String,
        /// Year (YYYY) or any date inside it
        year: String,
        #[arg(long)]
        json: bool,
    },

    /// Recompute every rollup for a tenant
    Refresh {
        tenant: String,
        #[arg(long)]
        json: bool,
    },

    /// Day, month-to-date and year-to-date KPIs
    Kpis {
        tenant: String,
        /// Day to report on (defaults to the latest report)
        #[arg(long)]
        as_of: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Aggregate metrics over a date range
    Range {
        tenant: String,
        from: String,
        to: String,
        #[arg(long)]
        json: bool,
    },

    /// One metric per day over a date range
    Series {
        tenant: String,
        /// Metric name, e.g. turnover or gp_percent
        metric: String,
        from: String,
        to: String,
        #[arg(long)]
        json: bool,
    },

    /// Best-selling products (or departments) over a date range
    BestSellers {
        tenant: String,
        from: String,
        to: String,
        /// Number of rows (defaults to queries.defaultLimit)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Ranking
        #[arg(long, value_enum, default_value = "quantity")]
        by: query::RankBy,
        #[arg(long)]
        json: bool,
    },

    /// Products selling at or under a gross-profit threshold
    LowMargin {
        tenant: String,
        from: String,
        to: String,
        /// Gross-profit percent threshold (defaults to queries.lowMarginThreshold)
        #[arg(short, long)]
        threshold: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
        /// Department codes or prefixes to leave out
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
        #[arg(long)]
        json: bool,
    },

    /// Department reference data
    Departments {
        #[command(subcommand)]
        command: departments::DepartmentCommands,
    },

    /// Show store status and summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run database health checks
    Doctor {
        /// Show verbose output
        #[arg(long, short)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", format!("{:#}", e).red());
            if let Some(core) = e.downcast_ref::<reportline_core::Error>() {
                if core.is_transient() {
                    eprintln!("{}", "This is a transient conflict; retrying is safe.".dimmed());
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Tenant { command } => tenant::run(command),
        Commands::Ingest { path, json } => ingest::run(&path, json),
        Commands::Daily { tenant, date, json } => report::daily(&tenant, &date, json),
        Commands::Lines { tenant, date, json } => report::lines(&tenant, &date, json),
        Commands::Month { tenant, month, json } => report::month(&tenant, &month, json),
        Commands::Year { tenant, year, json } => report::year(&tenant, &year, json),
        Commands::Refresh { tenant, json } => report::refresh(&tenant, json),
        Commands::Kpis { tenant, as_of, json } => report::kpis(&tenant, as_of.as_deref(), json),
        Commands::Range { tenant, from, to, json } => report::range(&tenant, &from, &to, json),
        Commands::Series { tenant, metric, from, to, json } => {
            report::series(&tenant, &metric, &from, &to, json)
        }
        Commands::BestSellers { tenant, from, to, limit, by, json } => {
            query::best_sellers(&tenant, &from, &to, limit, by, json)
        }
        Commands::LowMargin { tenant, from, to, threshold, limit, exclude, json } => {
            query::low_margin(&tenant, &from, &to, threshold.as_deref(), limit, exclude, json)
        }
        Commands::Departments { command } => departments::run(command),
        Commands::Status { json } => status::run(json),
        Commands::Doctor { verbose, json } => doctor::run(verbose, json),
        Commands::Logs { command } => logs::run(command),
    }
}
