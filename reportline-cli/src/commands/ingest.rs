//! Ingest command - reconcile extraction files into the store

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reportline_core::adapters::json_source::JsonFileSource;
use reportline_core::domain::Source;
use reportline_core::services::{IngestFailure, IngestReport, LogEvent, MergeStatus};
use serde_json::json;

use super::{get_context, get_logger, log_event};
use crate::output;

pub fn run(path: &Path, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let logger = get_logger();

    let source = JsonFileSource::new(path);
    let files = source.files()?;

    let progress = if files.len() > 1 && !json && atty::is(atty::Stream::Stderr) {
        let bar = ProgressBar::new(files.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Some(bar)
    } else {
        None
    };

    let mut report = IngestReport::default();
    let mut unreadable: Vec<(String, String)> = Vec::new();

    for file in &files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if let Some(bar) = &progress {
            bar.set_message(name.clone());
        }

        match JsonFileSource::read_file(file) {
            Ok(batches) => {
                let offset = report.outcomes.len() + report.failures.len();
                let file_report = ctx.ingest_service.ingest_all(&batches, &ctx.stats);
                report.outcomes.extend(file_report.outcomes);
                report.failures.extend(file_report.failures.into_iter().map(|f| IngestFailure {
                    index: f.index + offset,
                    ..f
                }));
            }
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "skipping unreadable file");
                log_event(
                    &logger,
                    LogEvent::new("ingest_file_rejected")
                        .with_command("ingest")
                        .with_core_error(&e),
                );
                unreadable.push((name, e.to_string()));
            }
        }

        if let Some(bar) = &progress {
            bar.inc(1);
        }
    }
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    let counts = ctx.stats.snapshot();
    log_event(
        &logger,
        LogEvent::new("ingest_completed")
            .with_command("ingest")
            .with_count(counts.received),
    );
    for failure in &report.failures {
        let mut event = LogEvent::new("batch_rejected")
            .with_command("ingest")
            .with_error_kind(failure.kind)
            .with_error(&failure.message);
        if !failure.tenant.is_empty() {
            event = event.with_tenant(&failure.tenant);
        }
        log_event(&logger, event);
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "files": files.len(),
                "counts": counts,
                "outcomes": report.outcomes,
                "failures": report.failures,
                "unreadable_files": unreadable
                    .iter()
                    .map(|(file, error)| json!({"file": file, "error": error}))
                    .collect::<Vec<_>>(),
                "rollups_pending": ctx.pending.len(),
            }))?
        );
        return Ok(());
    }

    if !report.outcomes.is_empty() {
        let mut table = output::create_table();
        table.set_header(vec!["Tenant", "Date", "Result", "Winner", "Lines", "Dropped"]);
        for outcome in &report.outcomes {
            let status = match outcome.status {
                MergeStatus::Inserted => "inserted".green().to_string(),
                MergeStatus::Updated => "updated".cyan().to_string(),
                MergeStatus::Unchanged => "unchanged".dimmed().to_string(),
            };
            let winner = match outcome.winner {
                Source::Incoming => "incoming",
                Source::Stored => "stored",
            };
            let lines = if outcome.lines_replaced {
                outcome.line_count.to_string()
            } else {
                "kept".to_string()
            };
            let dropped = outcome.dropped_fields.len() + outcome.dropped_lines;
            table.add_row(vec![
                outcome.tenant.clone(),
                outcome.date.to_string(),
                status,
                winner.to_string(),
                lines,
                if dropped > 0 { dropped.to_string().yellow().to_string() } else { String::new() },
            ]);
        }
        println!("{}", table);
    }

    println!(
        "{} batch(es): {} inserted, {} updated, {} unchanged, {} failed",
        counts.received,
        counts.inserted.to_string().green(),
        counts.updated.to_string().cyan(),
        counts.unchanged,
        counts.failed.to_string().red(),
    );
    if counts.dropped_fields > 0 || counts.dropped_lines > 0 {
        output::warning(&format!(
            "{} malformed field(s) and {} product line(s) were dropped (details logged above)",
            counts.dropped_fields, counts.dropped_lines
        ));
    }

    for failure in &report.failures {
        let hint = if failure.transient { " (retry is safe)" } else { "" };
        eprintln!(
            "  {} batch #{} [{}]: {}{}",
            "x".red(),
            failure.index,
            failure.kind,
            failure.message,
            hint.dimmed()
        );
    }
    for (file, error) in &unreadable {
        eprintln!("  {} {}: {}", "x".red(), file, error);
    }
    if !ctx.pending.is_empty() {
        output::warning(&format!(
            "{} rollup period(s) could not be refreshed; run `rl refresh <tenant>`",
            ctx.pending.len()
        ));
    }

    if !report.failures.is_empty() || !unreadable.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}
