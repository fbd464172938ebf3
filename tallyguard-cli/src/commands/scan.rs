//! Scan command - detect anomalies in a table

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use tallyguard_core::adapters::{GeminiProvider, ReplayProvider};
use tallyguard_core::config::{Config, DetectionAlgorithm};
use tallyguard_core::ports::AnomalyProvider;
use tallyguard_core::{DetectionReport, LogEvent, TallyGuardContext};

use super::{get_logger, get_tallyguard_dir, load_config, load_dataset, log_event};
use crate::output;

pub struct ScanArgs {
    pub file: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub mode: Option<String>,
    pub ai_response: Option<PathBuf>,
    pub min_confidence: f64,
    pub limit: Option<usize>,
    pub today: Option<NaiveDate>,
    pub json: bool,
}

pub fn run(args: ScanArgs) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command("scan"));

    let result = scan(&args, &logger);
    if let Err(e) = &result {
        log_event(
            &logger,
            LogEvent::new("scan_failed")
                .with_command("scan")
                .with_error(e.to_string())
                .with_error_details(format!("{:#}", e)),
        );
    }
    result
}

fn scan(args: &ScanArgs, logger: &Option<tallyguard_core::LoggingService>) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(mode) = &args.mode {
        config.detection.detection_algorithm = mode.parse::<DetectionAlgorithm>()?;
    }
    let mode = config.detection.detection_algorithm;

    let loaded = load_dataset(args.file.as_deref())?;
    let provider = if mode.uses_provider() {
        select_provider(&config, args.ai_response.as_ref())?
    } else {
        None
    };
    let provider_name = provider.as_ref().map(|p| p.name().to_string());

    let ctx = TallyGuardContext::with_config(&get_tallyguard_dir(), config, provider)?;
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let spinner = match &provider_name {
        Some(name) if !args.json => Some(spinner(&format!("Asking {} for a second opinion...", name))),
        _ => None,
    };
    let mut report = runtime.block_on(ctx.assist.detect(&loaded.dataset, today));
    if let Some(s) = spinner {
        s.finish_and_clear();
    }

    let mut event = LogEvent::new("scan_completed")
        .with_command("scan")
        .with_source(&loaded.source)
        .with_report(&report);
    if let Some(name) = &provider_name {
        event = event.with_provider(name);
        if let Some(failure) = report.warnings.iter().find(|w| w.starts_with("AI provider")) {
            log_event(
                logger,
                LogEvent::new("provider_failed")
                    .with_command("scan")
                    .with_provider(name)
                    .with_error(failure.clone()),
            );
        }
    }
    log_event(logger, event);

    let total = report.anomalies.len();
    report.anomalies.retain(|a| a.confidence >= args.min_confidence);
    if let Some(limit) = args.limit {
        report.anomalies.truncate(limit);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report, total);
    Ok(())
}

/// Pick the AI provider for a scan; a missing API key only disables AI
fn select_provider(
    config: &Config,
    ai_response: Option<&PathBuf>,
) -> Result<Option<Arc<dyn AnomalyProvider>>> {
    if let Some(path) = ai_response {
        let provider = ReplayProvider::from_file(path)
            .with_context(|| format!("Failed to load AI response {}", path.display()))?;
        return Ok(Some(Arc::new(provider)));
    }
    match GeminiProvider::from_settings(&config.detection.ai) {
        Ok(provider) => Ok(Some(Arc::new(provider))),
        Err(e) => {
            output::warning(&format!("{}", e));
            Ok(None)
        }
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_report(report: &DetectionReport, total: usize) {
    println!("{}", "Scan Results".bold());
    println!(
        "  {} rows scanned, {} anomalies ({} mode)",
        report.rows_scanned,
        total,
        report.mode.as_str()
    );
    println!();

    for warning in &report.warnings {
        output::warning(&format!("Warning: {}", warning));
    }
    if !report.warnings.is_empty() {
        println!();
    }

    if report.anomalies.is_empty() {
        if total == 0 {
            output::success("No anomalies found.");
        } else {
            output::info("No anomalies at or above the requested confidence.");
        }
    } else {
        let mut table = output::create_table();
        table.set_header(vec!["Row", "Confidence", "Errors", "Amount", "Date", "Description"]);
        for anomaly in &report.anomalies {
            table.add_row(vec![
                comfy_table::Cell::new(anomaly.row),
                output::confidence_cell(anomaly.confidence),
                comfy_table::Cell::new(anomaly.errors.join("\n")),
                comfy_table::Cell::new(anomaly.snapshot.amount.display()),
                comfy_table::Cell::new(anomaly.snapshot.date.display()),
                comfy_table::Cell::new(anomaly.snapshot.description.display()),
            ]);
        }
        println!("{}", table);
        if report.anomalies.len() < total {
            println!(
                "{}",
                format!("Showing {} of {} anomalies", report.anomalies.len(), total).dimmed()
            );
        }
    }

    if let Some(insights) = &report.insights {
        println!();
        println!("{}", "AI Insights".bold());
        println!("  {}", insights);
    }
}
