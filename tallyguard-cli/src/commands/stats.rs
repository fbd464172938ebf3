//! Stats command - amount statistics and anomaly counts for a table

use std::path::PathBuf;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use colored::Colorize;

use tallyguard_core::services::summary::{summarize, DatasetSummary, GroupTotal};
use tallyguard_core::{LogEvent, TallyGuardContext};

use super::{get_logger, get_tallyguard_dir, load_config, load_dataset, log_event};
use crate::output;

pub fn run(
    file: Option<PathBuf>,
    config: Option<PathBuf>,
    today: Option<NaiveDate>,
    json: bool,
) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command("stats"));

    let config = load_config(config.as_deref())?;
    let loaded = load_dataset(file.as_deref())?;
    let ctx = TallyGuardContext::with_config(&get_tallyguard_dir(), config, None)?;
    let today = today.unwrap_or_else(|| Local::now().date_naive());

    let report = ctx.detection().detect_on(&loaded.dataset, today);
    let summary = summarize(&ctx.detection().context(&loaded.dataset, today))
        .with_anomalies(&report.anomalies);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &DatasetSummary) {
    println!("{}", "Dataset Statistics".bold());
    println!();

    let mut table = output::create_table();
    table.add_row(vec!["Rows".to_string(), summary.rows.to_string()]);
    match &summary.amounts {
        Some(stats) => {
            table.add_row(vec!["Amounts".to_string(), stats.count.to_string()]);
            table.add_row(vec!["Total".to_string(), output::format_amount(stats.total)]);
            table.add_row(vec!["Mean".to_string(), output::format_amount(stats.mean)]);
            table.add_row(vec!["Std dev".to_string(), output::format_amount(stats.std_dev)]);
            table.add_row(vec!["Min".to_string(), output::format_amount(stats.min)]);
            table.add_row(vec!["Q1".to_string(), output::format_amount(stats.q1)]);
            table.add_row(vec!["Median".to_string(), output::format_amount(stats.median)]);
            table.add_row(vec!["Q3".to_string(), output::format_amount(stats.q3)]);
            table.add_row(vec!["Max".to_string(), output::format_amount(stats.max)]);
        }
        None => {
            table.add_row(vec!["Amounts".to_string(), "none parsed".to_string()]);
        }
    }
    println!("{}", table);

    print_groups("By Category", &summary.by_category);
    print_groups("By Month", &summary.by_month);

    if let Some(bands) = &summary.anomalies {
        println!();
        println!("{}", "Anomalies".bold());
        println!("  High confidence:   {}", bands.high.to_string().red());
        println!("  Medium confidence: {}", bands.medium.to_string().yellow());
        println!("  Low confidence:    {}", bands.low);
        println!("  Flagged rows:      {:.1}%", bands.flagged_share * 100.0);
    }
}

fn print_groups(title: &str, groups: &[GroupTotal]) {
    if groups.is_empty() {
        return;
    }
    println!();
    println!("{}", title.bold());
    let mut table = output::create_table();
    table.set_header(vec!["Key", "Count", "Total"]);
    for group in groups {
        table.add_row(vec![
            group.key.clone(),
            group.count.to_string(),
            output::format_amount(group.total),
        ]);
    }
    println!("{}", table);
}
