//! Repair command - validate an anomaly list and self-heal it

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use tallyguard_core::services::contract;
use tallyguard_core::LogEvent;

use super::{get_logger, log_event};
use crate::output;

pub fn run(file: &Path, json: bool) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command("repair"));

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let enforced = contract::enforce(&value);
    let input_len = value.as_array().map(Vec::len).unwrap_or(0);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&contract::to_value(&enforced.records))?
        );
        return Ok(());
    }

    match &enforced.violation {
        None => output::success(&format!(
            "{} anomalies, all well-formed.",
            enforced.records.len()
        )),
        Some(violation) => {
            output::warning(&format!("Contract violation: {}", violation));
            println!(
                "Repaired: kept {} of {} entries",
                enforced.records.len(),
                input_len
            );
        }
    }

    if enforced.records.is_empty() {
        return Ok(());
    }

    println!();
    let mut table = output::create_table();
    table.set_header(vec!["Row", "Confidence", "Errors"]);
    for record in &enforced.records {
        table.add_row(vec![
            comfy_table::Cell::new(record.row),
            output::confidence_cell(record.confidence),
            comfy_table::Cell::new(record.errors.join("\n")),
        ]);
    }
    println!("{}", table);
    println!(
        "{}",
        "Use --json to print the repaired list.".dimmed()
    );
    Ok(())
}
