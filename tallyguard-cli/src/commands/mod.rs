//! CLI command implementations

pub mod config;
pub mod logs;
pub mod repair;
pub mod rules;
pub mod scan;
pub mod stats;

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tallyguard_core::adapters::csv::read_csv;
use tallyguard_core::adapters::{CsvSource, JsonSource};
use tallyguard_core::config::Config;
use tallyguard_core::ports::DatasetSource;
use tallyguard_core::{Dataset, EntryPoint, LogEvent, LoggingService};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    LoggingService::new(&get_tallyguard_dir(), EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the TallyGuard directory from environment or default
pub fn get_tallyguard_dir() -> PathBuf {
    Config::default_dir()
}

/// Load settings from an explicit file or from the TallyGuard directory
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => Config::load_file(path),
        None => Config::load(&get_tallyguard_dir()),
    }
}

/// A loaded table and the kind of source it came from
pub struct LoadedDataset {
    pub dataset: Dataset,
    pub source: String,
}

/// Load a table from a file, or CSV from piped stdin
pub fn load_dataset(file: Option<&Path>) -> Result<LoadedDataset> {
    if let Some(path) = file {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let source: Box<dyn DatasetSource> = if is_json {
            Box::new(JsonSource::new(path))
        } else {
            Box::new(CsvSource::new(path))
        };
        let dataset = source
            .load()
            .with_context(|| format!("Failed to load {}", path.display()))?;
        return Ok(LoadedDataset {
            dataset,
            source: source.name().to_string(),
        });
    }

    if atty::isnt(atty::Stream::Stdin) {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read CSV from stdin")?;
        let dataset = read_csv(buffer.as_bytes(), b',').context("Failed to parse CSV from stdin")?;
        return Ok(LoadedDataset {
            dataset,
            source: "stdin".to_string(),
        });
    }

    anyhow::bail!("No input given. Pass a CSV or JSON file, or pipe CSV into stdin.")
}
