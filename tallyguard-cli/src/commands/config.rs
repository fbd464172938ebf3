//! Config command - show and initialize settings

use anyhow::Result;
use clap::Subcommand;

use tallyguard_core::config::Config;
use tallyguard_core::LogEvent;

use super::{get_logger, get_tallyguard_dir, log_event};
use crate::output;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective detection settings
    Show,
    /// Write a settings file with every default spelled out
    Init {
        /// Overwrite an existing settings file
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Print the settings file path
    Path,
}

pub fn run(command: ConfigCommands) -> Result<()> {
    let dir = get_tallyguard_dir();
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command("config"));

    match command {
        ConfigCommands::Show => {
            let config = Config::load(&dir)?;
            println!("{}", serde_json::to_string_pretty(&config.detection)?);
        }
        ConfigCommands::Init { force } => {
            let path = Config::settings_path(&dir);
            if path.exists() && !force {
                output::warning(&format!(
                    "{} already exists. Use --force to overwrite it.",
                    path.display()
                ));
                return Ok(());
            }
            // Keeps keys the CLI does not manage when overwriting
            let mut config = Config::load(&dir).unwrap_or_default();
            config.detection = Default::default();
            config.save(&dir)?;
            output::success(&format!("Wrote {}", path.display()));
        }
        ConfigCommands::Path => {
            println!("{}", Config::settings_path(&dir).display());
        }
    }

    Ok(())
}
