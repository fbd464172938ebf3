//! TallyGuard Core - Anomaly detection for tabular transaction data
//!
//! This crate implements the detection engine following hexagonal architecture:
//!
//! - **domain**: Core entities (Dataset, Anomaly, transaction-type rules)
//! - **ports**: Trait definitions for external collaborators (DatasetSource, AnomalyProvider)
//! - **services**: Detectors, merging, scoring, output contract and orchestration
//! - **adapters**: Concrete implementations (CSV, JSON, Gemini, replay)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use config::Config;
use ports::AnomalyProvider;
use services::{AssistService, DetectionService};

// Re-export commonly used types at crate root
pub use domain::result::{ContractViolation, Error, ViolationKind};
pub use domain::{Anomaly, AnomalyRecord, Cell, Dataset, Reason, ReasonKind, Snapshot};
pub use services::logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use services::DetectionReport;

/// Main context for TallyGuard operations
///
/// Holds the loaded configuration and the detection services built from
/// it. The AI provider is optional; without one, AI and hybrid scans fall
/// back to rule-based detection with a warning.
pub struct TallyGuardContext {
    pub dir: PathBuf,
    pub config: Config,
    pub assist: AssistService,
}

impl TallyGuardContext {
    /// Load `settings.json` from a TallyGuard directory
    pub fn new(tallyguard_dir: &Path, provider: Option<Arc<dyn AnomalyProvider>>) -> Result<Self> {
        let config = Config::load(tallyguard_dir)?;
        Self::with_config(tallyguard_dir, config, provider)
    }

    /// Build from an already loaded configuration
    pub fn with_config(
        tallyguard_dir: &Path,
        config: Config,
        provider: Option<Arc<dyn AnomalyProvider>>,
    ) -> Result<Self> {
        let detection = DetectionService::new(config.detection.clone())?;
        Ok(Self {
            dir: tallyguard_dir.to_path_buf(),
            config,
            assist: AssistService::new(detection, provider),
        })
    }

    pub fn detection(&self) -> &DetectionService {
        self.assist.detection()
    }
}
