//! Configuration management
//!
//! Settings live in `settings.json` inside the TallyGuard directory:
//! ```json
//! {
//!   "detection": { "mandatoryFields": ["date", "amount"], "outliers": { "method": "iqr" }, ... },
//!   "ui": { ... }
//! }
//! ```
//! Every detection key is optional; missing keys fall back to defaults, so
//! a user file only needs to list what it overrides. Keys the CLI does not
//! manage are preserved on save.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::result::Error as DomainError;
use crate::domain::rule::EXPENSE_CATEGORIES;

/// Environment variable pointing at the TallyGuard directory
pub const TALLYGUARD_DIR_ENV: &str = "TALLYGUARD_DIR";

/// Environment variable overriding `detection.detectionAlgorithm`
pub const DETECTION_ALGORITHM_ENV: &str = "TALLYGUARD_DETECTION_ALGORITHM";

/// Default `yyyy-mm-dd` pattern
pub const YMD_PATTERN: &str = r"^(?P<year>\d{4})-(?P<month>\d{1,2})-(?P<day>\d{1,2})$";

/// Default `mm/dd/yyyy` pattern
pub const MDY_PATTERN: &str = r"^(?P<month>\d{1,2})/(?P<day>\d{1,2})/(?P<year>\d{4})$";

/// Default email format
pub const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    detection: DetectionConfig,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// TallyGuard configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub detection: DetectionConfig,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Config {
    /// Resolve the TallyGuard directory from `TALLYGUARD_DIR` or `~/.tallyguard`
    pub fn default_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(TALLYGUARD_DIR_ENV) {
            PathBuf::from(dir)
        } else {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".tallyguard")
        }
    }

    /// Path of the settings file inside a TallyGuard directory
    pub fn settings_path(dir: &Path) -> PathBuf {
        dir.join("settings.json")
    }

    /// Load config from a TallyGuard directory
    ///
    /// A missing file yields defaults. A file that exists but does not parse
    /// is an error: silently scanning with defaults would hide the mistake.
    pub fn load(dir: &Path) -> Result<Self> {
        Self::load_file(&Self::settings_path(dir))
    }

    /// Load config from an explicit settings file
    pub fn load_file(settings_path: &Path) -> Result<Self> {
        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(settings_path)
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings file {}", settings_path.display()))?
        } else {
            SettingsFile::default()
        };

        let mut detection = raw.detection.clone();

        // Env override for the detection mode (for CI/testing)
        if let Ok(value) = std::env::var(DETECTION_ALGORITHM_ENV) {
            detection.detection_algorithm = value.parse::<DetectionAlgorithm>()?;
        }

        detection.validate()?;

        Ok(Self {
            detection,
            _raw_settings: raw,
        })
    }

    /// Save config to a TallyGuard directory, preserving unmanaged keys
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let settings_path = Self::settings_path(dir);

        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content).unwrap_or_default()
        } else {
            self._raw_settings.clone()
        };

        settings.detection = self.detection.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, format!("{content}\n"))?;
        Ok(())
    }
}

/// Detection mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionAlgorithm {
    /// Rule-based detectors only
    #[default]
    Standard,
    /// External AI provider only
    Ai,
    /// Both, merged
    Hybrid,
}

impl DetectionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionAlgorithm::Standard => "standard",
            DetectionAlgorithm::Ai => "ai",
            DetectionAlgorithm::Hybrid => "hybrid",
        }
    }

    pub fn uses_rules(&self) -> bool {
        matches!(self, DetectionAlgorithm::Standard | DetectionAlgorithm::Hybrid)
    }

    pub fn uses_provider(&self) -> bool {
        matches!(self, DetectionAlgorithm::Ai | DetectionAlgorithm::Hybrid)
    }
}

impl std::str::FromStr for DetectionAlgorithm {
    type Err = DomainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "ai" => Ok(Self::Ai),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(DomainError::config(format!(
                "Unknown detection algorithm '{}' (expected standard, ai or hybrid)",
                other
            ))),
        }
    }
}

/// Outlier method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    #[default]
    Zscore,
    Iqr,
    None,
}

/// Fully resolved detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionConfig {
    pub mandatory_fields: Vec<String>,
    pub amount: AmountRules,
    pub date: DateRules,
    pub description: DescriptionRules,
    pub category: CategoryRules,
    pub email: EmailRules,
    pub outliers: OutlierRules,
    pub duplicates: DuplicateRules,
    pub detection_algorithm: DetectionAlgorithm,
    pub round_number_threshold: f64,
    pub patterns: PatternRules,
    pub ai: AiSettings,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            mandatory_fields: vec!["date".into(), "amount".into(), "description".into()],
            amount: AmountRules::default(),
            date: DateRules::default(),
            description: DescriptionRules::default(),
            category: CategoryRules::default(),
            email: EmailRules::default(),
            outliers: OutlierRules::default(),
            duplicates: DuplicateRules::default(),
            detection_algorithm: DetectionAlgorithm::Standard,
            round_number_threshold: 100.0,
            patterns: PatternRules::default(),
            ai: AiSettings::default(),
        }
    }
}

impl DetectionConfig {
    /// Reject values no detector can work with
    pub fn validate(&self) -> std::result::Result<(), DomainError> {
        if self.amount.min > self.amount.max {
            return Err(DomainError::config(format!(
                "amount.min ({}) is greater than amount.max ({})",
                self.amount.min, self.amount.max
            )));
        }
        if !(self.outliers.threshold > 0.0) {
            return Err(DomainError::config("outliers.threshold must be positive"));
        }
        if !(self.outliers.iqr_factor >= 0.0) {
            return Err(DomainError::config("outliers.iqrFactor must not be negative"));
        }
        if !(self.round_number_threshold > 0.0) {
            return Err(DomainError::config("roundNumberThreshold must be positive"));
        }
        for pattern in &self.date.date_patterns {
            compile_date_pattern(pattern)?;
        }
        Regex::new(&self.email.format)
            .map_err(|e| DomainError::config(format!("email.format is not a valid regex: {}", e)))?;
        Ok(())
    }
}

/// Compile a date pattern, requiring `year`, `month` and `day` named groups
pub fn compile_date_pattern(pattern: &str) -> std::result::Result<Regex, DomainError> {
    let re = Regex::new(pattern).map_err(|e| {
        DomainError::config(format!("date pattern '{}' is not a valid regex: {}", pattern, e))
    })?;
    let names: Vec<&str> = re.capture_names().flatten().collect();
    for group in ["year", "month", "day"] {
        if !names.contains(&group) {
            return Err(DomainError::config(format!(
                "date pattern '{}' lacks a named '{}' group",
                pattern, group
            )));
        }
    }
    Ok(re)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AmountRules {
    pub min: f64,
    pub max: f64,
    pub allow_negative: bool,
}

impl Default for AmountRules {
    fn default() -> Self {
        Self {
            min: -1_000_000.0,
            max: 1_000_000.0,
            allow_negative: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DateRules {
    pub date_patterns: Vec<String>,
    pub allow_future: bool,
}

impl Default for DateRules {
    fn default() -> Self {
        Self {
            date_patterns: vec![YMD_PATTERN.to_string(), MDY_PATTERN.to_string()],
            allow_future: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DescriptionRules {
    pub required: bool,
}

impl Default for DescriptionRules {
    fn default() -> Self {
        Self { required: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryRules {
    pub required: bool,
    pub valid_categories: Vec<String>,
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self {
            required: false,
            valid_categories: EXPENSE_CATEGORIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailRules {
    pub required: bool,
    pub format: String,
}

impl Default for EmailRules {
    fn default() -> Self {
        Self {
            required: false,
            format: EMAIL_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutlierRules {
    pub check: bool,
    pub method: OutlierMethod,
    pub threshold: f64,
    pub iqr_factor: f64,
}

impl Default for OutlierRules {
    fn default() -> Self {
        Self {
            check: true,
            method: OutlierMethod::Zscore,
            threshold: 3.0,
            iqr_factor: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DuplicateRules {
    pub check: bool,
    pub unique_columns: Vec<String>,
}

impl Default for DuplicateRules {
    fn default() -> Self {
        Self {
            check: true,
            unique_columns: vec!["date".into(), "amount".into(), "description".into()],
        }
    }
}

/// Switches for the pattern detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatternRules {
    pub enabled: bool,
    pub round_numbers: bool,
    pub frequent_amounts: bool,
    pub weekend_transactions: bool,
    pub same_day_category: bool,
}

impl Default for PatternRules {
    fn default() -> Self {
        Self {
            enabled: true,
            round_numbers: true,
            frequent_amounts: true,
            weekend_transactions: true,
            same_day_category: true,
        }
    }
}

/// Provider settings and the caller-side retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiSettings {
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    /// Rows sent to the provider; larger datasets are truncated
    pub max_rows: usize,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 60,
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_rows: 500,
        }
    }
}
