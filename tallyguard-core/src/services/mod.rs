//! Service layer - detection pipeline and its orchestration
//!
//! Detectors are plain functions over a [`ScanContext`]; the services
//! below wire them together, enforce the output contract and talk to the
//! optional AI provider.

pub mod assist;
pub mod context;
pub mod contract;
pub mod detect;
pub mod logging;
pub mod merge;
pub mod outliers;
pub mod patterns;
pub mod scoring;
pub mod summary;
pub mod type_rules;
pub mod validation;

pub use assist::{AssistService, RetryPolicy};
pub use context::{CompiledRules, ScanContext};
pub use contract::Enforced;
pub use detect::{DetectionReport, DetectionService};
pub use logging::{EntryPoint, EventCount, LogEntry, LogEvent, LoggingService};
pub use summary::{summarize, DatasetSummary};
pub use validation::DateParser;
