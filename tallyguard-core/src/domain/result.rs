//! Result and error types for the core library

use thiserror::Error;

/// Core library error type
///
/// Per-row validation failures are never errors: they become anomalies.
/// Only violations of a calling contract (bad configuration, unreadable
/// input, a failed provider call) surface here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Provider error: {message}")]
    Provider { message: String, retryable: bool },

    #[error("Contract error: {0}")]
    Contract(#[from] ContractViolation),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an input error
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Create a provider error that is worth retrying (timeouts, 429, 5xx)
    pub fn provider_transient(msg: impl Into<String>) -> Self {
        Self::Provider {
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a provider error that will not go away on retry
    pub fn provider_fatal(msg: impl Into<String>) -> Self {
        Self::Provider {
            message: msg.into(),
            retryable: false,
        }
    }

    /// Whether retrying the failed operation could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { retryable: true, .. })
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// A single breach of the anomaly output contract
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", describe(.index, .problem))]
pub struct ContractViolation {
    /// Offending element, `None` when the collection itself is malformed
    pub index: Option<usize>,
    pub problem: ViolationKind,
}

/// What was wrong with the offending element
#[derive(Debug, Clone, PartialEq)]
pub enum ViolationKind {
    NotAList,
    NotAnObject,
    MissingRow,
    BadErrors,
    BadAmount(String),
    /// Passed the structural checks but still does not fit the record shape
    Malformed(String),
}

fn describe(index: &Option<usize>, problem: &ViolationKind) -> String {
    let what = match problem {
        ViolationKind::NotAList => "anomalies must be a list".to_string(),
        ViolationKind::NotAnObject => "anomaly is not an object".to_string(),
        ViolationKind::MissingRow => "anomaly has no row".to_string(),
        ViolationKind::BadErrors => "errors must be a non-empty array or string".to_string(),
        ViolationKind::BadAmount(raw) => format!("amount '{}' is not a number", raw),
        ViolationKind::Malformed(detail) => format!("anomaly is malformed: {}", detail),
    };
    match index {
        Some(i) => format!("anomaly at index {}: {}", i, what),
        None => what,
    }
}
