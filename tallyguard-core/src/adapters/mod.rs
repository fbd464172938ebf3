//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - CSV and JSON files for DatasetSource
//! - Gemini HTTP client for AnomalyProvider
//! - Saved provider replies for AnomalyProvider (offline runs and tests)

pub mod csv;
pub mod gemini;
pub mod json;
pub mod replay;

pub use self::csv::CsvSource;
pub use self::gemini::GeminiProvider;
pub use self::json::JsonSource;
pub use self::replay::ReplayProvider;
