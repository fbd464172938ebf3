//! Anomaly domain model
//!
//! Detectors produce [`Anomaly`] values carrying tagged [`Reason`]s. Once a
//! detection pass is finished they are flattened into [`AnomalyRecord`]s,
//! the shape callers serialize and display.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use super::dataset::{format_number, Cell};
use super::header::{columns, HeaderMap};

/// Sentinel used for snapshot fields whose column does not exist
pub const NOT_AVAILABLE: &str = "N/A";

/// Why a reason was raised, used to adjust confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    /// A value that should be there is blank
    Missing,
    /// A field demanded by a transaction-type rule is blank
    Required,
    /// A value is malformed or not in an allowed set
    Invalid,
    /// A value is well-formed but forbidden by configuration
    NotAllowed,
    /// A heuristic hint such as a round amount
    Suspicious,
    /// An amount that repeats unusually often
    Frequent,
    /// Anything else: range, type rules, outliers, calendar patterns
    General,
}

impl ReasonKind {
    /// Every adjustment group a free-text message falls into, heuristics
    /// first. A message matching nothing yields an empty list.
    pub fn classify_all(message: &str) -> Vec<Self> {
        let mut kinds = Vec::new();
        if message.contains("frequent") {
            kinds.push(ReasonKind::Frequent);
        } else if message.contains("Suspicious") {
            kinds.push(ReasonKind::Suspicious);
        }
        if message.contains("Invalid") {
            kinds.push(ReasonKind::Invalid);
        } else if message.contains("not allowed") {
            kinds.push(ReasonKind::NotAllowed);
        }
        if message.contains("required") {
            kinds.push(ReasonKind::Required);
        } else if message.contains("missing") {
            kinds.push(ReasonKind::Missing);
        }
        kinds
    }

    /// Classify free text coming from outside the engine (an AI provider)
    /// the same way built-in reasons are tagged.
    pub fn classify(message: &str) -> Self {
        Self::classify_all(message)
            .into_iter()
            .next()
            .unwrap_or(ReasonKind::General)
    }
}

/// One error attached to an anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub kind: ReasonKind,
    /// Further groups an external message matched besides `kind`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_kinds: Vec<ReasonKind>,
    pub message: String,
}

impl Reason {
    pub fn new(kind: ReasonKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            extra_kinds: Vec::new(),
            message: message.into(),
        }
    }

    pub fn missing(message: impl Into<String>) -> Self {
        Self::new(ReasonKind::Missing, message)
    }

    pub fn required(message: impl Into<String>) -> Self {
        Self::new(ReasonKind::Required, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ReasonKind::Invalid, message)
    }

    pub fn not_allowed(message: impl Into<String>) -> Self {
        Self::new(ReasonKind::NotAllowed, message)
    }

    pub fn suspicious(message: impl Into<String>) -> Self {
        Self::new(ReasonKind::Suspicious, message)
    }

    pub fn frequent(message: impl Into<String>) -> Self {
        Self::new(ReasonKind::Frequent, message)
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::new(ReasonKind::General, message)
    }

    /// Tag a free-text message from an external source with every group it
    /// mentions
    pub fn external(message: impl Into<String>) -> Self {
        let message = message.into();
        let mut kinds = ReasonKind::classify_all(&message).into_iter();
        let kind = kinds.next().unwrap_or(ReasonKind::General);
        Self {
            kind,
            extra_kinds: kinds.collect(),
            message,
        }
    }

    /// All kinds carried by this reason
    pub fn kinds(&self) -> impl Iterator<Item = ReasonKind> + '_ {
        std::iter::once(self.kind).chain(self.extra_kinds.iter().copied())
    }
}

/// A display value captured at detection time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotValue {
    Number(f64),
    Text(String),
}

impl SnapshotValue {
    pub fn not_available() -> Self {
        SnapshotValue::Text(NOT_AVAILABLE.to_string())
    }

    pub fn is_not_available(&self) -> bool {
        matches!(self, SnapshotValue::Text(s) if s == NOT_AVAILABLE)
    }

    pub fn display(&self) -> String {
        match self {
            SnapshotValue::Number(n) => format_number(*n),
            SnapshotValue::Text(s) => s.clone(),
        }
    }
}

impl Default for SnapshotValue {
    fn default() -> Self {
        Self::not_available()
    }
}

/// Row values shown next to an anomaly
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub amount: SnapshotValue,
    #[serde(default)]
    pub date: SnapshotValue,
    #[serde(default)]
    pub description: SnapshotValue,
    #[serde(default)]
    pub category: SnapshotValue,
    #[serde(default)]
    pub email: SnapshotValue,
    #[serde(default)]
    pub transaction_type: SnapshotValue,
}

impl Snapshot {
    /// Capture a row. Columns missing from the header become `"N/A"`.
    ///
    /// The amount is stored as a number when it parses and as `"N/A"`
    /// otherwise; the date is normalized to `YYYY-MM-DD` when it parses.
    pub fn capture(
        header: &HeaderMap,
        row: &[Cell],
        parse_date: impl Fn(&Cell) -> Option<chrono::NaiveDate>,
    ) -> Self {
        let text = |name: &str| {
            header
                .cell(row, name)
                .map(|c| SnapshotValue::Text(c.trimmed()))
                .unwrap_or_default()
        };

        // An amount that does not parse has no display value
        let amount = header
            .cell(row, columns::AMOUNT)
            .and_then(Cell::as_amount)
            .map(SnapshotValue::Number)
            .unwrap_or_default();

        let date = header
            .cell(row, columns::DATE)
            .map(|c| match parse_date(c) {
                Some(d) => SnapshotValue::Text(d.format("%Y-%m-%d").to_string()),
                None => SnapshotValue::Text(c.trimmed()),
            })
            .unwrap_or_default();

        Self {
            amount,
            date,
            description: text(columns::DESCRIPTION),
            category: text(columns::CATEGORY),
            email: text(columns::EMAIL),
            transaction_type: text(columns::TRANSACTION_TYPE),
        }
    }
}

/// An anomaly as it moves through the detection pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Anomaly {
    /// Externally visible row number (data index + 2)
    pub row: usize,
    pub reasons: Vec<Reason>,
    /// Unset means "no opinion", which scores as 1.0
    pub confidence: Option<f64>,
    pub snapshot: Snapshot,
}

impl Anomaly {
    pub fn new(row: usize, reasons: Vec<Reason>, snapshot: Snapshot) -> Self {
        Self {
            row,
            reasons,
            confidence: None,
            snapshot,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn messages(&self) -> Vec<String> {
        self.reasons.iter().map(|r| r.message.clone()).collect()
    }

    /// Flatten into the output record
    pub fn into_record(self) -> AnomalyRecord {
        let errors = self.messages();
        AnomalyRecord {
            row: self.row,
            errors,
            confidence: self.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
            snapshot: self.snapshot,
        }
    }
}

/// The anomaly output contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub row: usize,
    #[serde(deserialize_with = "deserialize_errors")]
    pub errors: Vec<String>,
    pub confidence: f64,
    #[serde(flatten)]
    pub snapshot: Snapshot,
}

impl AnomalyRecord {
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// Accept `errors` either as a list or as a single string
fn deserialize_errors<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: JsonValue = Deserialize::deserialize(deserializer)?;
    match value {
        JsonValue::String(s) => Ok(vec![s]),
        JsonValue::Array(items) => items
            .into_iter()
            .map(|v| match v {
                JsonValue::String(s) => Ok(s),
                other => Err(D::Error::custom(format!("expected string error, got {}", other))),
            })
            .collect(),
        _ => Err(D::Error::custom("expected string or array for errors")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn header(names: &[&str]) -> HeaderMap {
        let cells: Vec<Cell> = names.iter().map(|s| Cell::from(*s)).collect();
        HeaderMap::from_cells(&cells)
    }

    #[test]
    fn test_classify_external_messages() {
        assert_eq!(ReasonKind::classify("Vendor is missing"), ReasonKind::Missing);
        assert_eq!(ReasonKind::classify("Invalid IBAN"), ReasonKind::Invalid);
        assert_eq!(ReasonKind::classify("Cash is not allowed"), ReasonKind::NotAllowed);
        assert_eq!(ReasonKind::classify("Suspicious payee"), ReasonKind::Suspicious);
        assert_eq!(ReasonKind::classify("Amount is too frequent"), ReasonKind::Frequent);
        assert_eq!(ReasonKind::classify("Looks odd"), ReasonKind::General);
    }

    #[test]
    fn test_external_reason_keeps_every_group() {
        let reason = Reason::external("Invalid vendor: tax id missing");
        let kinds: Vec<_> = reason.kinds().collect();
        assert_eq!(kinds, vec![ReasonKind::Invalid, ReasonKind::Missing]);

        let reason = Reason::external("Suspicious payee, receipt required");
        let kinds: Vec<_> = reason.kinds().collect();
        assert_eq!(kinds, vec![ReasonKind::Suspicious, ReasonKind::Required]);

        let plain = Reason::external("Looks odd");
        assert_eq!(plain.kinds().collect::<Vec<_>>(), vec![ReasonKind::General]);
    }

    #[test]
    fn test_snapshot_absent_columns_are_sentinel() {
        let map = header(&["Amount", "Date"]);
        let row = vec![Cell::from("12.50"), Cell::from("01/15/2024")];
        let snap = Snapshot::capture(&map, &row, |c| {
            chrono::NaiveDate::parse_from_str(&c.trimmed(), "%m/%d/%Y").ok()
        });
        assert_eq!(snap.amount, SnapshotValue::Number(12.5));
        assert_eq!(snap.date, SnapshotValue::Text("2024-01-15".into()));
        assert!(snap.description.is_not_available());
        assert!(snap.email.is_not_available());
        assert!(snap.transaction_type.is_not_available());
    }

    #[test]
    fn test_snapshot_unparsable_amount_is_sentinel() {
        let map = header(&["Amount", "Date"]);
        let row = vec![Cell::from("twelve"), Cell::from("someday")];
        let snap = Snapshot::capture(&map, &row, |_| None);
        assert!(snap.amount.is_not_available());
        assert_eq!(snap.date, SnapshotValue::Text("someday".into()));
    }

    #[test]
    fn test_record_serializes_flat() {
        let anomaly = Anomaly::new(5, vec![Reason::general("A")], Snapshot::default())
            .with_confidence(0.6);
        let value = anomaly.into_record().to_json();
        assert_eq!(value["row"], json!(5));
        assert_eq!(value["errors"], json!(["A"]));
        assert_eq!(value["amount"], json!("N/A"));
        assert_eq!(value["confidence"], json!(0.6));
    }

    #[test]
    fn test_record_accepts_string_errors() {
        let record: AnomalyRecord =
            serde_json::from_value(json!({"row": 3, "errors": "Bad", "confidence": 0.4})).unwrap();
        assert_eq!(record.errors, vec!["Bad".to_string()]);
        assert!(record.snapshot.category.is_not_available());
    }

    #[test]
    fn test_unset_confidence_flattens_to_one() {
        let record = Anomaly::new(2, vec![Reason::general("x")], Snapshot::default()).into_record();
        assert_eq!(record.confidence, 1.0);
    }
}
