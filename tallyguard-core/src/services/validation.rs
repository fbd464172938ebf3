//! Field and rule validators
//!
//! Per-row structural checks that run regardless of transaction type:
//! mandatory fields, amount bounds, date parsing and range, description,
//! category whitelist, email format and duplicate keys. Parsed amounts are
//! collected along the way for outlier analysis.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::config::compile_date_pattern;
use crate::domain::dataset::format_number;
use crate::domain::header::columns;
use crate::domain::result::Result;
use crate::domain::{Anomaly, Cell, Reason};
use crate::services::context::ScanContext;

/// Formats tried before the configured patterns
const NATIVE_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%a %b %d %Y",
];

const NATIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Largest spreadsheet serial accepted as a date (9999-12-31)
const MAX_SERIAL_DAY: f64 = 2_958_465.0;

/// Date parser: native formats first, then the configured patterns
#[derive(Debug, Clone)]
pub struct DateParser {
    patterns: Vec<Regex>,
}

impl DateParser {
    /// Compile the configured patterns; each needs `year`, `month` and `day` groups
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| compile_date_pattern(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Parse a cell into a date
    ///
    /// Date cells pass through, numeric cells are read as spreadsheet serial
    /// days. Text is tried against the native formats before the configured
    /// patterns, so an ambiguous string resolves the native way.
    pub fn parse(&self, cell: &Cell) -> Option<NaiveDate> {
        match cell {
            Cell::Date(d) => Some(*d),
            Cell::Number(n) => serial_to_date(*n),
            Cell::Text(s) => self.parse_str(s),
            Cell::Empty | Cell::Bool(_) => None,
        }
    }

    pub fn parse_str(&self, raw: &str) -> Option<NaiveDate> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }
        parse_native(s).or_else(|| self.parse_patterns(s))
    }

    fn parse_patterns(&self, s: &str) -> Option<NaiveDate> {
        for re in &self.patterns {
            let Some(caps) = re.captures(s) else {
                continue;
            };
            let year: i32 = caps.name("year")?.as_str().parse().ok()?;
            let month: u32 = caps.name("month")?.as_str().parse().ok()?;
            let day: u32 = caps.name("day")?.as_str().parse().ok()?;
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some(date);
            }
        }
        None
    }
}

fn parse_native(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive());
    }
    for fmt in NATIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in NATIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    None
}

/// Spreadsheet serial day to date (epoch 1899-12-30, accounting for the 1900 leap year bug)
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=MAX_SERIAL_DAY).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Output of the field checks
#[derive(Debug, Default)]
pub struct FieldCheckOutcome {
    /// One anomaly per row with at least one failed check
    pub anomalies: Vec<Anomaly>,
    /// Parsed amounts as (data index, amount), for outlier analysis
    pub amounts: Vec<(usize, f64)>,
}

/// Run the per-row field checks over every data row
pub fn check_fields(ctx: &ScanContext) -> FieldCheckOutcome {
    let mut outcome = FieldCheckOutcome::default();
    let mut seen_keys: HashSet<Vec<String>> = HashSet::new();
    let key_columns = duplicate_key_columns(ctx);

    for index in 0..ctx.len() {
        let mut reasons = Vec::new();

        check_mandatory(ctx, index, &mut reasons);
        if let Some(amount) = check_amount(ctx, index, &mut reasons) {
            outcome.amounts.push((index, amount));
        }
        check_date(ctx, index, &mut reasons);
        check_description(ctx, index, &mut reasons);
        check_category(ctx, index, &mut reasons);
        check_email(ctx, index, &mut reasons);
        if let Some(columns) = &key_columns {
            check_duplicate(ctx, index, columns, &mut seen_keys, &mut reasons);
        }

        if !reasons.is_empty() {
            outcome
                .anomalies
                .push(Anomaly::new(ctx.row_number(index), reasons, ctx.snapshot(index)));
        }
    }

    outcome
}

fn is_mandatory(ctx: &ScanContext, field: &str) -> bool {
    ctx.config
        .mandatory_fields
        .iter()
        .any(|f| f.trim().eq_ignore_ascii_case(field))
}

fn check_mandatory(ctx: &ScanContext, index: usize, reasons: &mut Vec<Reason>) {
    for field in &ctx.config.mandatory_fields {
        if let Some(cell) = ctx.cell(index, field) {
            if cell.is_blank() {
                reasons.push(Reason::missing(format!("{} is missing", field.trim())));
            }
        }
    }
}

fn check_amount(ctx: &ScanContext, index: usize, reasons: &mut Vec<Reason>) -> Option<f64> {
    let cell = ctx.cell(index, columns::AMOUNT)?;
    if cell.is_blank() {
        return None;
    }
    let Some(amount) = cell.as_amount() else {
        reasons.push(Reason::general("Amount is not a number"));
        return None;
    };

    let rules = &ctx.config.amount;
    if amount < 0.0 && !rules.allow_negative {
        reasons.push(Reason::not_allowed("Negative amount is not allowed"));
    }
    if amount < rules.min || amount > rules.max {
        reasons.push(Reason::general(format!(
            "Amount {} is outside the allowed range [{}, {}]",
            format_number(amount),
            format_number(rules.min),
            format_number(rules.max)
        )));
    }
    Some(amount)
}

fn check_date(ctx: &ScanContext, index: usize, reasons: &mut Vec<Reason>) {
    let Some(cell) = ctx.cell(index, columns::DATE) else {
        return;
    };
    if cell.is_blank() {
        if is_mandatory(ctx, columns::DATE) {
            reasons.push(Reason::missing("Date is missing"));
        }
        return;
    }
    match ctx.rules.dates.parse(cell) {
        None => reasons.push(Reason::invalid("Invalid date format")),
        Some(date) if !ctx.config.date.allow_future && date > ctx.today => {
            reasons.push(Reason::not_allowed("Future dates are not allowed"));
        }
        Some(_) => {}
    }
}

fn check_description(ctx: &ScanContext, index: usize, reasons: &mut Vec<Reason>) {
    if !ctx.config.description.required {
        return;
    }
    if let Some(cell) = ctx.cell(index, columns::DESCRIPTION) {
        if cell.is_blank() {
            reasons.push(Reason::general("Description is empty"));
        }
    }
}

fn check_category(ctx: &ScanContext, index: usize, reasons: &mut Vec<Reason>) {
    let rules = &ctx.config.category;
    if !rules.required {
        return;
    }
    let Some(category) = ctx.text(index, columns::CATEGORY) else {
        return;
    };
    if !rules.valid_categories.iter().any(|c| c == &category) {
        reasons.push(Reason::invalid(format!("Invalid category: {}", category)));
    }
}

fn check_email(ctx: &ScanContext, index: usize, reasons: &mut Vec<Reason>) {
    if !ctx.config.email.required {
        return;
    }
    let Some(email) = ctx.text(index, columns::EMAIL) else {
        return;
    };
    if !ctx.rules.email.is_match(&email) {
        reasons.push(Reason::invalid(format!("Invalid email format: {}", email)));
    }
}

/// Configured key columns that exist in the header, `None` when the check is off
fn duplicate_key_columns(ctx: &ScanContext) -> Option<Vec<String>> {
    let rules = &ctx.config.duplicates;
    if !rules.check {
        return None;
    }
    let present: Vec<String> = rules
        .unique_columns
        .iter()
        .filter(|c| ctx.header.contains(c))
        .cloned()
        .collect();
    if present.is_empty() {
        None
    } else {
        Some(present)
    }
}

fn check_duplicate(
    ctx: &ScanContext,
    index: usize,
    key_columns: &[String],
    seen: &mut HashSet<Vec<String>>,
    reasons: &mut Vec<Reason>,
) {
    let cells: Vec<&Cell> = key_columns
        .iter()
        .filter_map(|c| ctx.cell(index, c))
        .collect();
    if cells.iter().all(|c| c.is_blank()) {
        return;
    }
    let key: Vec<String> = cells.iter().map(|c| c.to_text()).collect();
    if !seen.insert(key) {
        reasons.push(Reason::general("Duplicate entry detected"));
    }
}
