//! Transaction-type rule engine
//!
//! Rows carrying a `transaction_type` column are dispatched against the
//! static [`TYPE_RULES`](crate::domain::TYPE_RULES) table. Datasets without
//! the column are skipped entirely.

use crate::domain::header::columns;
use crate::domain::rule::{rule_for, AmountSign, TypeRule};
use crate::domain::{Anomaly, Reason};
use crate::services::context::ScanContext;

/// Check every row against the rule of its declared type
pub fn check_types(ctx: &ScanContext) -> Vec<Anomaly> {
    if !ctx.header.contains(columns::TRANSACTION_TYPE) {
        return Vec::new();
    }

    (0..ctx.len())
        .filter_map(|index| {
            let reasons = check_row(ctx, index);
            if reasons.is_empty() {
                None
            } else {
                Some(Anomaly::new(ctx.row_number(index), reasons, ctx.snapshot(index)))
            }
        })
        .collect()
}

fn check_row(ctx: &ScanContext, index: usize) -> Vec<Reason> {
    let Some(type_name) = ctx.text(index, columns::TRANSACTION_TYPE) else {
        return vec![Reason::missing("Transaction type is missing")];
    };
    let type_name = type_name.to_uppercase();
    let Some(rule) = rule_for(&type_name) else {
        return vec![Reason::general(format!(
            "Unknown transaction type: {}",
            type_name
        ))];
    };

    let mut reasons = Vec::new();
    check_required(ctx, index, rule, &mut reasons);
    check_sign(ctx, index, rule, &mut reasons);
    check_category(ctx, index, rule, &mut reasons);
    check_description(ctx, index, rule, &mut reasons);
    reasons
}

fn check_required(ctx: &ScanContext, index: usize, rule: &TypeRule, reasons: &mut Vec<Reason>) {
    for field in rule.required_fields {
        if let Some(cell) = ctx.cell(index, field) {
            if cell.is_blank() {
                reasons.push(Reason::required(format!(
                    "{} is required for {} transactions",
                    field, rule.name
                )));
            }
        }
    }
}

fn check_sign(ctx: &ScanContext, index: usize, rule: &TypeRule, reasons: &mut Vec<Reason>) {
    let (Some(sign), Some(amount)) = (rule.amount, ctx.amount(index)) else {
        return;
    };
    let violated = match sign {
        AmountSign::MustBePositive => amount <= 0.0,
        AmountSign::MustBeNegative => amount >= 0.0,
    };
    if violated {
        let expected = match sign {
            AmountSign::MustBePositive => "positive",
            AmountSign::MustBeNegative => "negative",
        };
        reasons.push(Reason::general(format!(
            "{} transactions must have a {} amount",
            rule.name, expected
        )));
    }
}

fn check_category(ctx: &ScanContext, index: usize, rule: &TypeRule, reasons: &mut Vec<Reason>) {
    let Some(allowed) = rule.category_in else {
        return;
    };
    let Some(category) = ctx.text(index, columns::CATEGORY) else {
        return;
    };
    if !allowed.contains(&category.as_str()) {
        reasons.push(Reason::invalid(format!(
            "Invalid category for {} transactions: {}. Must be one of: {}",
            rule.name,
            category,
            allowed.join(", ")
        )));
    }
}

fn check_description(ctx: &ScanContext, index: usize, rule: &TypeRule, reasons: &mut Vec<Reason>) {
    let Some(min_len) = rule.description_min_len else {
        return;
    };
    let Some(cell) = ctx.cell(index, columns::DESCRIPTION) else {
        return;
    };
    if cell.trimmed().chars().count() < min_len {
        reasons.push(Reason::general(format!(
            "Description must be at least {} characters for {} transactions",
            min_len, rule.name
        )));
    }
}
