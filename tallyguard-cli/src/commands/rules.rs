//! Rules command - show the transaction-type rule table

use anyhow::Result;
use colored::Colorize;

use tallyguard_core::domain::{AmountSign, TYPE_RULES};

use crate::output;

pub fn run(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(TYPE_RULES)?);
        return Ok(());
    }

    println!("{}", "Transaction Types".bold());
    println!();

    let mut table = output::create_table();
    table.set_header(vec!["Type", "Required fields", "Amount", "Other"]);
    for rule in TYPE_RULES {
        let amount = match rule.amount {
            Some(AmountSign::MustBePositive) => "positive",
            Some(AmountSign::MustBeNegative) => "negative",
            None => "any",
        };
        let mut other = Vec::new();
        if let Some(categories) = rule.category_in {
            other.push(format!("category in {}", categories.join(", ")));
        }
        if let Some(min_len) = rule.description_min_len {
            other.push(format!("description at least {} chars", min_len));
        }
        table.add_row(vec![
            rule.name.to_string(),
            rule.required_fields.join(", "),
            amount.to_string(),
            other.join("; "),
        ]);
    }
    println!("{}", table);
    Ok(())
}
