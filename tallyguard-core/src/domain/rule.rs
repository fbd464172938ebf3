//! Transaction-type rule table

use serde::Serialize;

/// Expense categories accepted for EXPENSE transactions
pub const EXPENSE_CATEGORIES: &[&str] = &[
    "Office",
    "Travel",
    "Utilities",
    "Salaries",
    "Marketing",
    "Other",
];

/// Sign constraint on the amount of a transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountSign {
    MustBePositive,
    MustBeNegative,
}

/// Validation rules attached to one transaction type
#[derive(Debug, Clone, Serialize)]
pub struct TypeRule {
    /// Upper-case type name as it appears in the `transaction_type` column
    pub name: &'static str,
    pub required_fields: &'static [&'static str],
    pub amount: Option<AmountSign>,
    /// Allowed categories, `None` when any category is accepted
    pub category_in: Option<&'static [&'static str]>,
    /// Minimum description length in characters
    pub description_min_len: Option<usize>,
}

/// Built-in transaction types
pub const TYPE_RULES: &[TypeRule] = &[
    TypeRule {
        name: "PAYMENT",
        required_fields: &["amount", "date", "description"],
        amount: Some(AmountSign::MustBePositive),
        category_in: None,
        description_min_len: Some(3),
    },
    TypeRule {
        name: "EXPENSE",
        required_fields: &["amount", "date", "category", "description"],
        amount: Some(AmountSign::MustBeNegative),
        category_in: Some(EXPENSE_CATEGORIES),
        description_min_len: None,
    },
    TypeRule {
        name: "TRANSFER",
        required_fields: &["amount", "date", "from_account", "to_account"],
        amount: Some(AmountSign::MustBePositive),
        category_in: None,
        description_min_len: None,
    },
    TypeRule {
        name: "REFUND",
        required_fields: &["amount", "date", "original_transaction_id"],
        amount: Some(AmountSign::MustBePositive),
        category_in: None,
        description_min_len: None,
    },
];

/// Look up the rule for an already upper-cased type name
pub fn rule_for(type_name: &str) -> Option<&'static TypeRule> {
    TYPE_RULES.iter().find(|r| r.name == type_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types() {
        let names: Vec<_> = TYPE_RULES.iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["PAYMENT", "EXPENSE", "TRANSFER", "REFUND"]);
    }

    #[test]
    fn test_expense_rule() {
        let rule = rule_for("EXPENSE").unwrap();
        assert_eq!(rule.amount, Some(AmountSign::MustBeNegative));
        assert!(rule.category_in.unwrap().contains(&"Travel"));
        assert!(rule.required_fields.contains(&"category"));
    }

    #[test]
    fn test_lookup_is_exact() {
        assert!(rule_for("payment").is_none());
        assert!(rule_for("WIRE").is_none());
    }
}
