//! Condition evaluation for mutation entries: `equal`, `not_equal`, and
//! `by_pattern` predicates tested against another column's current value.

use regex::Regex;

use crate::directive::{ConditionOp, ConditionSpec};

/// Evaluate the conditions on a mutation entry against the current row.
///
/// `lookup_value` resolves a column name to its current string value (the
/// original, pre-obfuscation value seen in this row). A condition whose
/// column is missing from the row never matches.
///
/// Any one condition holding is enough for the entry to be considered
/// satisfied (disjunction); an entry with no conditions always passes. This
/// matches the reference implementation's `_checking_conditions`, whose
/// loop stops and reports a match as soon as one condition evaluates true.
pub fn conditions_met<'a>(
    conditions: &[ConditionSpec],
    lookup_value: impl Fn(&str) -> Option<&'a str>,
) -> bool {
    if conditions.is_empty() {
        return true;
    }
    conditions.iter().any(|condition| {
        let Some(actual) = lookup_value(&condition.column_name) else {
            return false;
        };
        evaluate_one(condition, actual)
    })
}

fn evaluate_one(condition: &ConditionSpec, actual: &str) -> bool {
    match condition.operation {
        ConditionOp::Equal => actual == condition.value,
        ConditionOp::NotEqual => actual != condition.value,
        ConditionOp::ByPattern => Regex::new(&condition.value)
            .map(|re| re.is_match(actual))
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(column_name: &str, operation: ConditionOp, value: &str) -> ConditionSpec {
        ConditionSpec {
            column_name: column_name.to_string(),
            operation,
            value: value.to_string(),
        }
    }

    #[test]
    fn equal_matches_exact_value() {
        let conds = vec![spec("status", ConditionOp::Equal, "active")];
        assert!(conditions_met(&conds, |c| (c == "status").then_some("active")));
        assert!(!conditions_met(&conds, |c| (c == "status").then_some("inactive")));
    }

    #[test]
    fn not_equal_matches_anything_else() {
        let conds = vec![spec("status", ConditionOp::NotEqual, "active")];
        assert!(conditions_met(&conds, |c| (c == "status").then_some("inactive")));
        assert!(!conditions_met(&conds, |c| (c == "status").then_some("active")));
    }

    #[test]
    fn by_pattern_uses_regex_search() {
        let conds = vec![spec("email", ConditionOp::ByPattern, r"@example\.com$")];
        assert!(conditions_met(&conds, |c| (c == "email").then_some(
            "jane@example.com"
        )));
        assert!(!conditions_met(&conds, |c| (c == "email").then_some(
            "jane@other.org"
        )));
    }

    #[test]
    fn missing_column_never_matches() {
        let conds = vec![spec("missing", ConditionOp::Equal, "x")];
        assert!(!conditions_met(&conds, |_| None));
    }

    #[test]
    fn empty_conditions_always_pass() {
        assert!(conditions_met(&[], |_| None));
    }

    #[test]
    fn multiple_conditions_match_on_any_one_holding() {
        let conds = vec![
            spec("status", ConditionOp::Equal, "active"),
            spec("region", ConditionOp::Equal, "eu"),
        ];
        let row = |status: &'static str, region: &'static str| {
            move |c: &str| match c {
                "status" => Some(status),
                "region" => Some(region),
                _ => None,
            }
        };
        assert!(conditions_met(&conds, row("active", "us")));
        assert!(conditions_met(&conds, row("inactive", "eu")));
        assert!(!conditions_met(&conds, row("inactive", "us")));
    }
}
