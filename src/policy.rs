use std::collections::BTreeSet;

use clap::ValueEnum;

use crate::domain::MEASUREMENT_COLUMNS;

/// Tokens that mean "no value" in the inquiry spreadsheets, on top of blank cells.
pub const DEFAULT_MISSING_TOKENS: [&str; 9] = [
    ".", "-", "N/A", "#N/A", "#VALUE!", "#DIV/0!", "?", "—", "－",
];

/// Which columns treat a literal zero as a missing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ZeroScope {
    /// Only the solids recovery and cake moisture columns.
    #[default]
    Measurements,
    /// Every column of the table.
    All,
    /// Zero is always a value.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleScope {
    All,
    Column(String),
}

impl RuleScope {
    fn matches(&self, column: &str) -> bool {
        match self {
            RuleScope::All => true,
            RuleScope::Column(name) => name == column,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CleaningRule {
    pub scope: RuleScope,
    pub missing_tokens: BTreeSet<String>,
    pub zero_is_missing: bool,
}

/// Declarative cleaning table. Every rule whose scope matches a column contributes its
/// missing tokens, and zero is missing if any matching rule says so.
#[derive(Debug, Clone)]
pub struct CleaningPolicy {
    rules: Vec<CleaningRule>,
}

impl Default for CleaningPolicy {
    fn default() -> Self {
        CleaningPolicy::new(ZeroScope::default())
    }
}

impl CleaningPolicy {
    pub fn new(zero_scope: ZeroScope) -> Self {
        let mut policy = CleaningPolicy::empty().with_rule(CleaningRule {
            scope: RuleScope::All,
            missing_tokens: DEFAULT_MISSING_TOKENS.iter().map(|t| t.to_string()).collect(),
            zero_is_missing: zero_scope == ZeroScope::All,
        });
        if zero_scope == ZeroScope::Measurements {
            for name in MEASUREMENT_COLUMNS {
                policy = policy.with_rule(CleaningRule {
                    scope: RuleScope::Column(name.to_string()),
                    missing_tokens: BTreeSet::new(),
                    zero_is_missing: true,
                });
            }
        }
        policy
    }

    /// A policy without any rule: only blank cells are missing.
    pub fn empty() -> Self {
        CleaningPolicy { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: CleaningRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn for_column(&self, column: &str) -> ColumnPolicy<'_> {
        let mut policy = ColumnPolicy {
            missing_tokens: Vec::new(),
            zero_is_missing: false,
        };
        for rule in self.rules.iter().filter(|r| r.scope.matches(column)) {
            policy
                .missing_tokens
                .extend(rule.missing_tokens.iter().map(String::as_str));
            policy.zero_is_missing |= rule.zero_is_missing;
        }
        policy
    }
}

/// The effective policy of a single column.
#[derive(Debug, Clone)]
pub struct ColumnPolicy<'a> {
    missing_tokens: Vec<&'a str>,
    zero_is_missing: bool,
}

impl ColumnPolicy<'_> {
    /// Returns the trimmed cell text, or `None` when the cell counts as missing.
    pub fn clean<'c>(&self, cell: Option<&'c str>) -> Option<&'c str> {
        let text = cell?.trim();
        if text.is_empty() || self.missing_tokens.iter().any(|t| *t == text) {
            return None;
        }
        if self.zero_is_missing && parse_number(text) == Some(0.0) {
            return None;
        }
        Some(text)
    }
}

/// Strict numeric parse. Non finite results (`NaN`, `inf`) are not numbers here.
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{INDUSTRY_MAJOR, SOLIDS_RECOVERY};

    #[test]
    fn blank_and_tokens_are_missing() {
        let policy = CleaningPolicy::default();
        let col = policy.for_column(INDUSTRY_MAJOR);
        for cell in ["", "   ", "\t", "N/A", "-", "—", "－", "#VALUE!", "?", "."] {
            assert_eq!(col.clean(Some(cell)), None, "{cell:?}");
        }
        assert_eq!(col.clean(None), None);
        assert_eq!(col.clean(Some(" 食品製造 ")), Some("食品製造"));
    }

    #[test]
    fn zero_only_missing_in_measurement_columns_by_default() {
        let policy = CleaningPolicy::default();
        assert_eq!(policy.for_column(SOLIDS_RECOVERY).clean(Some("0")), None);
        assert_eq!(policy.for_column(SOLIDS_RECOVERY).clean(Some("0.0")), None);
        assert_eq!(policy.for_column(SOLIDS_RECOVERY).clean(Some("10")), Some("10"));
        assert_eq!(policy.for_column(INDUSTRY_MAJOR).clean(Some("0")), Some("0"));
    }

    #[test]
    fn zero_scope_all_and_none() {
        let all = CleaningPolicy::new(ZeroScope::All);
        assert_eq!(all.for_column("anything").clean(Some("0")), None);
        assert_eq!(all.for_column(SOLIDS_RECOVERY).clean(Some("0.00")), None);

        let none = CleaningPolicy::new(ZeroScope::None);
        assert_eq!(none.for_column(SOLIDS_RECOVERY).clean(Some("0")), Some("0"));
    }

    #[test]
    fn cleaning_twice_is_idempotent() {
        let policy = CleaningPolicy::new(ZeroScope::All);
        let col = policy.for_column(SOLIDS_RECOVERY);
        for cell in ["0", " 0 ", "10", " ", "abc", "N/A", " 85.5"] {
            let once = col.clean(Some(cell));
            assert_eq!(col.clean(once), once, "{cell:?}");
        }
    }

    #[test]
    fn custom_rule_adds_tokens_for_one_column() {
        let policy = CleaningPolicy::empty().with_rule(CleaningRule {
            scope: RuleScope::Column("備考".into()),
            missing_tokens: ["なし".to_string()].into_iter().collect(),
            zero_is_missing: false,
        });
        assert_eq!(policy.for_column("備考").clean(Some("なし")), None);
        assert_eq!(policy.for_column("other").clean(Some("なし")), Some("なし"));
        assert_eq!(policy.for_column("other").clean(Some("-")), Some("-"));
    }

    #[test]
    fn parse_number_is_strict() {
        assert_eq!(parse_number(" 12.5 "), Some(12.5));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number("85%"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number(""), None);
    }
}
