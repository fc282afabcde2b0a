//! OData V4 `$filter` rendering of a condition tree.

use crate::condition::{Combinator, Condition, Leaf, Operator, Scalar};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ODataError {
    #[error("BT condition on '{field}' has no upper bound")]
    MissingUpperBound { field: String },
    #[error("cannot render unrecognized filter node: {0}")]
    Unrecognized(String),
}

/// Renders `condition` as the value of a `$filter` query option.
///
/// Nested groups are parenthesized; the outermost expression is not. An empty AND
/// group renders as `true`, an empty OR group as `false`.
pub fn to_filter_string(condition: &Condition) -> Result<String, ODataError> {
    let mut out = String::new();
    write_condition(condition, &mut out)?;
    Ok(out)
}

fn write_condition(condition: &Condition, out: &mut String) -> Result<(), ODataError> {
    match condition {
        Condition::Leaf(leaf) => write_leaf(leaf, out),
        Condition::Group(group) => {
            let (joiner, empty) = match group.combinator {
                Combinator::And => (" and ", "true"),
                Combinator::Or => (" or ", "false"),
            };
            if group.children.is_empty() {
                out.push_str(empty);
                return Ok(());
            }
            for (i, child) in group.children.iter().enumerate() {
                if i > 0 {
                    out.push_str(joiner);
                }
                if child.as_group().is_some() {
                    out.push('(');
                    write_condition(child, out)?;
                    out.push(')');
                } else {
                    write_condition(child, out)?;
                }
            }
            Ok(())
        }
        Condition::Unknown(raw) => Err(ODataError::Unrecognized(raw.to_string())),
    }
}

fn write_leaf(leaf: &Leaf, out: &mut String) -> Result<(), ODataError> {
    // Case-insensitive comparison only applies to string values.
    let fold = !leaf.case_sensitive && matches!(leaf.value1, Scalar::String(_));
    let field = if fold {
        format!("tolower({})", leaf.field)
    } else {
        leaf.field.clone()
    };
    let value = literal(&leaf.value1, fold);

    let text = match leaf.operator {
        Operator::Eq => format!("{} eq {}", field, value),
        Operator::Ne => format!("{} ne {}", field, value),
        Operator::Lt => format!("{} lt {}", field, value),
        Operator::Le => format!("{} le {}", field, value),
        Operator::Gt => format!("{} gt {}", field, value),
        Operator::Ge => format!("{} ge {}", field, value),
        Operator::Contains => format!("contains({},{})", field, value),
        Operator::StartsWith => format!("startswith({},{})", field, value),
        Operator::EndsWith => format!("endswith({},{})", field, value),
        Operator::Bt => {
            let high = leaf.value2.as_ref().ok_or_else(|| ODataError::MissingUpperBound {
                field: leaf.field.clone(),
            })?;
            format!("({} ge {} and {} le {})", field, value, field, literal(high, fold))
        }
    };
    out.push_str(&text);
    Ok(())
}

fn literal(value: &Scalar, fold: bool) -> String {
    match value {
        Scalar::String(s) => {
            let quoted = format!("'{}'", s.replace('\'', "''"));
            if fold {
                format!("tolower({})", quoted)
            } else {
                quoted
            }
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Group;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_comparison_operators() {
        let cases = [
            (Operator::Eq, "age eq 3"),
            (Operator::Ne, "age ne 3"),
            (Operator::Lt, "age lt 3"),
            (Operator::Le, "age le 3"),
            (Operator::Gt, "age gt 3"),
            (Operator::Ge, "age ge 3"),
        ];
        for (op, expected) in cases {
            let cond = Condition::Leaf(Leaf::new("age", op, 3i64));
            assert_eq!(to_filter_string(&cond).unwrap(), expected);
        }
    }

    #[test]
    fn test_string_functions_and_quoting() {
        let cond = Condition::Leaf(Leaf::new("name", Operator::Contains, "O'Brien"));
        assert_eq!(to_filter_string(&cond).unwrap(), "contains(name,'O''Brien')");

        let cond = Condition::Leaf(Leaf::new("name", Operator::StartsWith, "Ac"));
        assert_eq!(to_filter_string(&cond).unwrap(), "startswith(name,'Ac')");
    }

    #[test]
    fn test_case_insensitive_string() {
        let cond = Condition::Leaf(Leaf::new("name", Operator::EndsWith, "corp").with_case_sensitive(false));
        assert_eq!(to_filter_string(&cond).unwrap(), "endswith(tolower(name),tolower('corp'))");

        // Non-string values are never folded
        let cond = Condition::Leaf(Leaf::new("active", Operator::Eq, true).with_case_sensitive(false));
        assert_eq!(to_filter_string(&cond).unwrap(), "active eq true");
    }

    #[test]
    fn test_between_with_dates() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let cond = Condition::Leaf(Leaf::between("closeDate", from, to));
        assert_eq!(
            to_filter_string(&cond).unwrap(),
            "(closeDate ge 2024-01-01 and closeDate le 2024-06-30)"
        );
    }

    #[test]
    fn test_between_without_upper_bound() {
        let cond = Condition::Leaf(Leaf::new("amount", Operator::Bt, 1i64));
        assert_eq!(
            to_filter_string(&cond),
            Err(ODataError::MissingUpperBound { field: "amount".to_string() })
        );
    }

    #[test]
    fn test_nested_groups_are_parenthesized() {
        let cond = Condition::Group(Group::all(vec![
            Condition::Group(Group::any(vec![
                Leaf::new("status", Operator::Eq, "Active").into(),
                Leaf::new("status", Operator::Eq, "Closed").into(),
            ])),
            Leaf::new("revenue", Operator::Gt, 1000.5).into(),
        ]));
        assert_eq!(
            to_filter_string(&cond).unwrap(),
            "(status eq 'Active' or status eq 'Closed') and revenue gt 1000.5"
        );
    }

    #[test]
    fn test_empty_groups() {
        assert_eq!(to_filter_string(&Condition::Group(Group::all(vec![]))).unwrap(), "true");
        let cond = Condition::Group(Group::all(vec![
            Leaf::new("a", Operator::Eq, 1i64).into(),
            Condition::Group(Group::any(vec![])),
        ]));
        assert_eq!(to_filter_string(&cond).unwrap(), "a eq 1 and (false)");
    }

    #[test]
    fn test_unknown_node_is_error() {
        let cond = Condition::Group(Group::all(vec![
            Leaf::new("a", Operator::Eq, 1i64).into(),
            Condition::Unknown(json!({ "x": 1 })),
        ]));
        assert_eq!(
            to_filter_string(&cond),
            Err(ODataError::Unrecognized(r#"{"x":1}"#.to_string()))
        );
    }
}
