//! SQL compiler that converts normalized condition trees to PostgreSQL queries using sea-query.

use crate::condition::{Combinator, Condition, Group, Leaf, Operator, Scalar};
use sea_query::{
    Asterisk, Expr, Func, Iden, LikeExpr, PostgresQueryBuilder, QueryStatementWriter, SimpleExpr, Value,
};
use thiserror::Error;

/// Configuration for SQL optimization
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    /// Minimum number of same-field equality alternatives before an OR group becomes an IN clause
    pub max_or_conditions_for_in: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_or_conditions_for_in: 5,
        }
    }
}

/// Table identifier wrapper
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("BT condition on '{field}' has no upper bound")]
    MissingUpperBound { field: String },
    #[error("cannot compile unrecognized filter node: {0}")]
    Unrecognized(String),
}

/// Represents an optimization applied during compilation
#[derive(Debug, Clone, PartialEq)]
pub enum Optimization {
    OrToIn { field: String, value_count: usize },
}

/// Result of SQL compilation with optimization information
#[derive(Debug)]
pub struct CompileResult {
    pub sql: String,
    pub optimizations: Vec<Optimization>,
}

/// SQL Compiler that converts condition trees to SQL queries
#[derive(Debug, Clone, Default)]
pub struct SqlCompiler {
    config: OptimizationConfig,
}

impl SqlCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: OptimizationConfig) -> Self {
        Self { config }
    }

    /// Compile `SELECT * FROM <table>` with the condition as its WHERE clause.
    pub fn compile(&self, condition: Option<&Condition>, table: &str) -> Result<CompileResult, CompileError> {
        let mut optimizations = Vec::new();

        let mut select = sea_query::Query::select();
        select.column(Asterisk).from(TableName(table.to_string()));

        if let Some(condition) = condition {
            let expr = self.compile_condition(condition, &mut optimizations)?;
            select.and_where(expr);
        }

        let sql = select.to_string(PostgresQueryBuilder);
        Ok(CompileResult { sql, optimizations })
    }

    fn compile_condition(
        &self,
        condition: &Condition,
        optimizations: &mut Vec<Optimization>,
    ) -> Result<SimpleExpr, CompileError> {
        match condition {
            Condition::Leaf(leaf) => self.compile_leaf(leaf),
            Condition::Group(group) => {
                if let Some((in_expr, opt)) = self.try_optimize_or_to_in(group) {
                    optimizations.push(opt);
                    return Ok(in_expr);
                }

                let mut conditions = Vec::with_capacity(group.children.len());
                for child in &group.children {
                    conditions.push(self.compile_condition(child, optimizations)?);
                }
                Ok(combine_conditions(group.combinator, conditions))
            }
            Condition::Unknown(raw) => Err(CompileError::Unrecognized(raw.to_string())),
        }
    }

    /// Turn an OR group of case-sensitive equality leaves on one field into `IN (...)`
    fn try_optimize_or_to_in(&self, group: &Group) -> Option<(SimpleExpr, Optimization)> {
        if group.combinator != Combinator::Or
            || group.children.len() < 2
            || group.children.len() < self.config.max_or_conditions_for_in
        {
            return None;
        }

        let mut field: Option<&str> = None;
        let mut values = Vec::with_capacity(group.children.len());
        for child in &group.children {
            let leaf = child.as_leaf()?;
            if leaf.operator != Operator::Eq || is_folded(leaf) {
                return None;
            }
            match field {
                Some(f) if f != leaf.field => return None,
                _ => field = Some(leaf.field.as_str()),
            }
            values.push(scalar_to_value(&leaf.value1, false));
        }

        let field = field?;
        let optimization = Optimization::OrToIn {
            field: field.to_string(),
            value_count: values.len(),
        };
        let in_expr = Expr::col(ColumnName(field.to_string())).is_in(values);
        Some((in_expr, optimization))
    }

    fn compile_leaf(&self, leaf: &Leaf) -> Result<SimpleExpr, CompileError> {
        let fold = is_folded(leaf);
        let col = if fold {
            Expr::expr(Func::lower(Expr::col(ColumnName(leaf.field.clone()))))
        } else {
            Expr::col(ColumnName(leaf.field.clone()))
        };
        let val = scalar_to_value(&leaf.value1, fold);

        let expr = match leaf.operator {
            Operator::Eq => col.eq(val),
            Operator::Ne => col.ne(val),
            Operator::Lt => col.lt(val),
            Operator::Le => col.lte(val),
            Operator::Gt => col.gt(val),
            Operator::Ge => col.gte(val),
            Operator::Contains => col.like(like_pattern("%", &leaf.value1, fold, "%")),
            Operator::StartsWith => col.like(like_pattern("", &leaf.value1, fold, "%")),
            Operator::EndsWith => col.like(like_pattern("%", &leaf.value1, fold, "")),
            Operator::Bt => {
                let high = leaf.value2.as_ref().ok_or_else(|| CompileError::MissingUpperBound {
                    field: leaf.field.clone(),
                })?;
                col.between(val, scalar_to_value(high, fold))
            }
        };

        Ok(expr)
    }
}

/// Case-insensitive comparison only applies to string values
fn is_folded(leaf: &Leaf) -> bool {
    !leaf.case_sensitive && matches!(leaf.value1, Scalar::String(_))
}

/// Combine multiple conditions; an empty AND is TRUE and an empty OR is FALSE
fn combine_conditions(combinator: Combinator, conditions: Vec<SimpleExpr>) -> SimpleExpr {
    let combined = match combinator {
        Combinator::And => conditions.into_iter().reduce(|acc, expr| acc.and(expr)),
        Combinator::Or => conditions.into_iter().reduce(|acc, expr| acc.or(expr)),
    };
    combined.unwrap_or_else(|| Expr::val(combinator == Combinator::And).into())
}

fn like_pattern(prefix: &str, value: &Scalar, fold: bool, suffix: &str) -> LikeExpr {
    let text = value.to_string();
    let text = if fold { text.to_lowercase() } else { text };
    LikeExpr::new(format!("{}{}{}", prefix, escape_like(&text), suffix)).escape('\\')
}

/// Escape LIKE wildcards with a backslash
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Convert a condition literal to a sea-query Value
fn scalar_to_value(value: &Scalar, fold: bool) -> Value {
    match value {
        Scalar::String(s) if fold => Value::String(Some(Box::new(s.to_lowercase()))),
        Scalar::String(s) => Value::String(Some(Box::new(s.clone()))),
        Scalar::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Value::BigInt(Some(*n as i64)),
        Scalar::Number(n) => Value::Double(Some(*n)),
        Scalar::Boolean(b) => Value::Bool(Some(*b)),
        Scalar::Date(d) => Value::String(Some(Box::new(d.format("%Y-%m-%d").to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eq(field: &str, value: &str) -> Condition {
        Condition::Leaf(Leaf::new(field, Operator::Eq, value))
    }

    #[test]
    fn test_simple_filter_compilation() {
        let compiler = SqlCompiler::new();
        let result = compiler.compile(Some(&eq("status", "Active")), "Projects").unwrap();

        assert!(result.sql.contains(r#"FROM "Projects""#));
        assert!(result.sql.contains(r#""status" = 'Active'"#));
        assert!(result.optimizations.is_empty());
    }

    #[test]
    fn test_no_condition_has_no_where() {
        let result = SqlCompiler::new().compile(None, "Customers").unwrap();
        assert!(!result.sql.contains("WHERE"));
    }

    #[test]
    fn test_or_to_in_optimization() {
        let compiler = SqlCompiler::with_config(OptimizationConfig {
            max_or_conditions_for_in: 3,
        });
        let condition = Condition::Group(Group::any(vec![
            eq("stage", "Open"),
            eq("stage", "Pending"),
            eq("stage", "Review"),
        ]));

        let result = compiler.compile(Some(&condition), "Opportunities").unwrap();
        assert_eq!(
            result.optimizations,
            vec![Optimization::OrToIn { field: "stage".to_string(), value_count: 3 }]
        );
        assert!(result.sql.contains(r#""stage" IN ('Open', 'Pending', 'Review')"#));
    }

    #[test]
    fn test_or_below_threshold_stays_or() {
        let condition = Condition::Group(Group::any(vec![eq("stage", "Open"), eq("stage", "Won")]));
        let result = SqlCompiler::new().compile(Some(&condition), "Opportunities").unwrap();
        assert!(result.optimizations.is_empty());
        assert!(result.sql.contains(" OR "));
    }

    #[test]
    fn test_mixed_fields_not_optimized() {
        let compiler = SqlCompiler::with_config(OptimizationConfig {
            max_or_conditions_for_in: 2,
        });
        let condition = Condition::Group(Group::any(vec![eq("stage", "Open"), eq("title", "Open")]));
        let result = compiler.compile(Some(&condition), "Opportunities").unwrap();
        assert!(result.optimizations.is_empty());
    }

    #[test]
    fn test_case_insensitive_uses_lower() {
        let condition = Condition::Leaf(Leaf::new("name", Operator::Contains, "ACME_1").with_case_sensitive(false));
        let result = SqlCompiler::new().compile(Some(&condition), "Customers").unwrap();
        assert!(result.sql.contains(r#"LOWER("name") LIKE"#));
        assert!(result.sql.contains("acme"));
        assert!(result.sql.contains("ESCAPE"));
    }

    #[test]
    fn test_between_and_numbers() {
        let condition = Condition::Group(Group::all(vec![
            Condition::Leaf(Leaf::between("amount", 100i64, 500i64)),
            Condition::Leaf(Leaf::new("probability", Operator::Ge, 0.5)),
            Condition::Leaf(Leaf::new("active", Operator::Eq, true)),
        ]));
        let result = SqlCompiler::new().compile(Some(&condition), "Opportunities").unwrap();
        assert!(result.sql.contains(r#""amount" BETWEEN 100 AND 500"#));
        assert!(result.sql.contains(r#""probability" >= 0.5"#));
        assert!(result.sql.contains(r#""active" = TRUE"#));
    }

    #[test]
    fn test_between_without_upper_bound() {
        let condition = Condition::Leaf(Leaf::new("amount", Operator::Bt, 1i64));
        let err = SqlCompiler::new().compile(Some(&condition), "Opportunities").unwrap_err();
        assert_eq!(err, CompileError::MissingUpperBound { field: "amount".to_string() });
    }

    #[test]
    fn test_unknown_node_is_error() {
        let condition = Condition::Unknown(json!([1, 2]));
        let err = SqlCompiler::new().compile(Some(&condition), "Opportunities").unwrap_err();
        assert!(matches!(err, CompileError::Unrecognized(_)));
    }

    #[test]
    fn test_like_escaping() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
