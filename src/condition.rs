//! Filter condition tree: leaf predicates on a field and AND/OR groups.
//!
//! The serde shape follows what list/table delegates receive from their UI
//! collaborators (`field`/`path`, `children`/`filters`). Anything that is neither a
//! leaf nor a group deserializes into [`Condition::Unknown`] and is carried verbatim.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A node of a filter tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// Single field-operator-value predicate
    Leaf(Leaf),
    /// Boolean combination of child conditions
    Group(Group),
    /// Uninterpretable node, kept as received
    Unknown(serde_json::Value),
}

/// A single `field operator value` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaf {
    #[serde(alias = "path")]
    pub field: String,
    pub operator: Operator,
    pub value1: Scalar,
    /// Upper bound, only meaningful for [`Operator::Bt`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value2: Option<Scalar>,
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
}

fn default_case_sensitive() -> bool {
    true
}

/// Children combined with one combinator.
///
/// The combinator is read from `combinator` (`"AND"`/`"OR"`) or from the boolean
/// `and` flag of the `filters` shape, where `false` means OR. Without either it is AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default, alias = "and", deserialize_with = "deserialize_combinator")]
    pub combinator: Combinator,
    #[serde(alias = "filters")]
    pub children: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

fn deserialize_combinator<'de, D>(deserializer: D) -> Result<Combinator, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Named(Combinator),
        AndFlag(bool),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Named(combinator) => combinator,
        Repr::AndFlag(true) => Combinator::And,
        Repr::AndFlag(false) => Combinator::Or,
    })
}

/// Comparison operators understood by the query builders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "EQ")]
    Eq,
    #[serde(rename = "NE")]
    Ne,
    #[serde(rename = "LT")]
    Lt,
    #[serde(rename = "LE")]
    Le,
    #[serde(rename = "GT")]
    Gt,
    #[serde(rename = "GE")]
    Ge,
    Contains,
    StartsWith,
    EndsWith,
    /// Between `value1` and `value2`, both inclusive
    #[serde(rename = "BT")]
    Bt,
}

/// Literal value of a leaf.
///
/// JSON input never produces [`Scalar::Date`]; ISO dates arriving as JSON strings stay
/// strings. Dates come from the filter DSL or from code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Boolean(bool),
    Number(f64),
    String(String),
    #[serde(skip_deserializing)]
    Date(NaiveDate),
}

impl Condition {
    pub fn as_leaf(&self) -> Option<&Leaf> {
        match self {
            Condition::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Condition::Group(group) => Some(group),
            _ => None,
        }
    }
}

impl From<Leaf> for Condition {
    fn from(leaf: Leaf) -> Self {
        Condition::Leaf(leaf)
    }
}

impl From<Group> for Condition {
    fn from(group: Group) -> Self {
        Condition::Group(group)
    }
}

impl Leaf {
    /// Case-sensitive leaf without an upper bound.
    pub fn new(field: impl Into<String>, operator: Operator, value1: impl Into<Scalar>) -> Self {
        Self {
            field: field.into(),
            operator,
            value1: value1.into(),
            value2: None,
            case_sensitive: true,
        }
    }

    /// Inclusive range leaf.
    pub fn between(field: impl Into<String>, low: impl Into<Scalar>, high: impl Into<Scalar>) -> Self {
        Self {
            value2: Some(high.into()),
            ..Self::new(field, Operator::Bt, low)
        }
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Two leaves are duplicates when field, operator and the stringified values match.
    /// `case_sensitive` is ignored.
    pub fn is_duplicate_of(&self, other: &Leaf) -> bool {
        self.field == other.field
            && self.operator == other.operator
            && self.value1.to_string() == other.value1.to_string()
            && self.value2.as_ref().map(Scalar::to_string) == other.value2.as_ref().map(Scalar::to_string)
    }
}

impl Group {
    pub fn new(combinator: Combinator, children: Vec<Condition>) -> Self {
        Self { combinator, children }
    }

    pub fn all(children: Vec<Condition>) -> Self {
        Self::new(Combinator::And, children)
    }

    pub fn any(children: Vec<Condition>) -> Self {
        Self::new(Combinator::Or, children)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value as f64)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Boolean(value)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(value: NaiveDate) -> Self {
        Scalar::Date(value)
    }
}

/// Stringified form used for duplicate detection and by the serializers.
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) => f.write_str(s),
            Scalar::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Boolean(b) => write!(f, "{}", b),
            Scalar::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Eq => "EQ",
            Operator::Ne => "NE",
            Operator::Lt => "LT",
            Operator::Le => "LE",
            Operator::Gt => "GT",
            Operator::Ge => "GE",
            Operator::Contains => "Contains",
            Operator::StartsWith => "StartsWith",
            Operator::EndsWith => "EndsWith",
            Operator::Bt => "BT",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combinator::And => f.write_str("AND"),
            Combinator::Or => f.write_str("OR"),
        }
    }
}

fn fmt_literal(value: &Scalar, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        Scalar::String(s) => write!(f, "{:?}", s),
        other => write!(f, "{}", other),
    }
}

/// Compact one-line rendering, e.g. `AND(OR(status EQ "A", status EQ "B"), age GT 3)`.
impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Leaf(leaf) => {
                write!(f, "{} {} ", leaf.field, leaf.operator)?;
                fmt_literal(&leaf.value1, f)?;
                if let Some(value2) = &leaf.value2 {
                    f.write_str("..")?;
                    fmt_literal(value2, f)?;
                }
                Ok(())
            }
            Condition::Group(group) => {
                write!(f, "{}(", group.combinator)?;
                for (i, child) in group.children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", child)?;
                }
                f.write_str(")")
            }
            Condition::Unknown(raw) => write!(f, "{}", raw),
        }
    }
}
