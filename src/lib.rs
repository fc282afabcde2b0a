//! Filter tree normalization for metadata-driven OData list and table delegates.
//!
//! Raw conditions from filter bars, table personalization and free-text search are
//! merged into one tree, normalized by [`normalize`] and rendered as an OData
//! `$filter` or a SQL query.

pub mod condition;
pub mod config;
pub mod lexer;
pub mod metadata;
pub mod normalizer;
pub mod odata;
pub mod parser;
pub mod pipeline;
pub mod sql_compiler;
pub mod token;

pub use condition::{Combinator, Condition, Group, Leaf, Operator, Scalar};
pub use normalizer::{normalize, FilterNormalizer, NormalizeOutcome, Rewrite};
