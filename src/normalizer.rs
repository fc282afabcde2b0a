//! Filter tree normalization.
//!
//! Within every group, leaf children on the same field are merged into one OR
//! sub-group (deduplicated, first occurrence wins) placed where the field first
//! appears. Nested groups are normalized on their own and kept as children; they are
//! never flattened into the parent's buckets unless they reduce to a single leaf.
//! Under an OR group the bucket's leaves stay direct children, since a nested OR
//! would add nothing. Single-child groups collapse to the child and empty groups
//! disappear.

use crate::condition::{Combinator, Condition, Group, Leaf, Operator};
use std::collections::{HashMap, HashSet};

/// A rewrite applied while normalizing, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite {
    /// A case-sensitive leaf on a case-insensitive field was relaxed
    CaseInsensitive { field: String },
    DuplicateRemoved { field: String, operator: Operator },
    /// Several leaves on one field were combined with OR
    SameFieldMerged { field: String, condition_count: usize },
    /// A group with a single remaining child was replaced by that child
    GroupCollapsed { combinator: Combinator },
    EmptyGroupDropped,
    PassedThrough,
}

/// Result of [`FilterNormalizer::normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOutcome {
    pub condition: Option<Condition>,
    pub rewrites: Vec<Rewrite>,
}

/// Normalizer bound to the set of fields that compare case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct FilterNormalizer {
    case_insensitive_fields: HashSet<String>,
}

impl FilterNormalizer {
    pub fn new<I, S>(case_insensitive_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            case_insensitive_fields: case_insensitive_fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn case_insensitive_fields(&self) -> &HashSet<String> {
        &self.case_insensitive_fields
    }

    pub fn normalize(&self, tree: Option<&Condition>) -> NormalizeOutcome {
        let mut pass = Pass::new(&self.case_insensitive_fields);
        let condition = tree.and_then(|node| pass.node(node));
        tracing::trace!(rewrites = pass.rewrites.len(), "filter tree normalized");
        NormalizeOutcome {
            condition,
            rewrites: pass.rewrites,
        }
    }
}

/// Normalizes `tree`, forcing leaves on `case_insensitive_fields` to compare
/// case-insensitively. Returns `None` when there is nothing left to filter on.
pub fn normalize(tree: Option<&Condition>, case_insensitive_fields: &HashSet<String>) -> Option<Condition> {
    let mut pass = Pass::new(case_insensitive_fields);
    tree.and_then(|node| pass.node(node))
}

/// One slot of a group's output: either a same-field bucket or a standalone node.
enum Slot {
    Bucket(Vec<Leaf>),
    Node(Condition),
}

struct Pass<'a> {
    case_insensitive_fields: &'a HashSet<String>,
    rewrites: Vec<Rewrite>,
}

impl<'a> Pass<'a> {
    fn new(case_insensitive_fields: &'a HashSet<String>) -> Self {
        Self {
            case_insensitive_fields,
            rewrites: Vec::new(),
        }
    }

    fn record(&mut self, rewrite: Rewrite) {
        tracing::debug!(?rewrite, "filter rewrite");
        self.rewrites.push(rewrite);
    }

    fn node(&mut self, node: &Condition) -> Option<Condition> {
        match node {
            Condition::Leaf(leaf) => Some(Condition::Leaf(self.leaf(leaf))),
            Condition::Group(group) => self.group(group),
            Condition::Unknown(raw) => {
                self.record(Rewrite::PassedThrough);
                Some(Condition::Unknown(raw.clone()))
            }
        }
    }

    fn leaf(&mut self, leaf: &Leaf) -> Leaf {
        let mut out = leaf.clone();
        if out.case_sensitive && self.case_insensitive_fields.contains(&out.field) {
            out.case_sensitive = false;
            self.record(Rewrite::CaseInsensitive {
                field: out.field.clone(),
            });
        }
        out
    }

    fn group(&mut self, group: &Group) -> Option<Condition> {
        let mut slots: Vec<Slot> = Vec::new();
        let mut buckets: HashMap<String, usize> = HashMap::new();

        for child in &group.children {
            // Nested groups that reduce to a single leaf join the buckets like any leaf.
            let leaf = match child {
                Condition::Leaf(leaf) => self.leaf(leaf),
                _ => match self.node(child) {
                    Some(Condition::Leaf(leaf)) => leaf,
                    Some(node) => {
                        slots.push(Slot::Node(node));
                        continue;
                    }
                    None => continue,
                },
            };

            match buckets.get(&leaf.field) {
                Some(&index) => {
                    if let Slot::Bucket(leaves) = &mut slots[index] {
                        if leaves.iter().any(|kept| kept.is_duplicate_of(&leaf)) {
                            self.record(Rewrite::DuplicateRemoved {
                                field: leaf.field.clone(),
                                operator: leaf.operator,
                            });
                        } else {
                            leaves.push(leaf);
                        }
                    }
                }
                None => {
                    buckets.insert(leaf.field.clone(), slots.len());
                    slots.push(Slot::Bucket(vec![leaf]));
                }
            }
        }

        let mut children = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Slot::Bucket(mut leaves) if leaves.len() == 1 => {
                    if let Some(leaf) = leaves.pop() {
                        children.push(Condition::Leaf(leaf));
                    }
                }
                Slot::Bucket(leaves) => {
                    self.record(Rewrite::SameFieldMerged {
                        field: leaves[0].field.clone(),
                        condition_count: leaves.len(),
                    });
                    let leaves = leaves.into_iter().map(Condition::Leaf);
                    if group.combinator == Combinator::Or {
                        children.extend(leaves);
                    } else {
                        children.push(Condition::Group(Group::any(leaves.collect())));
                    }
                }
                Slot::Node(node) => children.push(node),
            }
        }

        match children.len() {
            0 => {
                self.record(Rewrite::EmptyGroupDropped);
                None
            }
            1 => {
                self.record(Rewrite::GroupCollapsed {
                    combinator: group.combinator,
                });
                children.pop()
            }
            _ => Some(Condition::Group(Group::new(group.combinator, children))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(field: &str, op: Operator, value: &str) -> Condition {
        Condition::Leaf(Leaf::new(field, op, value))
    }

    fn num(field: &str, value: i64) -> Condition {
        Condition::Leaf(Leaf::new(field, Operator::Eq, value))
    }

    fn and(children: Vec<Condition>) -> Condition {
        Condition::Group(Group::all(children))
    }

    fn or(children: Vec<Condition>) -> Condition {
        Condition::Group(Group::any(children))
    }

    fn no_fields() -> HashSet<String> {
        HashSet::new()
    }

    fn sample_trees() -> Vec<Condition> {
        vec![
            num("a", 1),
            and(vec![num("a", 1), num("a", 1), num("b", 2)]),
            and(vec![
                leaf("status", Operator::Eq, "Active"),
                leaf("status", Operator::Eq, "Closed"),
                leaf("name", Operator::Contains, "Acme"),
            ]),
            or(vec![num("a", 1), num("a", 2), num("b", 3)]),
            and(vec![
                or(vec![
                    leaf("name", Operator::Contains, "x"),
                    leaf("city", Operator::Contains, "x"),
                ]),
                and(vec![num("a", 1)]),
                and(vec![]),
                Condition::Unknown(json!({ "odd": true })),
                num("a", 2),
            ]),
            and(vec![and(vec![and(vec![num("deep", 1), num("deep", 1)])])]),
        ]
    }

    #[test]
    fn test_null_input() {
        assert_eq!(normalize(None, &no_fields()), None);
        let fields: HashSet<String> = ["name".to_string()].into_iter().collect();
        assert_eq!(normalize(None, &fields), None);
    }

    #[test]
    fn test_dedup_identical_leaves() {
        let tree = and(vec![
            leaf("status", Operator::Eq, "Active"),
            leaf("status", Operator::Eq, "Active"),
        ]);
        let out = normalize(Some(&tree), &no_fields());
        assert_eq!(out, Some(leaf("status", Operator::Eq, "Active")));
    }

    #[test]
    fn test_same_field_grouped_with_or() {
        let tree = and(vec![
            leaf("status", Operator::Eq, "Active"),
            leaf("status", Operator::Eq, "Closed"),
            leaf("name", Operator::Contains, "Acme"),
        ]);
        let out = normalize(Some(&tree), &no_fields()).unwrap();
        assert_eq!(
            out,
            and(vec![
                or(vec![
                    leaf("status", Operator::Eq, "Active"),
                    leaf("status", Operator::Eq, "Closed"),
                ]),
                leaf("name", Operator::Contains, "Acme"),
            ])
        );
    }

    #[test]
    fn test_case_propagation() {
        let fields: HashSet<String> = ["name".to_string()].into_iter().collect();
        let tree = and(vec![
            leaf("name", Operator::Eq, "Acme"),
            leaf("status", Operator::Eq, "Active"),
        ]);
        let out = normalize(Some(&tree), &fields).unwrap();
        let group = out.as_group().unwrap();
        let name = group.children[0].as_leaf().unwrap();
        let status = group.children[1].as_leaf().unwrap();
        assert!(!name.case_sensitive);
        assert!(status.case_sensitive);
    }

    #[test]
    fn test_case_insensitive_leaf_stays_insensitive_outside_set() {
        let tree = Condition::Leaf(Leaf::new("code", Operator::Eq, "x").with_case_sensitive(false));
        let out = normalize(Some(&tree), &no_fields()).unwrap();
        assert!(!out.as_leaf().unwrap().case_sensitive);
    }

    #[test]
    fn test_single_child_collapses() {
        let tree = and(vec![leaf("status", Operator::Eq, "Active")]);
        assert_eq!(
            normalize(Some(&tree), &no_fields()),
            Some(leaf("status", Operator::Eq, "Active"))
        );
    }

    #[test]
    fn test_empty_groups_vanish() {
        assert_eq!(normalize(Some(&and(vec![])), &no_fields()), None);
        let nested = and(vec![or(vec![]), and(vec![and(vec![])])]);
        assert_eq!(normalize(Some(&nested), &no_fields()), None);
    }

    #[test]
    fn test_unknown_node_keeps_position() {
        let raw = json!({ "sPath": "legacy" });
        let tree = and(vec![
            num("a", 1),
            Condition::Unknown(raw.clone()),
            num("b", 2),
        ]);
        let out = normalize(Some(&tree), &no_fields()).unwrap();
        assert_eq!(
            out,
            and(vec![num("a", 1), Condition::Unknown(raw), num("b", 2)])
        );
    }

    #[test]
    fn test_unknown_root_passes_through() {
        let raw = Condition::Unknown(json!("not a filter"));
        assert_eq!(normalize(Some(&raw), &no_fields()), Some(raw.clone()));
    }

    #[test]
    fn test_end_to_end_duplicate_removal() {
        let tree = and(vec![num("a", 1), num("a", 1), num("b", 2)]);
        let out = normalize(Some(&tree), &no_fields()).unwrap();
        assert_eq!(out, and(vec![num("a", 1), num("b", 2)]));
    }

    #[test]
    fn test_nested_groups_are_not_flattened() {
        let search = or(vec![
            leaf("name", Operator::Contains, "acme"),
            leaf("city", Operator::Contains, "acme"),
        ]);
        let tree = and(vec![
            leaf("name", Operator::Eq, "Acme"),
            search.clone(),
            leaf("name", Operator::Eq, "Beta"),
        ]);
        let out = normalize(Some(&tree), &no_fields()).unwrap();
        assert_eq!(
            out,
            and(vec![
                or(vec![
                    leaf("name", Operator::Eq, "Acme"),
                    leaf("name", Operator::Eq, "Beta"),
                ]),
                search,
            ])
        );
    }

    #[test]
    fn test_nested_group_reduced_to_leaf_joins_bucket() {
        let tree = and(vec![num("a", 1), or(vec![num("a", 2)]), and(vec![num("a", 1)])]);
        let out = normalize(Some(&tree), &no_fields()).unwrap();
        assert_eq!(out, or(vec![num("a", 1), num("a", 2)]));
    }

    #[test]
    fn test_or_parent_keeps_bucket_flat() {
        let tree = or(vec![num("a", 1), num("b", 3), num("a", 2), num("a", 1)]);
        let out = normalize(Some(&tree), &no_fields()).unwrap();
        assert_eq!(out, or(vec![num("a", 1), num("a", 2), num("b", 3)]));
        assert_eq!(normalize(Some(&out), &no_fields()), Some(out.clone()));
    }

    #[test]
    fn test_dedup_keeps_first_occurrence_order() {
        let tree = or(vec![num("a", 3), num("a", 1), num("a", 3), num("a", 2), num("a", 1)]);
        let out = normalize(Some(&tree), &no_fields()).unwrap();
        assert_eq!(out, or(vec![num("a", 3), num("a", 1), num("a", 2)]));
    }

    #[test]
    fn test_dedup_ignores_case_flag() {
        let tree = and(vec![
            Condition::Leaf(Leaf::new("name", Operator::Eq, "Acme")),
            Condition::Leaf(Leaf::new("name", Operator::Eq, "Acme").with_case_sensitive(false)),
        ]);
        let out = normalize(Some(&tree), &no_fields()).unwrap();
        assert!(out.as_leaf().unwrap().case_sensitive);
    }

    #[test]
    fn test_field_identity_is_case_sensitive() {
        let tree = and(vec![num("Name", 1), num("name", 1)]);
        let out = normalize(Some(&tree), &no_fields()).unwrap();
        assert_eq!(out, and(vec![num("Name", 1), num("name", 1)]));
    }

    #[test]
    fn test_idempotent() {
        let fields: HashSet<String> = ["name".to_string(), "city".to_string()].into_iter().collect();
        for tree in sample_trees() {
            let once = normalize(Some(&tree), &fields);
            let twice = normalize(once.as_ref(), &fields);
            assert_eq!(once, twice, "not idempotent for {}", tree);
        }
    }

    #[test]
    fn test_deterministic_and_non_destructive() {
        for tree in sample_trees() {
            let before = tree.clone();
            let first = normalize(Some(&tree), &no_fields());
            let second = normalize(Some(&tree), &no_fields());
            assert_eq!(first, second);
            assert_eq!(tree, before);
        }
    }

    #[test]
    fn test_outcome_reports_rewrites() {
        let normalizer = FilterNormalizer::new(["name"]);
        let tree = and(vec![
            leaf("name", Operator::Eq, "Acme"),
            leaf("name", Operator::Eq, "Acme"),
            leaf("name", Operator::Eq, "Beta"),
            Condition::Unknown(json!(42)),
        ]);
        let outcome = normalizer.normalize(Some(&tree));

        assert_eq!(
            outcome.rewrites,
            vec![
                Rewrite::CaseInsensitive { field: "name".to_string() },
                Rewrite::CaseInsensitive { field: "name".to_string() },
                Rewrite::DuplicateRemoved { field: "name".to_string(), operator: Operator::Eq },
                Rewrite::CaseInsensitive { field: "name".to_string() },
                Rewrite::PassedThrough,
                Rewrite::SameFieldMerged { field: "name".to_string(), condition_count: 2 },
            ]
        );
        assert_eq!(outcome.condition, normalize(Some(&tree), normalizer.case_insensitive_fields()));
    }

    #[test]
    fn test_outcome_reports_collapse() {
        let normalizer = FilterNormalizer::default();
        let outcome = normalizer.normalize(Some(&and(vec![num("a", 1), and(vec![])])));
        assert_eq!(outcome.condition, Some(num("a", 1)));
        assert_eq!(
            outcome.rewrites,
            vec![
                Rewrite::EmptyGroupDropped,
                Rewrite::GroupCollapsed { combinator: Combinator::And },
            ]
        );
    }
}
