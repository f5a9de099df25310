//! Relational condition trees for row-level access filtering.
//!
//! A compiled condition tree is the query-side equivalent of an access-check
//! predicate: a host splices it into a listing query's WHERE clause. The
//! always-false sentinel means "no row can ever match" and is distinct from
//! an empty tree, which means unrestricted access. [`ConditionGroup::matches`]
//! is the reference evaluation over an in-memory row.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::permission::CacheMetadata;

/// A row as seen by the condition evaluator: field name to value.
pub type Row = BTreeMap<String, Value>;

/// Comparison operator of a field condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    In,
    NotIn,
    Equals,
}

/// Conjunction of a condition group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conjunction {
    And,
    Or,
}

/// A single field comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    /// Field name in the row.
    pub field: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Values compared against. `Equals` uses the first value.
    pub values: Vec<Value>,
}

impl FieldCondition {
    /// Evaluate against a row.
    ///
    /// A missing field never satisfies `Equals`/`In`; `NotIn` treats a
    /// missing field as not excluded.
    pub fn matches(&self, row: &Row) -> bool {
        let value = row.get(&self.field);
        match self.operator {
            Operator::Equals => value == self.values.first(),
            Operator::In => value.is_some_and(|v| self.values.contains(v)),
            Operator::NotIn => !value.is_some_and(|v| self.values.contains(v)),
        }
    }
}

/// A node of the condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Field(FieldCondition),
    Group(ConditionGroup),
}

impl Condition {
    fn matches(&self, row: &Row) -> bool {
        match self {
            Condition::Field(field) => field.matches(row),
            Condition::Group(group) => group.matches(row),
        }
    }
}

/// A boolean AND/OR tree of field comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    /// How child conditions combine.
    pub conjunction: Conjunction,
    /// Child conditions.
    pub conditions: Vec<Condition>,
    /// Sentinel: no row can ever match.
    #[serde(default)]
    pub always_false: bool,
}

impl ConditionGroup {
    /// Create an empty AND group.
    pub fn and() -> Self {
        Self {
            conjunction: Conjunction::And,
            conditions: Vec::new(),
            always_false: false,
        }
    }

    /// Create an empty OR group.
    pub fn or() -> Self {
        Self {
            conjunction: Conjunction::Or,
            conditions: Vec::new(),
            always_false: false,
        }
    }

    /// Create the always-false sentinel.
    pub fn always_false() -> Self {
        Self {
            conjunction: Conjunction::And,
            conditions: Vec::new(),
            always_false: true,
        }
    }

    /// Whether this is the always-false sentinel.
    pub fn is_always_false(&self) -> bool {
        self.always_false
    }

    /// Whether this tree imposes no restriction at all.
    pub fn is_unrestricted(&self) -> bool {
        !self.always_false && self.conditions.is_empty()
    }

    /// Add a `field IN values` condition.
    pub fn field_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.conditions.push(Condition::Field(FieldCondition {
            field: field.into(),
            operator: Operator::In,
            values,
        }));
        self
    }

    /// Add a `field NOT IN values` condition.
    pub fn field_not_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.conditions.push(Condition::Field(FieldCondition {
            field: field.into(),
            operator: Operator::NotIn,
            values,
        }));
        self
    }

    /// Add a `field = value` condition.
    pub fn field_equals(mut self, field: impl Into<String>, value: Value) -> Self {
        self.conditions.push(Condition::Field(FieldCondition {
            field: field.into(),
            operator: Operator::Equals,
            values: vec![value],
        }));
        self
    }

    /// Add a nested group.
    pub fn add_group(&mut self, group: ConditionGroup) {
        self.conditions.push(Condition::Group(group));
    }

    /// Evaluate against a row.
    ///
    /// An empty, non-sentinel group matches everything.
    pub fn matches(&self, row: &Row) -> bool {
        if self.always_false {
            return false;
        }
        if self.conditions.is_empty() {
            return true;
        }
        match self.conjunction {
            Conjunction::And => self.conditions.iter().all(|c| c.matches(row)),
            Conjunction::Or => self.conditions.iter().any(|c| c.matches(row)),
        }
    }
}

/// A compiled condition tree with its cache metadata.
///
/// Cache metadata is produced even on the always-false path so the denial
/// itself can be cached and invalidated correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessConditions {
    /// The condition tree to splice into a query.
    pub conditions: ConditionGroup,
    /// Cache tags, contexts and max-age for the compiled result.
    pub cache: CacheMetadata,
}

impl AccessConditions {
    /// Conditions imposing no restriction.
    pub fn unrestricted(cache: CacheMetadata) -> Self {
        Self {
            conditions: ConditionGroup::and(),
            cache,
        }
    }

    /// Conditions from a compiled tree.
    pub fn new(conditions: ConditionGroup, cache: CacheMetadata) -> Self {
        Self { conditions, cache }
    }

    /// Whether no restriction is imposed.
    pub fn is_unrestricted(&self) -> bool {
        self.conditions.is_unrestricted()
    }

    /// Whether no row can ever match; callers short-circuit to an empty
    /// result set without running the query.
    pub fn is_always_false(&self) -> bool {
        self.conditions.is_always_false()
    }

    /// Evaluate the tree against a row.
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.matches(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_field_operators() {
        let r = row(&[("type", json!("default")), ("id", json!(3))]);

        let cond = FieldCondition {
            field: "type".to_string(),
            operator: Operator::In,
            values: vec![json!("default"), json!("other")],
        };
        assert!(cond.matches(&r));

        let cond = FieldCondition {
            field: "id".to_string(),
            operator: Operator::NotIn,
            values: vec![json!(1), json!(2)],
        };
        assert!(cond.matches(&r));

        let cond = FieldCondition {
            field: "id".to_string(),
            operator: Operator::Equals,
            values: vec![json!(3)],
        };
        assert!(cond.matches(&r));
    }

    #[test]
    fn test_missing_field_semantics() {
        let r = row(&[("id", json!(3))]);

        let present = FieldCondition {
            field: "uid".to_string(),
            operator: Operator::Equals,
            values: vec![json!(7)],
        };
        assert!(!present.matches(&r));

        // A missing field cannot be among excluded values.
        let excluded = FieldCondition {
            field: "uid".to_string(),
            operator: Operator::NotIn,
            values: vec![json!(7)],
        };
        assert!(excluded.matches(&r));
    }

    #[test]
    fn test_and_or_nesting() {
        let published_default = ConditionGroup::and()
            .field_in("type", vec![json!("default")])
            .field_equals("status", json!(true));
        let own = ConditionGroup::and()
            .field_equals("uid", json!(7))
            .field_equals("status", json!(false));

        let mut or = ConditionGroup::or();
        or.add_group(published_default);
        or.add_group(own);

        let published = row(&[
            ("type", json!("default")),
            ("status", json!(true)),
            ("uid", json!(2)),
        ]);
        assert!(or.matches(&published));

        let own_draft = row(&[
            ("type", json!("other")),
            ("status", json!(false)),
            ("uid", json!(7)),
        ]);
        assert!(or.matches(&own_draft));

        let foreign_draft = row(&[
            ("type", json!("other")),
            ("status", json!(false)),
            ("uid", json!(2)),
        ]);
        assert!(!or.matches(&foreign_draft));
    }

    #[test]
    fn test_always_false_is_distinct_from_unrestricted() {
        let denied = ConditionGroup::always_false();
        let open = ConditionGroup::and();
        let r = row(&[("id", json!(1))]);

        assert!(denied.is_always_false());
        assert!(!denied.matches(&r));
        assert!(!denied.is_unrestricted());

        assert!(open.is_unrestricted());
        assert!(open.matches(&r));
        assert!(!open.is_always_false());
    }

    #[test]
    fn test_access_conditions_carry_cache_on_denial() {
        let mut cache = CacheMetadata::permanent();
        cache.add_context("user.permissions");
        cache.add_tag("group_permissions");

        let denied = AccessConditions::new(ConditionGroup::always_false(), cache);
        assert!(denied.is_always_false());
        assert!(denied.cache.tags.contains("group_permissions"));
    }
}
