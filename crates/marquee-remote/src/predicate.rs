//! Query predicates and sort keys.

use std::cmp::Ordering;

use marquee_types::GroupScope;
use serde::{Deserialize, Serialize};

use crate::record::{FieldValue, Record, GROUP_FIELD};

/// Filter evaluated against a record's fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches every record.
    All,
    /// Field is present and equal to the value.
    Eq(String, FieldValue),
    /// Field is absent.
    Absent(String),
    /// Field is present and equal to one of the values.
    In(String, Vec<FieldValue>),
    /// All sub-predicates match.
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    /// Records belonging to `scope`: equality on the invite code, or absence
    /// of the group field for the ungrouped scope.
    pub fn in_scope(scope: &GroupScope) -> Self {
        match scope.invite_code() {
            Some(code) => Self::eq(GROUP_FIELD, code),
            None => Self::Absent(GROUP_FIELD.to_string()),
        }
    }

    /// Conjoin with another predicate, flattening nested `And`s.
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::All, p) | (p, Predicate::All) => p,
            (Predicate::And(mut a), Predicate::And(b)) => {
                a.extend(b);
                Predicate::And(a)
            }
            (Predicate::And(mut a), p) => {
                a.push(p);
                Predicate::And(a)
            }
            (p, Predicate::And(mut b)) => {
                b.insert(0, p);
                Predicate::And(b)
            }
            (a, b) => Predicate::And(vec![a, b]),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Eq(field, value) => record.field(field).as_ref() == Some(value),
            Predicate::Absent(field) => record.field(field).is_none(),
            Predicate::In(field, values) => record
                .field(field)
                .is_some_and(|v| values.iter().any(|candidate| *candidate == v)),
            Predicate::And(preds) => preds.iter().all(|p| p.matches(record)),
        }
    }
}

/// One sort key: field name plus direction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), ascending: true }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), ascending: false }
    }
}

/// Compare two records by a list of sort keys, then by identity so the
/// order is total. Missing fields sort first.
pub fn compare_records(a: &Record, b: &Record, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ord = match (a.field(&key.field), b.field(&key.field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.sort_cmp(&y),
        };
        let ord = if key.ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.cmp(&b.id)
}

/// A query over one record type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub record_type: String,
    pub predicate: Predicate,
    pub sort: Vec<SortKey>,
}

impl Query {
    pub fn new(record_type: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            record_type: record_type.into(),
            predicate,
            sort: Vec::new(),
        }
    }

    pub fn sorted_by(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }
}
