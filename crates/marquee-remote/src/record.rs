//! Schemaless remote records.
//!
//! A record is a typed map of named fields plus the identity and an opaque
//! change tag the server uses for optimistic concurrency. Entities decide
//! which fields they write; this crate only interprets the group field.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use marquee_types::RecordId;
use serde::{Deserialize, Serialize};

/// Field holding the invite code. Absent for ungrouped records.
pub const GROUP_FIELD: &str = "group";

/// Pseudo-field naming the record identity in predicates and sort keys.
pub const RECORD_ID_FIELD: &str = "$id";

/// Opaque server version of a record. Compared for equality only.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeTag(pub String);

impl fmt::Display for ChangeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single field value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Ordering used by sorted queries. Values of different kinds order by
    /// kind, so mixed columns still sort deterministically.
    pub fn sort_cmp(&self, other: &FieldValue) -> Ordering {
        use FieldValue::*;
        match (self, other) {
            (Text(a), Text(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FieldValue::Bool(_) => 0,
            FieldValue::Int(_) | FieldValue::Float(_) => 1,
            FieldValue::Text(_) => 2,
            FieldValue::Bytes(_) => 3,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Bytes(v)
    }
}

impl From<RecordId> for FieldValue {
    fn from(id: RecordId) -> Self {
        FieldValue::Text(id.to_string())
    }
}

/// Field map written by entities.
pub type Fields = BTreeMap<String, FieldValue>;

/// A remote record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_type: String,
    pub id: RecordId,
    /// `None` until the record has been saved once.
    pub change_tag: Option<ChangeTag>,
    pub fields: Fields,
}

impl Record {
    /// A fresh, never-saved record.
    pub fn new(record_type: impl Into<String>, id: RecordId) -> Self {
        Self {
            record_type: record_type.into(),
            id,
            change_tag: None,
            fields: Fields::new(),
        }
    }

    /// Apply `desired` on top of the existing fields. Fields not named in
    /// `desired` are kept as they are.
    pub fn with_fields(mut self, desired: &Fields) -> Self {
        for (name, value) in desired {
            self.fields.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Field lookup; the `$id` pseudo-field resolves to the identity.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        if name == RECORD_ID_FIELD {
            return Some(FieldValue::from(self.id));
        }
        self.fields.get(name).cloned()
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.fields.get(name) {
            Some(FieldValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.fields.get(name) {
            Some(FieldValue::Bool(v)) => Some(*v),
            // Some backends store flags as 0/1.
            Some(FieldValue::Int(v)) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        match self.fields.get(name) {
            Some(FieldValue::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    /// The invite code this record is scoped to, if any.
    pub fn group(&self) -> Option<&str> {
        self.text(GROUP_FIELD)
    }
}
