//! Group members.

use serde::{Deserialize, Serialize};

use crate::group::GroupScope;
use crate::ids::RecordId;

/// A named member of a group. Names are unique per group, case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub joined_at: u64,
}

impl Member {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            joined_at: crate::now_millis(),
        }
    }

    /// Casefolded name used for dedup, ordering, and selection.
    pub fn name_key(&self) -> String {
        self.name.trim().to_lowercase()
    }

    pub fn identity(&self, scope: &GroupScope) -> RecordId {
        crate::keys::member_identity(scope, &self.name)
    }

    /// Whether `name` refers to this member.
    pub fn is_named(&self, name: &str) -> bool {
        self.name_key() == name.trim().to_lowercase()
    }
}
