//! Group scopes: the partition key of every synced collection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// Storage key used for the ungrouped (default) workspace.
pub const UNGROUPED_KEY: &str = "Default";

/// Which group a collection belongs to.
///
/// `Ungrouped` is the local default workspace; records written under it carry
/// no group field on the remote store. `Invite` holds an opaque invite code.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum GroupScope {
    #[default]
    Ungrouped,
    Invite(String),
}

impl GroupScope {
    /// Build an invite scope from a user-entered code.
    ///
    /// Surrounding whitespace is trimmed; the code is otherwise opaque and
    /// case-sensitive.
    pub fn invite(code: &str) -> Result<Self, KeyError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(KeyError::EmptyInviteCode);
        }
        if code.eq_ignore_ascii_case(UNGROUPED_KEY) {
            return Err(KeyError::ReservedInviteCode(code.to_string()));
        }
        Ok(Self::Invite(code.to_string()))
    }

    /// Scope for an optional code: `None` or blank means ungrouped.
    pub fn from_code(code: Option<&str>) -> Result<Self, KeyError> {
        match code.map(str::trim) {
            None | Some("") => Ok(Self::Ungrouped),
            Some(code) => Self::invite(code),
        }
    }

    /// The invite code, if any. This is the value stored in a record's group field.
    pub fn invite_code(&self) -> Option<&str> {
        match self {
            Self::Ungrouped => None,
            Self::Invite(code) => Some(code),
        }
    }

    pub fn is_ungrouped(&self) -> bool {
        matches!(self, Self::Ungrouped)
    }

    /// Key used when persisting per-group local data (`"Default"` or the code).
    pub fn storage_key(&self) -> &str {
        self.invite_code().unwrap_or(UNGROUPED_KEY)
    }

    /// Bytes hashed into the scope namespace during key derivation.
    ///
    /// Tagged so that no invite code can hash like the ungrouped scope.
    pub(crate) fn derivation_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ungrouped => b"ungrouped".to_vec(),
            Self::Invite(code) => {
                let mut bytes = b"invite:".to_vec();
                bytes.extend_from_slice(code.as_bytes());
                bytes
            }
        }
    }
}

impl fmt::Display for GroupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ungrouped => f.write_str("(no group)"),
            Self::Invite(code) => write!(f, "group {code}"),
        }
    }
}

/// A group the device has joined at some point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub scope: GroupScope,
    pub display_name: Option<String>,
    /// Unix millis of the first join on this device.
    pub joined_at: u64,
}

impl GroupInfo {
    pub fn new(scope: GroupScope, display_name: Option<String>) -> Self {
        Self {
            scope,
            display_name,
            joined_at: crate::now_millis(),
        }
    }

    /// Prefer the display name; fall back to the invite code.
    pub fn label(&self) -> String {
        match (&self.display_name, &self.scope) {
            (Some(name), _) if !name.is_empty() => name.clone(),
            (_, scope) => scope.storage_key().to_string(),
        }
    }
}
