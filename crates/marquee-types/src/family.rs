//! Entity families: the unit of sync scheduling and local persistence.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::group::GroupScope;

/// One independently synced collection type.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum EntityFamily {
    Movies,
    Ratings,
    Members,
    Goals,
}

impl EntityFamily {
    /// Persistence key for this family's snapshot in `scope`,
    /// e.g. `Members.Default` or `Members.G1`.
    pub fn storage_key(&self, scope: &GroupScope) -> String {
        format!("{}.{}", self.as_ref(), scope.storage_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_storage_key_composition() {
        assert_eq!(
            EntityFamily::Members.storage_key(&GroupScope::Ungrouped),
            "Members.Default"
        );
        let g = GroupScope::invite("G1").unwrap();
        assert_eq!(EntityFamily::Goals.storage_key(&g), "Goals.G1");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(EntityFamily::from_str("ratings").unwrap(), EntityFamily::Ratings);
        assert_eq!(EntityFamily::iter().count(), 4);
    }
}
