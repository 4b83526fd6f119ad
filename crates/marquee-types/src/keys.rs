//! Deterministic identity derivation.
//!
//! Two devices that independently create "the same" logical entity (member
//! "Alice" in group G, Bob's rating of movie M) must land on one remote
//! record. Identities are therefore derived, not minted:
//!
//! ```text
//! scope_ns = uuid_v5(MARQUEE_NS, scope tag)
//! id       = uuid_v5(scope_ns, normalize(natural key))
//! ```
//!
//! Hashing the scope into its own namespace first means a scope and a key can
//! never be confused through concatenation. Natural keys are human-entered, so
//! they are trimmed and lowercased before hashing.

use crate::group::GroupScope;
use crate::ids::{MovieId, RecordId};

/// Fixed root namespace for all Marquee identities.
const MARQUEE_NS: uuid::Uuid = uuid::uuid!("6d1f0c3a-94b2-4e57-a0c8-2b7e5f913d40");

/// Trim and lowercase a UTF-8 natural key. Non-UTF-8 keys are used verbatim.
pub fn normalize_key(natural_key: &[u8]) -> Vec<u8> {
    match std::str::from_utf8(natural_key) {
        Ok(s) => s.trim().to_lowercase().into_bytes(),
        Err(_) => natural_key.to_vec(),
    }
}

fn scope_namespace(scope: &GroupScope) -> uuid::Uuid {
    uuid::Uuid::new_v5(&MARQUEE_NS, &scope.derivation_bytes())
}

/// Derive the record identity for `natural_key` within `scope`.
///
/// Deterministic across processes and devices. An empty key is valid and
/// yields an identity distinct from every non-empty key.
pub fn derive_identity(scope: &GroupScope, natural_key: &[u8]) -> RecordId {
    let ns = scope_namespace(scope);
    RecordId::from(uuid::Uuid::new_v5(&ns, &normalize_key(natural_key)))
}

/// Identity of a group member, case-insensitive on the name.
pub fn member_identity(scope: &GroupScope, name: &str) -> RecordId {
    let key = format!("member:{}", name.trim().to_lowercase());
    derive_identity(scope, key.as_bytes())
}

/// Identity of one reviewer's rating of one movie.
pub fn rating_identity(scope: &GroupScope, movie: MovieId, reviewer: &str) -> RecordId {
    let key = format!("rating:{}:{}", movie, reviewer.trim().to_lowercase());
    derive_identity(scope, key.as_bytes())
}

/// Identity of the annual goal for `year`.
pub fn annual_goal_identity(scope: &GroupScope, year: i32) -> RecordId {
    let key = format!("goal:annual:{year}");
    derive_identity(scope, key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g1() -> GroupScope {
        GroupScope::invite("G1").unwrap()
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = derive_identity(&g1(), b"alice");
        let b = derive_identity(&g1(), b"alice");
        assert_eq!(a, b);
    }

    #[test]
    fn test_case_and_whitespace_collapse() {
        assert_eq!(
            derive_identity(&g1(), b"Alice"),
            derive_identity(&g1(), b"  alice ")
        );
        assert_eq!(member_identity(&g1(), "Alice"), member_identity(&g1(), " ALICE"));
    }

    #[test]
    fn test_scope_separates_identities() {
        let other = GroupScope::invite("G2").unwrap();
        assert_ne!(derive_identity(&g1(), b"alice"), derive_identity(&other, b"alice"));
        assert_ne!(
            derive_identity(&g1(), b"alice"),
            derive_identity(&GroupScope::Ungrouped, b"alice")
        );
    }

    #[test]
    fn test_empty_key_is_valid_and_distinct() {
        let empty = derive_identity(&g1(), b"");
        assert!(!empty.as_uuid().is_nil());
        assert_ne!(empty, derive_identity(&g1(), b"x"));
        // whitespace-only normalizes to empty
        assert_eq!(empty, derive_identity(&g1(), b"   "));
    }

    #[test]
    fn test_non_utf8_keys_hash_verbatim() {
        let a = derive_identity(&g1(), &[0xff, 0xfe]);
        let b = derive_identity(&g1(), &[0xff, 0xfe]);
        assert_eq!(a, b);
        assert_ne!(a, derive_identity(&g1(), &[0xfe, 0xff]));
    }

    #[test]
    fn test_rating_identity_per_movie_and_reviewer() {
        let m1 = MovieId::new();
        let m2 = MovieId::new();
        assert_eq!(rating_identity(&g1(), m1, "Ana"), rating_identity(&g1(), m1, "ana "));
        assert_ne!(rating_identity(&g1(), m1, "Ana"), rating_identity(&g1(), m2, "Ana"));
        assert_ne!(rating_identity(&g1(), m1, "Ana"), rating_identity(&g1(), m1, "Bob"));
    }

    #[test]
    fn test_families_do_not_collide() {
        // A member literally named "goal:annual:2024" must not alias the goal.
        assert_ne!(
            member_identity(&g1(), "goal:annual:2024"),
            annual_goal_identity(&g1(), 2024)
        );
        assert_eq!(annual_goal_identity(&g1(), 2024), annual_goal_identity(&g1(), 2024));
        assert_ne!(annual_goal_identity(&g1(), 2024), annual_goal_identity(&g1(), 2025));
    }
}
