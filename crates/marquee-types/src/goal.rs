//! Viewing goals and the versioned custom-goal envelope.
//!
//! Annual goals are a plain `year → target` mapping with derived identities.
//! Custom goals are heterogeneous and carry their own [`GoalId`]; they are
//! persisted (locally and in remote payloads) inside a [`GoalEnvelope`].
//!
//! # Envelope versions
//!
//! ```text
//! v2  { "version": 2, "decade_goals": [..], "actor_goals": [..] }   read-only
//! v3  { "version": 3, "goals": [ {"kind": "decade", ..}, .. ] }    read + write
//! ```
//!
//! [`GoalEnvelope::decode`] upgrades v2 to v3 once, at load time. Nothing
//! downstream ever sees a version number.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::group::GroupScope;
use crate::ids::{GoalId, RecordId};

/// The only envelope version ever written.
pub const GOAL_ENVELOPE_VERSION: u32 = 3;

/// Target number of movies to watch in a calendar year.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnualGoal {
    pub year: i32,
    pub target: u32,
}

impl AnnualGoal {
    pub fn identity(&self, scope: &GroupScope) -> RecordId {
        crate::keys::annual_goal_identity(scope, self.year)
    }
}

/// A custom goal. New variants are added here and nowhere else.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CustomGoal {
    /// Watch `target` movies released in the decade starting at `decade`.
    Decade { id: GoalId, decade: u16, target: u32 },
    /// Watch `target` movies featuring `actor`.
    Actor { id: GoalId, actor: String, target: u32 },
}

impl CustomGoal {
    pub fn decade(decade: u16, target: u32) -> Self {
        Self::Decade {
            id: GoalId::new(),
            decade: decade - decade % 10,
            target,
        }
    }

    pub fn actor(actor: impl Into<String>, target: u32) -> Self {
        Self::Actor {
            id: GoalId::new(),
            actor: actor.into().trim().to_string(),
            target,
        }
    }

    pub fn id(&self) -> GoalId {
        match self {
            Self::Decade { id, .. } | Self::Actor { id, .. } => *id,
        }
    }

    pub fn target(&self) -> u32 {
        match self {
            Self::Decade { target, .. } | Self::Actor { target, .. } => *target,
        }
    }

    /// Short human description, e.g. `1980s` or `Actor: Toshiro Mifune`.
    pub fn label(&self) -> String {
        match self {
            Self::Decade { decade, .. } => format!("{decade}s"),
            Self::Actor { actor, .. } => format!("Actor: {actor}"),
        }
    }
}

// ── Envelope ────────────────────────────────────────────────────────────────

/// Current-shape custom goal envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalEnvelope {
    pub version: u32,
    pub goals: Vec<CustomGoal>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

#[derive(Deserialize)]
struct EnvelopeV2 {
    #[serde(default)]
    decade_goals: Vec<DecadeGoalV2>,
    #[serde(default)]
    actor_goals: Vec<ActorGoalV2>,
}

#[derive(Deserialize)]
struct DecadeGoalV2 {
    id: GoalId,
    decade: u16,
    target: u32,
}

#[derive(Deserialize)]
struct ActorGoalV2 {
    id: GoalId,
    actor: String,
    target: u32,
}

impl EnvelopeV2 {
    /// Decade goals first, then actor goals, each in stored order.
    fn upgrade(self) -> GoalEnvelope {
        let decades = self.decade_goals.into_iter().map(|g| CustomGoal::Decade {
            id: g.id,
            decade: g.decade,
            target: g.target,
        });
        let actors = self.actor_goals.into_iter().map(|g| CustomGoal::Actor {
            id: g.id,
            actor: g.actor,
            target: g.target,
        });
        GoalEnvelope::new(decades.chain(actors).collect())
    }
}

impl GoalEnvelope {
    pub fn new(goals: Vec<CustomGoal>) -> Self {
        Self {
            version: GOAL_ENVELOPE_VERSION,
            goals,
        }
    }

    /// Decode any supported version, upgrading to the current shape.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let probe: VersionProbe = serde_json::from_slice(bytes)?;
        match probe.version {
            2 => Ok(serde_json::from_slice::<EnvelopeV2>(bytes)?.upgrade()),
            GOAL_ENVELOPE_VERSION => {
                let envelope: GoalEnvelope = serde_json::from_slice(bytes)?;
                Ok(envelope)
            }
            other => Err(DecodeError::UnsupportedVersion(other)),
        }
    }

    /// Encode as the current version.
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        let current = GoalEnvelope::new(self.goals.clone());
        Ok(serde_json::to_vec(&current)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v2_upgrades_to_unified_list() {
        let decade = GoalId::new();
        let actor = GoalId::new();
        let v2 = serde_json::json!({
            "version": 2,
            "decade_goals": [{ "id": decade, "decade": 1980, "target": 12 }],
            "actor_goals": [{ "id": actor, "actor": "Toshiro Mifune", "target": 5 }],
        });
        let envelope = GoalEnvelope::decode(&serde_json::to_vec(&v2).unwrap()).unwrap();

        assert_eq!(envelope.version, GOAL_ENVELOPE_VERSION);
        assert_eq!(
            envelope.goals,
            vec![
                CustomGoal::Decade { id: decade, decade: 1980, target: 12 },
                CustomGoal::Actor { id: actor, actor: "Toshiro Mifune".into(), target: 5 },
            ]
        );
    }

    #[test]
    fn test_v2_with_missing_lists() {
        let bytes = br#"{"version": 2}"#;
        assert!(GoalEnvelope::decode(bytes).unwrap().goals.is_empty());
    }

    #[test]
    fn test_v3_roundtrip_writes_v3() {
        let envelope = GoalEnvelope::new(vec![CustomGoal::decade(1994, 3), CustomGoal::actor("Gong Li", 4)]);
        let bytes = envelope.encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["version"], 3);
        assert_eq!(json["goals"][0]["kind"], "decade");
        assert_eq!(GoalEnvelope::decode(&bytes).unwrap(), envelope);
    }

    #[test]
    fn test_unknown_version_is_error() {
        let bytes = br#"{"version": 7, "goals": []}"#;
        assert!(matches!(
            GoalEnvelope::decode(bytes),
            Err(DecodeError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn test_decade_is_floored() {
        assert_eq!(CustomGoal::decade(1994, 3).label(), "1990s");
    }
}
