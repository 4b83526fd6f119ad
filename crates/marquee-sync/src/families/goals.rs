//! Viewing goals: one target per year, plus custom decade and actor goals.
//!
//! Annual goals are plain records keyed by a derived identity. Each custom
//! goal is its own record whose payload is a versioned [`GoalEnvelope`]
//! holding that one goal, so older clients' v2 payloads still decode.

use std::collections::BTreeMap;

use marquee_remote::{Fields, Record};
use marquee_types::{
    annual_goal_identity, AnnualGoal, CustomGoal, DecodeError, EntityFamily, GoalEnvelope, GoalId,
    GroupScope, RecordId,
};
use serde::{Deserialize, Serialize};

use super::{KIND_FIELD, PAYLOAD_FIELD, TARGET_FIELD, YEAR_FIELD};
use crate::coordinator::FamilySync;

const KIND_ANNUAL: &str = "annual";
const KIND_CUSTOM: &str = "custom";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalBook {
    /// year → number of movies to watch.
    pub annual: BTreeMap<i32, u32>,
    /// Ordered by label, then id.
    pub custom: Vec<CustomGoal>,
}

impl GoalBook {
    pub fn from_items(items: impl IntoIterator<Item = GoalItem>) -> Self {
        let mut book = Self::default();
        for item in items {
            match item {
                GoalItem::Annual(goal) => {
                    book.annual.insert(goal.year, goal.target);
                }
                GoalItem::Custom(goal) => {
                    book.custom.retain(|g| g.id() != goal.id());
                    book.custom.push(goal);
                }
            }
        }
        book.sort();
        book
    }

    fn sort(&mut self) {
        self.custom
            .sort_by(|a, b| a.label().cmp(&b.label()).then(a.id().cmp(&b.id())));
    }

    pub fn is_empty(&self) -> bool {
        self.annual.is_empty() && self.custom.is_empty()
    }

    pub fn annual_target(&self, year: i32) -> Option<u32> {
        self.annual.get(&year).copied()
    }

    /// Set the target for `year`; a target of zero clears it.
    pub fn set_annual(&mut self, year: i32, target: u32) {
        if target == 0 {
            self.annual.remove(&year);
        } else {
            self.annual.insert(year, target);
        }
    }

    pub fn add_custom(&mut self, goal: CustomGoal) {
        self.custom.retain(|g| g.id() != goal.id());
        self.custom.push(goal);
        self.sort();
    }

    pub fn remove_custom(&mut self, id: GoalId) -> Option<CustomGoal> {
        let pos = self.custom.iter().position(|g| g.id() == id)?;
        Some(self.custom.remove(pos))
    }
}

/// One goal record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalItem {
    Annual(AnnualGoal),
    Custom(CustomGoal),
}

pub struct GoalFamily;

impl FamilySync for GoalFamily {
    type Collection = GoalBook;
    type Item = GoalItem;

    const FAMILY: EntityFamily = EntityFamily::Goals;
    const RECORD_TYPE: &'static str = "Goal";

    fn items(book: &GoalBook, scope: &GroupScope) -> BTreeMap<RecordId, GoalItem> {
        let annual = book.annual.iter().map(|(&year, &target)| {
            (
                annual_goal_identity(scope, year),
                GoalItem::Annual(AnnualGoal { year, target }),
            )
        });
        let custom = book
            .custom
            .iter()
            .map(|g| (RecordId::from(g.id()), GoalItem::Custom(g.clone())));
        annual.chain(custom).collect()
    }

    fn encode(item: &GoalItem, _book: &GoalBook) -> Result<Fields, DecodeError> {
        let mut fields = Fields::new();
        match item {
            GoalItem::Annual(goal) => {
                fields.insert(KIND_FIELD.into(), KIND_ANNUAL.into());
                fields.insert(YEAR_FIELD.into(), i64::from(goal.year).into());
                fields.insert(TARGET_FIELD.into(), i64::from(goal.target).into());
            }
            GoalItem::Custom(goal) => {
                let envelope = GoalEnvelope::new(vec![goal.clone()]);
                fields.insert(KIND_FIELD.into(), KIND_CUSTOM.into());
                fields.insert(PAYLOAD_FIELD.into(), envelope.encode()?.into());
            }
        }
        Ok(fields)
    }

    fn decode(record: &Record) -> Result<GoalItem, DecodeError> {
        match record.text(KIND_FIELD) {
            Some(KIND_ANNUAL) => {
                let year = record.int(YEAR_FIELD).ok_or(DecodeError::MissingField(YEAR_FIELD))?;
                let target = record
                    .int(TARGET_FIELD)
                    .ok_or(DecodeError::MissingField(TARGET_FIELD))?;
                Ok(GoalItem::Annual(AnnualGoal {
                    year: i32::try_from(year)
                        .map_err(|_| DecodeError::invalid(YEAR_FIELD, "out of range"))?,
                    target: u32::try_from(target)
                        .map_err(|_| DecodeError::invalid(TARGET_FIELD, "out of range"))?,
                }))
            }
            Some(KIND_CUSTOM) | None => {
                let payload = record
                    .bytes(PAYLOAD_FIELD)
                    .ok_or(DecodeError::MissingField(PAYLOAD_FIELD))?;
                let envelope = GoalEnvelope::decode(payload)?;
                envelope
                    .goals
                    .into_iter()
                    .find(|g| RecordId::from(g.id()) == record.id)
                    .map(GoalItem::Custom)
                    .ok_or_else(|| DecodeError::invalid(PAYLOAD_FIELD, "envelope lacks this goal"))
            }
            Some(other) => Err(DecodeError::invalid(KIND_FIELD, format!("unknown kind '{other}'"))),
        }
    }

    fn assemble(items: Vec<GoalItem>, _previous: &GoalBook, _records: &[Record]) -> GoalBook {
        GoalBook::from_items(items)
    }
}
