//! Members: the people in a group, plus which one is using this device.

use std::collections::BTreeMap;

use marquee_remote::{Fields, Record};
use marquee_types::{DecodeError, EntityFamily, GroupScope, Member, RecordId};
use serde::{Deserialize, Serialize};

use super::{millis_field, JOINED_AT_FIELD, NAME_FIELD};
use crate::coordinator::FamilySync;

/// Members sorted by casefolded name. `selected` is local to this device
/// and never pushed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberRoster {
    pub members: Vec<Member>,
    #[serde(default)]
    pub selected: Option<String>,
}

impl MemberRoster {
    /// Build a roster, dropping case-insensitive duplicates (first kept) and
    /// carrying over `selected` if that member is still present.
    pub fn from_members(members: impl IntoIterator<Item = Member>, selected: Option<&str>) -> Self {
        let mut unique: Vec<Member> = Vec::new();
        for member in members {
            if !unique.iter().any(|m| m.name_key() == member.name_key()) {
                unique.push(member);
            }
        }
        unique.sort_by_key(Member::name_key);

        let selected = selected
            .and_then(|name| unique.iter().find(|m| m.is_named(name)))
            .or_else(|| unique.first())
            .map(|m| m.name.clone());
        Self {
            members: unique,
            selected,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.is_named(name))
    }

    pub fn selected_member(&self) -> Option<&Member> {
        let name = self.selected.as_deref()?;
        self.members.iter().find(|m| m.is_named(name))
    }

    /// Add a member. Returns false if the name is blank or already taken.
    pub fn add(&mut self, member: Member) -> bool {
        if member.name.is_empty() || self.contains(&member.name) {
            return false;
        }
        let selected = self.selected.clone();
        let members = std::mem::take(&mut self.members).into_iter().chain([member]);
        *self = Self::from_members(members, selected.as_deref());
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<Member> {
        let pos = self.members.iter().position(|m| m.is_named(name))?;
        let removed = self.members.remove(pos);
        let selected = self.selected.clone();
        *self = Self::from_members(std::mem::take(&mut self.members), selected.as_deref());
        Some(removed)
    }

    /// Select a member by name. Returns false if no such member exists.
    pub fn select(&mut self, name: &str) -> bool {
        match self.members.iter().find(|m| m.is_named(name)) {
            Some(member) => {
                self.selected = Some(member.name.clone());
                true
            }
            None => false,
        }
    }
}

pub struct MemberFamily;

impl FamilySync for MemberFamily {
    type Collection = MemberRoster;
    type Item = Member;

    const FAMILY: EntityFamily = EntityFamily::Members;
    const RECORD_TYPE: &'static str = "Member";

    fn items(roster: &MemberRoster, scope: &GroupScope) -> BTreeMap<RecordId, Member> {
        roster
            .members
            .iter()
            .map(|m| (m.identity(scope), m.clone()))
            .collect()
    }

    fn encode(member: &Member, _roster: &MemberRoster) -> Result<Fields, DecodeError> {
        let mut fields = Fields::new();
        fields.insert(NAME_FIELD.into(), member.name.as_str().into());
        fields.insert(JOINED_AT_FIELD.into(), millis_field(member.joined_at));
        Ok(fields)
    }

    fn decode(record: &Record) -> Result<Member, DecodeError> {
        let name = record
            .text(NAME_FIELD)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or(DecodeError::MissingField(NAME_FIELD))?;
        let joined_at = record
            .int(JOINED_AT_FIELD)
            .map(|v| u64::try_from(v).unwrap_or(0))
            .unwrap_or(0);
        Ok(Member {
            name: name.to_string(),
            joined_at,
        })
    }

    fn assemble(members: Vec<Member>, previous: &MemberRoster, _records: &[Record]) -> MemberRoster {
        MemberRoster::from_members(members, previous.selected.as_deref())
    }
}
