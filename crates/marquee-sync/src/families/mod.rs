//! The four synced entity families and their merge rules.
//!
//! | Family  | Record type | Identity                     | Merge rule                         |
//! |---------|-------------|------------------------------|------------------------------------|
//! | Movies  | `Movie`     | `MovieId` (random)           | partition by backlog, newest wins  |
//! | Ratings | `Rating`    | derived: movie + reviewer    | per reviewer, latest `rated_at`    |
//! | Members | `Member`    | derived: name                | casefolded sort, keep selection    |
//! | Goals   | `Goal`      | derived: year / `GoalId`     | annual map + enveloped custom list |

pub mod goals;
pub mod members;
pub mod movies;
pub mod ratings;

pub use goals::{GoalBook, GoalFamily, GoalItem};
pub use members::{MemberFamily, MemberRoster};
pub use movies::{MovieFamily, MovieShelf};
pub use ratings::{RatingBook, RatingFamily};

// Indexed record fields.
pub const PAYLOAD_FIELD: &str = "payload";
pub const BACKLOG_FIELD: &str = "backlog";
pub const MODIFIED_AT_FIELD: &str = "modified_at";
pub const GROUP_NAME_FIELD: &str = "group_name";
pub const MOVIE_ID_FIELD: &str = "movie_id";
pub const REVIEWER_FIELD: &str = "reviewer";
pub const NAME_FIELD: &str = "name";
pub const JOINED_AT_FIELD: &str = "joined_at";
pub const KIND_FIELD: &str = "kind";
pub const YEAR_FIELD: &str = "year";
pub const TARGET_FIELD: &str = "target";

/// Millisecond timestamps are stored as signed record integers.
pub(crate) fn millis_field(value: u64) -> marquee_remote::FieldValue {
    marquee_remote::FieldValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
}
