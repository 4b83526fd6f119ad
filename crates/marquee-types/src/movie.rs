//! Movies: the watched / to-watch collection.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::ids::MovieId;

/// A movie on the group's shelf.
///
/// `is_backlog` selects the partition: `true` = to-watch, `false` = watched.
/// The descriptive fields travel as an opaque payload blob; only the id,
/// backlog flag, and timestamps are mirrored as indexed record fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub year: Option<u16>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub runtime_minutes: Option<u32>,
    pub genres: Vec<String>,
    pub is_backlog: bool,
    /// Unix millis when first added on any device.
    pub added_at: u64,
    /// Unix millis of the last local edit. Breaks watched/backlog ties.
    pub modified_at: u64,
}

impl Movie {
    /// A new movie with a fresh identity.
    pub fn new(title: impl Into<String>, is_backlog: bool) -> Self {
        let now = crate::now_millis();
        Self {
            id: MovieId::new(),
            title: title.into(),
            year: None,
            overview: None,
            poster_path: None,
            runtime_minutes: None,
            genres: Vec::new(),
            is_backlog,
            added_at: now,
            modified_at: now,
        }
    }

    pub fn with_year(mut self, year: u16) -> Self {
        self.year = Some(year);
        self
    }

    /// Move between watched and backlog, bumping `modified_at`.
    pub fn set_backlog(&mut self, is_backlog: bool) {
        self.is_backlog = is_backlog;
        self.modified_at = crate::now_millis();
    }

    /// Encode the payload blob stored on the remote record.
    pub fn encode_payload(&self) -> Result<Vec<u8>, DecodeError> {
        Ok(postcard::to_stdvec(self)?)
    }

    pub fn decode_payload(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_roundtrip() {
        let mut movie = Movie::new("Paprika", true).with_year(2006);
        movie.genres = vec!["Animation".into(), "Sci-Fi".into()];
        let bytes = movie.encode_payload().unwrap();
        assert_eq!(Movie::decode_payload(&bytes).unwrap(), movie);
    }

    #[test]
    fn test_garbage_payload_is_error() {
        assert!(matches!(
            Movie::decode_payload(&[0xff, 0xff, 0xff]),
            Err(DecodeError::Payload(_))
        ));
    }

    #[test]
    fn test_set_backlog_bumps_modified() {
        let mut movie = Movie::new("Heat", true);
        movie.modified_at = 0;
        movie.set_backlog(false);
        assert!(!movie.is_backlog);
        assert!(movie.modified_at > 0);
    }
}
