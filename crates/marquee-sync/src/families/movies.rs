//! Movies: watched and to-watch shelves.

use std::collections::BTreeMap;

use marquee_remote::{Fields, Record};
use marquee_types::{DecodeError, EntityFamily, GroupScope, Movie, MovieId, RecordId};
use serde::{Deserialize, Serialize};

use super::{millis_field, BACKLOG_FIELD, GROUP_NAME_FIELD, MODIFIED_AT_FIELD, PAYLOAD_FIELD};
use crate::coordinator::FamilySync;

/// The group's movies, split into watched and backlog, each ordered by
/// `added_at`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieShelf {
    pub watched: Vec<Movie>,
    pub backlog: Vec<Movie>,
    /// Group display name, written alongside each movie so other devices
    /// can learn it.
    #[serde(default)]
    pub group_name: Option<String>,
}

impl MovieShelf {
    /// Build a shelf from movies in any order. A movie appearing twice keeps
    /// the copy with the newest `modified_at`.
    pub fn from_movies(movies: impl IntoIterator<Item = Movie>, group_name: Option<String>) -> Self {
        let mut shelf = Self {
            watched: Vec::new(),
            backlog: Vec::new(),
            group_name,
        };
        for movie in newest_by_id(movies).into_values() {
            if movie.is_backlog {
                shelf.backlog.push(movie);
            } else {
                shelf.watched.push(movie);
            }
        }
        shelf.sort();
        shelf
    }

    fn sort(&mut self) {
        for part in [&mut self.watched, &mut self.backlog] {
            part.sort_by(|a, b| a.added_at.cmp(&b.added_at).then(a.id.cmp(&b.id)));
        }
    }

    pub fn len(&self) -> usize {
        self.watched.len() + self.backlog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty() && self.backlog.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Movie> {
        self.watched.iter().chain(self.backlog.iter())
    }

    pub fn get(&self, id: MovieId) -> Option<&Movie> {
        self.iter().find(|m| m.id == id)
    }

    /// Add or replace a movie, placing it on the shelf its flag selects.
    pub fn insert(&mut self, movie: Movie) {
        self.remove(movie.id);
        if movie.is_backlog {
            self.backlog.push(movie);
        } else {
            self.watched.push(movie);
        }
        self.sort();
    }

    pub fn remove(&mut self, id: MovieId) -> Option<Movie> {
        let mut removed = None;
        for part in [&mut self.watched, &mut self.backlog] {
            if let Some(pos) = part.iter().position(|m| m.id == id) {
                removed = Some(part.remove(pos));
            }
        }
        removed
    }

    /// Move a movie between shelves. Returns false if it is not here.
    pub fn set_backlog(&mut self, id: MovieId, is_backlog: bool) -> bool {
        let Some(mut movie) = self.remove(id) else {
            return false;
        };
        movie.set_backlog(is_backlog);
        self.insert(movie);
        true
    }
}

fn newest_by_id(movies: impl IntoIterator<Item = Movie>) -> BTreeMap<MovieId, Movie> {
    let mut by_id: BTreeMap<MovieId, Movie> = BTreeMap::new();
    for movie in movies {
        match by_id.get(&movie.id) {
            Some(existing) if existing.modified_at > movie.modified_at => {}
            _ => {
                by_id.insert(movie.id, movie);
            }
        }
    }
    by_id
}

pub struct MovieFamily;

impl FamilySync for MovieFamily {
    type Collection = MovieShelf;
    type Item = Movie;

    const FAMILY: EntityFamily = EntityFamily::Movies;
    const RECORD_TYPE: &'static str = "Movie";

    fn items(shelf: &MovieShelf, _scope: &GroupScope) -> BTreeMap<RecordId, Movie> {
        newest_by_id(shelf.iter().cloned())
            .into_iter()
            .map(|(id, movie)| (RecordId::from(id), movie))
            .collect()
    }

    fn encode(movie: &Movie, shelf: &MovieShelf) -> Result<Fields, DecodeError> {
        let mut fields = Fields::new();
        fields.insert(PAYLOAD_FIELD.into(), movie.encode_payload()?.into());
        fields.insert(BACKLOG_FIELD.into(), movie.is_backlog.into());
        fields.insert(MODIFIED_AT_FIELD.into(), millis_field(movie.modified_at));
        if let Some(name) = shelf.group_name.as_deref().filter(|n| !n.is_empty()) {
            fields.insert(GROUP_NAME_FIELD.into(), name.into());
        }
        Ok(fields)
    }

    fn decode(record: &Record) -> Result<Movie, DecodeError> {
        let payload = record
            .bytes(PAYLOAD_FIELD)
            .ok_or(DecodeError::MissingField(PAYLOAD_FIELD))?;
        let movie = Movie::decode_payload(payload)?;
        if RecordId::from(movie.id) != record.id {
            return Err(DecodeError::invalid(PAYLOAD_FIELD, "movie id does not match record"));
        }
        Ok(movie)
    }

    fn assemble(movies: Vec<Movie>, previous: &MovieShelf, records: &[Record]) -> MovieShelf {
        let adopted = records
            .iter()
            .filter_map(|r| r.text(GROUP_NAME_FIELD))
            .map(str::trim)
            .find(|n| !n.is_empty())
            .map(str::to_string);
        MovieShelf::from_movies(movies, adopted.or_else(|| previous.group_name.clone()))
    }

    fn display_name(shelf: &MovieShelf) -> Option<&str> {
        shelf.group_name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_remote::GROUP_FIELD;

    fn record_for(movie: &Movie, group_name: Option<&str>) -> Record {
        let shelf = MovieShelf {
            group_name: group_name.map(str::to_string),
            ..MovieShelf::default()
        };
        let mut record = Record::new("Movie", RecordId::from(movie.id));
        record.fields = MovieFamily::encode(movie, &shelf).unwrap();
        record.set(GROUP_FIELD, "G1");
        record
    }

    #[test]
    fn test_partition_and_order() {
        let mut a = Movie::new("A", false);
        a.added_at = 30;
        let mut b = Movie::new("B", true);
        b.added_at = 10;
        let mut c = Movie::new("C", false);
        c.added_at = 20;

        let shelf = MovieShelf::from_movies([a.clone(), b.clone(), c.clone()], None);
        assert_eq!(shelf.watched, vec![c, a]);
        assert_eq!(shelf.backlog, vec![b]);
    }

    #[test]
    fn test_same_movie_in_both_partitions_keeps_newest() {
        let mut watched = Movie::new("Heat", false);
        watched.modified_at = 100;
        let mut backlog = watched.clone();
        backlog.is_backlog = true;
        backlog.modified_at = 200;

        let shelf = MovieShelf {
            watched: vec![watched],
            backlog: vec![backlog.clone()],
            group_name: None,
        };
        let items = MovieFamily::items(&shelf, &GroupScope::Ungrouped);
        assert_eq!(items.len(), 1);
        assert!(items.values().all(|m| m.is_backlog));

        let rebuilt = MovieFamily::assemble(items.into_values().collect(), &shelf, &[]);
        assert!(rebuilt.watched.is_empty());
        assert_eq!(rebuilt.backlog, vec![backlog]);
    }

    #[test]
    fn test_record_roundtrip_and_group_name_adoption() {
        let movie = Movie::new("Tampopo", false).with_year(1985);
        let record = record_for(&movie, Some("Friday Club"));
        assert_eq!(record.bool(BACKLOG_FIELD), Some(false));

        let decoded = MovieFamily::decode(&record).unwrap();
        assert_eq!(decoded, movie);

        let shelf = MovieFamily::assemble(vec![decoded], &MovieShelf::default(), &[record]);
        assert_eq!(MovieFamily::display_name(&shelf), Some("Friday Club"));
    }

    #[test]
    fn test_decode_rejects_mismatched_identity() {
        let movie = Movie::new("Ran", false);
        let mut record = record_for(&movie, None);
        record.id = RecordId::new();
        assert!(matches!(
            MovieFamily::decode(&record),
            Err(DecodeError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_set_backlog_moves_between_shelves() {
        let movie = Movie::new("Stalker", true);
        let mut shelf = MovieShelf::default();
        shelf.insert(movie.clone());
        assert!(shelf.set_backlog(movie.id, false));
        assert!(shelf.backlog.is_empty());
        assert_eq!(shelf.watched.len(), 1);
        assert!(!shelf.set_backlog(MovieId::new(), true));
    }
}
