//! Ratings: one per reviewer per movie.

use std::collections::BTreeMap;

use marquee_remote::{FieldValue, Fields, GROUP_FIELD, Record};
use marquee_types::{DecodeError, EntityFamily, GroupScope, MovieId, Rating, RecordId};
use serde::{Deserialize, Serialize};

use super::{MOVIE_ID_FIELD, PAYLOAD_FIELD, REVIEWER_FIELD};
use crate::coordinator::{FamilySync, SyncCoordinator, decode_records};
use crate::error::SyncResult;

/// Ratings grouped by movie. Within a movie, reviewers are unique
/// case-insensitively and ordered by their casefolded name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingBook {
    by_movie: BTreeMap<MovieId, Vec<Rating>>,
}

impl RatingBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collapse ratings to one per (movie, reviewer). The later `rated_at`
    /// wins; on a tie the one seen last wins.
    pub fn from_ratings(ratings: impl IntoIterator<Item = Rating>) -> Self {
        let mut book = Self::new();
        for rating in ratings {
            book.merge_rating(rating);
        }
        book
    }

    /// Merge two books with the same rule as [`from_ratings`](Self::from_ratings),
    /// `b` counting as seen after `a`.
    pub fn combine(a: &RatingBook, b: &RatingBook) -> RatingBook {
        Self::from_ratings(a.iter().chain(b.iter()).cloned())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rating> {
        self.by_movie.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_movie.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_movie.is_empty()
    }

    pub fn for_movie(&self, movie: MovieId) -> &[Rating] {
        self.by_movie.get(&movie).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Mean score for a movie, if anyone rated it.
    pub fn average(&self, movie: MovieId) -> Option<f32> {
        let ratings = self.for_movie(movie);
        if ratings.is_empty() {
            return None;
        }
        Some(ratings.iter().map(|r| r.score).sum::<f32>() / ratings.len() as f32)
    }

    /// Set a reviewer's rating, replacing any earlier one regardless of time.
    pub fn rate(&mut self, rating: Rating) {
        let slot = self.by_movie.entry(rating.movie_id).or_default();
        let key = rating.reviewer_key();
        slot.retain(|r| r.reviewer_key() != key);
        slot.push(rating);
        slot.sort_by_key(Rating::reviewer_key);
    }

    /// Insert under the last-wins rule.
    fn merge_rating(&mut self, rating: Rating) {
        let slot = self.by_movie.entry(rating.movie_id).or_default();
        let key = rating.reviewer_key();
        match slot.iter_mut().find(|r| r.reviewer_key() == key) {
            Some(existing) if existing.rated_at > rating.rated_at => {}
            Some(existing) => *existing = rating,
            None => {
                slot.push(rating);
                slot.sort_by_key(Rating::reviewer_key);
            }
        }
    }

    pub fn remove(&mut self, movie: MovieId, reviewer: &str) -> Option<Rating> {
        let key = reviewer.trim().to_lowercase();
        let slot = self.by_movie.get_mut(&movie)?;
        let pos = slot.iter().position(|r| r.reviewer_key() == key)?;
        let removed = slot.remove(pos);
        if slot.is_empty() {
            self.by_movie.remove(&movie);
        }
        Some(removed)
    }

    /// Only the ratings of `movies`.
    pub fn restricted_to(&self, movies: &[MovieId]) -> RatingBook {
        Self {
            by_movie: self
                .by_movie
                .iter()
                .filter(|(id, _)| movies.contains(id))
                .map(|(id, ratings)| (*id, ratings.clone()))
                .collect(),
        }
    }
}

pub struct RatingFamily;

impl FamilySync for RatingFamily {
    type Collection = RatingBook;
    type Item = Rating;

    const FAMILY: EntityFamily = EntityFamily::Ratings;
    const RECORD_TYPE: &'static str = "Rating";

    fn items(book: &RatingBook, scope: &GroupScope) -> BTreeMap<RecordId, Rating> {
        book.iter().map(|r| (r.identity(scope), r.clone())).collect()
    }

    fn encode(rating: &Rating, _book: &RatingBook) -> Result<Fields, DecodeError> {
        let mut fields = Fields::new();
        fields.insert(PAYLOAD_FIELD.into(), rating.encode_payload()?.into());
        fields.insert(MOVIE_ID_FIELD.into(), rating.movie_id.to_string().into());
        fields.insert(REVIEWER_FIELD.into(), rating.reviewer_key().into());
        Ok(fields)
    }

    fn decode(record: &Record) -> Result<Rating, DecodeError> {
        let payload = record
            .bytes(PAYLOAD_FIELD)
            .ok_or(DecodeError::MissingField(PAYLOAD_FIELD))?;
        let rating = Rating::decode_payload(payload)?;
        let scope = GroupScope::from_code(record.group())
            .map_err(|e| DecodeError::invalid(GROUP_FIELD, e.to_string()))?;
        if rating.identity(&scope) != record.id {
            return Err(DecodeError::invalid(PAYLOAD_FIELD, "rating identity does not match record"));
        }
        Ok(rating)
    }

    fn assemble(ratings: Vec<Rating>, _previous: &RatingBook, _records: &[Record]) -> RatingBook {
        RatingBook::from_ratings(ratings)
    }

    fn server_is_newer(local: &Rating, server: &Record) -> bool {
        Self::decode(server).is_ok_and(|remote| remote.rated_at > local.rated_at)
    }
}

impl SyncCoordinator<RatingFamily> {
    /// Fetch the ratings of specific movies in `scope`, in chunks.
    pub async fn fetch_for_movies(
        &self,
        scope: &GroupScope,
        movies: &[MovieId],
    ) -> SyncResult<RatingBook> {
        let values: Vec<FieldValue> = movies.iter().map(|m| m.to_string().into()).collect();
        let records = self
            .record_store()
            .fetch_where_in(scope, MOVIE_ID_FIELD, &values)
            .await?;
        let (ratings, _) = decode_records::<RatingFamily>(&records, scope);
        Ok(RatingBook::from_ratings(ratings.into_iter().map(|(_, r)| r)))
    }
}
