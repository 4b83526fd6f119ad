//! The sync engine: one explicitly constructed context per device.
//!
//! `SyncEngine` owns the group context and, per family, a local snapshot, a
//! record store and a coordinator. Mutations write the local snapshot with
//! `Origin::Local` and schedule a background push of the scope they landed
//! in; pulls write with `Origin::Remote` and only push local edits the
//! server has not seen yet.

use std::collections::BTreeMap;
use std::sync::Arc;

use marquee_remote::{RecordStore, RemoteStore};
use marquee_types::{
    CustomGoal, EntityFamily, GoalId, GroupScope, Member, Movie, MovieId, Rating,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::coordinator::{FamilySync, PullOutcome, PushReport, SyncCoordinator, SyncStatus};
use crate::error::{SyncError, SyncResult};
use crate::families::{
    GoalBook, GoalFamily, MemberFamily, MemberRoster, MovieFamily, MovieShelf, RatingBook,
    RatingFamily,
};
use crate::group::GroupContext;
use crate::persist::BlobStore;
use crate::snapshot::{LocalSnapshot, Origin, SnapshotWrite};

/// Per-family results of a multi-family refresh.
pub type RefreshReport = BTreeMap<EntityFamily, SyncResult<PullOutcome>>;

pub struct SyncEngine {
    groups: Arc<GroupContext>,
    movies: Arc<SyncCoordinator<MovieFamily>>,
    ratings: Arc<SyncCoordinator<RatingFamily>>,
    members: Arc<SyncCoordinator<MemberFamily>>,
    goals: Arc<SyncCoordinator<GoalFamily>>,
    /// Background pushes not yet awaited by `settle`.
    pushes: Mutex<Vec<JoinHandle<()>>>,
    switch_lock: tokio::sync::Mutex<()>,
}

async fn coordinator<F: FamilySync>(
    remote: &Arc<dyn RemoteStore>,
    blobs: &Arc<dyn BlobStore>,
    groups: &Arc<GroupContext>,
    config: &SyncConfig,
) -> Arc<SyncCoordinator<F>> {
    let store = RecordStore::new(remote.clone(), F::RECORD_TYPE)
        .page_size(config.page_size)
        .timeout(config.request_timeout);
    let snapshot =
        Arc::new(LocalSnapshot::open(F::FAMILY, blobs.clone(), groups.current_scope()).await);
    Arc::new(SyncCoordinator::new(
        store,
        snapshot,
        groups.clone(),
        blobs.clone(),
        config.clone(),
    ))
}

impl SyncEngine {
    /// Load the group registry and the active scope's snapshots. Nothing is
    /// fetched; call [`refresh_all`](Self::refresh_all) to pull.
    pub async fn open(
        remote: Arc<dyn RemoteStore>,
        blobs: Arc<dyn BlobStore>,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        let groups = Arc::new(GroupContext::load(blobs.clone()).await?);
        let engine = Self {
            movies: coordinator(&remote, &blobs, &groups, &config).await,
            ratings: coordinator(&remote, &blobs, &groups, &config).await,
            members: coordinator(&remote, &blobs, &groups, &config).await,
            goals: coordinator(&remote, &blobs, &groups, &config).await,
            groups,
            pushes: Mutex::new(Vec::new()),
            switch_lock: tokio::sync::Mutex::new(()),
        };
        info!(scope = %engine.current_group_scope(), "sync engine opened");
        Ok(engine)
    }

    pub fn groups(&self) -> &GroupContext {
        &self.groups
    }

    pub fn current_group_scope(&self) -> GroupScope {
        self.groups.current_scope()
    }

    // ── Collections ─────────────────────────────────────────────────────────

    pub fn movies(&self) -> MovieShelf {
        self.movies.snapshot().get()
    }

    pub fn ratings(&self) -> RatingBook {
        self.ratings.snapshot().get()
    }

    pub fn members(&self) -> MemberRoster {
        self.members.snapshot().get()
    }

    pub fn goals(&self) -> GoalBook {
        self.goals.snapshot().get()
    }

    pub fn subscribe_movies(&self) -> watch::Receiver<MovieShelf> {
        self.movies.snapshot().subscribe()
    }

    pub fn subscribe_ratings(&self) -> watch::Receiver<RatingBook> {
        self.ratings.snapshot().subscribe()
    }

    pub fn subscribe_members(&self) -> watch::Receiver<MemberRoster> {
        self.members.snapshot().subscribe()
    }

    pub fn subscribe_goals(&self) -> watch::Receiver<GoalBook> {
        self.goals.snapshot().subscribe()
    }

    pub fn status(&self, family: EntityFamily) -> SyncStatus {
        match family {
            EntityFamily::Movies => self.movies.status(),
            EntityFamily::Ratings => self.ratings.status(),
            EntityFamily::Members => self.members.status(),
            EntityFamily::Goals => self.goals.status(),
        }
    }

    pub fn subscribe_status(&self, family: EntityFamily) -> watch::Receiver<SyncStatus> {
        match family {
            EntityFamily::Movies => self.movies.subscribe_status(),
            EntityFamily::Ratings => self.ratings.subscribe_status(),
            EntityFamily::Members => self.members.subscribe_status(),
            EntityFamily::Goals => self.goals.subscribe_status(),
        }
    }

    pub async fn set_movies(&self, shelf: MovieShelf, origin: Origin) -> SnapshotWrite {
        let write = self.movies.snapshot().set(shelf, origin).await;
        self.after_write(&self.movies, write)
    }

    pub async fn set_ratings(&self, book: RatingBook, origin: Origin) -> SnapshotWrite {
        let write = self.ratings.snapshot().set(book, origin).await;
        self.after_write(&self.ratings, write)
    }

    pub async fn set_members(&self, roster: MemberRoster, origin: Origin) -> SnapshotWrite {
        let write = self.members.snapshot().set(roster, origin).await;
        self.after_write(&self.members, write)
    }

    pub async fn set_goals(&self, book: GoalBook, origin: Origin) -> SnapshotWrite {
        let write = self.goals.snapshot().set(book, origin).await;
        self.after_write(&self.goals, write)
    }

    fn after_write<F: FamilySync>(
        &self,
        coordinator: &Arc<SyncCoordinator<F>>,
        write: SnapshotWrite,
    ) -> SnapshotWrite {
        if write.needs_push() {
            if let Some(handle) = coordinator.schedule_push(write.scope.clone()) {
                self.pushes.lock().push(handle);
            }
        }
        write
    }

    /// Wait for every background push scheduled so far.
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.pushes.lock());
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "background push task failed");
                }
            }
        }
    }

    // ── Sync ────────────────────────────────────────────────────────────────

    pub async fn refresh(&self, family: EntityFamily, force: bool) -> SyncResult<PullOutcome> {
        match family {
            EntityFamily::Movies => self.movies.pull(force).await,
            EntityFamily::Ratings => self.ratings.pull(force).await,
            EntityFamily::Members => self.members.pull(force).await,
            EntityFamily::Goals => self.goals.pull(force).await,
        }
    }

    /// Pull every family concurrently.
    pub async fn refresh_all(&self, force: bool) -> RefreshReport {
        let (movies, ratings, members, goals) = futures::join!(
            self.movies.pull(force),
            self.ratings.pull(force),
            self.members.pull(force),
            self.goals.pull(force),
        );
        BTreeMap::from([
            (EntityFamily::Movies, movies),
            (EntityFamily::Ratings, ratings),
            (EntityFamily::Members, members),
            (EntityFamily::Goals, goals),
        ])
    }

    /// Push one family now, waiting for the result.
    pub async fn push(&self, family: EntityFamily) -> SyncResult<PushReport> {
        match family {
            EntityFamily::Movies => self.movies.push().await,
            EntityFamily::Ratings => self.ratings.push().await,
            EntityFamily::Members => self.members.push().await,
            EntityFamily::Goals => self.goals.push().await,
        }
    }

    pub async fn push_all(&self) -> BTreeMap<EntityFamily, SyncResult<PushReport>> {
        let (movies, ratings, members, goals) = futures::join!(
            self.movies.push(),
            self.ratings.push(),
            self.members.push(),
            self.goals.push(),
        );
        BTreeMap::from([
            (EntityFamily::Movies, movies),
            (EntityFamily::Ratings, ratings),
            (EntityFamily::Members, members),
            (EntityFamily::Goals, goals),
        ])
    }

    /// Make `scope` the active group, load its local collections, and pull
    /// every family. Pending pushes for the old group finish first; pulls
    /// still running for it are discarded when they finish.
    pub async fn switch_group(
        &self,
        scope: GroupScope,
        display_name: Option<String>,
    ) -> SyncResult<RefreshReport> {
        let _switching = self.switch_lock.lock().await;
        self.settle().await;
        self.groups.switch(scope.clone(), display_name).await?;
        futures::join!(
            self.movies.snapshot().load_scope(scope.clone()),
            self.ratings.snapshot().load_scope(scope.clone()),
            self.members.snapshot().load_scope(scope.clone()),
            self.goals.snapshot().load_scope(scope.clone()),
        );
        self.movies.reset_throttle();
        self.ratings.reset_throttle();
        self.members.reset_throttle();
        self.goals.reset_throttle();
        Ok(self.refresh_all(true).await)
    }

    // ── Mutations ───────────────────────────────────────────────────────────

    /// Add or replace a movie. The active group's display name is stamped on
    /// the shelf so it travels with the movie records.
    pub async fn add_movie(&self, movie: Movie) -> SnapshotWrite {
        let group_name = self.groups.current().display_name;
        let write = self
            .movies
            .snapshot()
            .update(Origin::Local, |shelf| {
                if shelf.group_name.is_none() {
                    shelf.group_name = group_name;
                }
                shelf.insert(movie);
            })
            .await;
        self.after_write(&self.movies, write)
    }

    /// Remove a movie. Its ratings are left alone.
    pub async fn remove_movie(&self, id: MovieId) -> SyncResult<Movie> {
        let mut removed = None;
        let write = self
            .movies
            .snapshot()
            .update(Origin::Local, |shelf| removed = shelf.remove(id))
            .await;
        let _ = self.after_write(&self.movies, write);
        removed.ok_or_else(|| SyncError::not_found(format!("movie {}", id.short())))
    }

    pub async fn set_movie_backlog(&self, id: MovieId, is_backlog: bool) -> SyncResult<()> {
        let mut found = false;
        let write = self
            .movies
            .snapshot()
            .update(Origin::Local, |shelf| found = shelf.set_backlog(id, is_backlog))
            .await;
        let _ = self.after_write(&self.movies, write);
        if found {
            Ok(())
        } else {
            Err(SyncError::not_found(format!("movie {}", id.short())))
        }
    }

    /// Set a reviewer's rating, replacing their previous one for the movie.
    pub async fn rate_movie(&self, rating: Rating) -> SnapshotWrite {
        let write = self
            .ratings
            .snapshot()
            .update(Origin::Local, |book| book.rate(rating))
            .await;
        self.after_write(&self.ratings, write)
    }

    pub async fn remove_rating(&self, movie: MovieId, reviewer: &str) -> SyncResult<Rating> {
        let mut removed = None;
        let write = self
            .ratings
            .snapshot()
            .update(Origin::Local, |book| removed = book.remove(movie, reviewer))
            .await;
        let _ = self.after_write(&self.ratings, write);
        removed.ok_or_else(|| SyncError::not_found(format!("rating by {reviewer}")))
    }

    /// Ratings of `movies`, fetched from the server and combined with local
    /// ones under the last-wins rule.
    pub async fn ratings_for(&self, movies: &[MovieId]) -> SyncResult<RatingBook> {
        let scope = self.current_group_scope();
        let fetched = self.ratings.fetch_for_movies(&scope, movies).await?;
        let local = self.ratings.snapshot().get().restricted_to(movies);
        Ok(RatingBook::combine(&fetched, &local))
    }

    /// Add a member. `Ok(false)` if the name is blank or already present.
    pub async fn add_member(&self, name: &str) -> SyncResult<bool> {
        let mut added = false;
        let member = Member::new(name);
        let write = self
            .members
            .snapshot()
            .update(Origin::Local, |roster| added = roster.add(member))
            .await;
        let _ = self.after_write(&self.members, write);
        Ok(added)
    }

    pub async fn remove_member(&self, name: &str) -> SyncResult<Member> {
        let mut removed = None;
        let write = self
            .members
            .snapshot()
            .update(Origin::Local, |roster| removed = roster.remove(name))
            .await;
        let _ = self.after_write(&self.members, write);
        removed.ok_or_else(|| SyncError::not_found(format!("member {name}")))
    }

    /// Choose which member is using this device. Local only.
    pub async fn select_member(&self, name: &str) -> SyncResult<()> {
        let mut found = false;
        let _ = self
            .members
            .snapshot()
            .update(Origin::Local, |roster| found = roster.select(name))
            .await;
        if found {
            Ok(())
        } else {
            Err(SyncError::not_found(format!("member {name}")))
        }
    }

    /// Set the number of movies to watch in `year`; zero clears the goal.
    pub async fn set_annual_goal(&self, year: i32, target: u32) -> SnapshotWrite {
        let write = self
            .goals
            .snapshot()
            .update(Origin::Local, |book| book.set_annual(year, target))
            .await;
        self.after_write(&self.goals, write)
    }

    pub async fn add_custom_goal(&self, goal: CustomGoal) -> SnapshotWrite {
        let write = self
            .goals
            .snapshot()
            .update(Origin::Local, |book| book.add_custom(goal))
            .await;
        self.after_write(&self.goals, write)
    }

    pub async fn remove_custom_goal(&self, id: GoalId) -> SyncResult<CustomGoal> {
        let mut removed = None;
        let write = self
            .goals
            .snapshot()
            .update(Origin::Local, |book| removed = book.remove_custom(id))
            .await;
        let _ = self.after_write(&self.goals, write);
        removed.ok_or_else(|| SyncError::not_found(format!("goal {}", id.short())))
    }
}
