//! Multi-device convergence tests.
//!
//! Each "device" is a `SyncEngine` with its own blob store, all sharing one
//! remote. Background pushes are awaited with `settle()` so the tests are
//! deterministic.
//!
//! # Tiers
//!
//! - **Tier 1:** Two devices in one group converging through the remote
//! - **Tier 2:** Failure handling: failed pulls, failed saves, bootstrap
//! - **Tier 3:** Pull control: throttle, single-flight, scope changes and
//!   pushes landing mid-pull
//! - **Tier 4:** Durable backends: file blobs + SQLite remote across restarts

use std::sync::Arc;
use std::time::Duration;

use marquee_remote::{MemoryRemote, RemoteStore, SqliteRemote};
use marquee_sync::{
    BlobStore, FileBlobStore, MemoryBlobStore, PullOutcome, PullPhase, SkipReason, SyncConfig,
    SyncEngine,
};
use marquee_types::{CustomGoal, EntityFamily, GroupScope, Movie, Rating, RecordId};

// ============================================================================
// Shared test setup
// ============================================================================

async fn device_with(remote: Arc<dyn RemoteStore>, blobs: Arc<dyn BlobStore>) -> SyncEngine {
    SyncEngine::open(remote, blobs, SyncConfig::default())
        .await
        .unwrap()
}

async fn device_configured(remote: &Arc<MemoryRemote>, code: &str, config: SyncConfig) -> SyncEngine {
    let engine = SyncEngine::open(remote.clone(), Arc::new(MemoryBlobStore::new()), config)
        .await
        .unwrap();
    engine
        .switch_group(GroupScope::invite(code).unwrap(), None)
        .await
        .unwrap();
    engine
}

async fn device(remote: &Arc<MemoryRemote>) -> SyncEngine {
    device_with(remote.clone(), Arc::new(MemoryBlobStore::new())).await
}

/// A device that has joined `code`.
async fn device_in(remote: &Arc<MemoryRemote>, code: &str) -> SyncEngine {
    let engine = device(remote).await;
    engine
        .switch_group(GroupScope::invite(code).unwrap(), None)
        .await
        .unwrap();
    engine
}

fn rating_at(movie: &Movie, reviewer: &str, score: f32, at: u64) -> Rating {
    let mut rating = Rating::new(movie.id, reviewer, score);
    rating.rated_at = at;
    rating
}

// ============================================================================
// Tier 1: convergence
// ============================================================================

#[tokio::test]
async fn test_movie_and_concurrent_ratings_converge() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device_in(&remote, "G1").await;
    let b = device_in(&remote, "G1").await;

    let m1 = Movie::new("M1", false);
    let _ = a.add_movie(m1.clone()).await;
    a.settle().await;
    assert_eq!(remote.count("Movie"), 1);

    b.refresh(EntityFamily::Movies, true).await.unwrap();
    let shelf = b.movies();
    assert_eq!(shelf.len(), 1);
    assert_eq!(shelf.watched[0].id, m1.id);
    assert!(!shelf.watched[0].is_backlog);

    // Same reviewer modulo case and whitespace, rated on both devices.
    let (_, _) = tokio::join!(
        a.rate_movie(rating_at(&m1, "Ana", 4.0, 1_000)),
        b.rate_movie(rating_at(&m1, "ana ", 9.0, 2_000)),
    );
    tokio::join!(a.settle(), b.settle());
    assert_eq!(remote.count("Rating"), 1);

    for engine in [&a, &b] {
        engine.refresh(EntityFamily::Ratings, true).await.unwrap();
        let book = engine.ratings();
        let ratings = book.for_movie(m1.id);
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].reviewer_key(), "ana");
        assert_eq!(ratings[0].score, 9.0);
    }
}

#[tokio::test]
async fn test_older_rating_loses_regardless_of_push_order() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device_in(&remote, "G1").await;
    let b = device_in(&remote, "G1").await;
    let movie = Movie::new("Paprika", false);

    // The newer rating reaches the server first.
    let _ = b.rate_movie(rating_at(&movie, "Ana", 8.0, 2_000)).await;
    b.settle().await;
    let _ = a.rate_movie(rating_at(&movie, "ANA", 3.0, 1_000)).await;
    a.settle().await;

    let report = a.status(EntityFamily::Ratings).last_push.unwrap();
    assert_eq!(report.server_won, 1);

    a.refresh(EntityFamily::Ratings, true).await.unwrap();
    assert_eq!(a.ratings().for_movie(movie.id)[0].score, 8.0);
}

#[tokio::test]
async fn test_disjoint_edits_merge() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device_in(&remote, "G1").await;
    let b = device_in(&remote, "G1").await;

    let _ = a.add_movie(Movie::new("Heat", false)).await;
    let _ = b.add_movie(Movie::new("Ran", true)).await;
    assert!(a.add_member("Alice").await.unwrap());
    assert!(b.add_member("Bob").await.unwrap());
    let _ = a.set_annual_goal(2026, 52).await;
    let _ = b.add_custom_goal(CustomGoal::decade(1970, 10)).await;
    tokio::join!(a.settle(), b.settle());

    for engine in [&a, &b] {
        for (family, outcome) in engine.refresh_all(true).await {
            assert!(outcome.is_ok(), "{family} pull failed");
        }
        assert_eq!(engine.movies().watched.len(), 1);
        assert_eq!(engine.movies().backlog.len(), 1);
        assert_eq!(engine.members().len(), 2);
        assert_eq!(engine.goals().annual_target(2026), Some(52));
        assert_eq!(engine.goals().custom.len(), 1);
    }
}

#[tokio::test]
async fn test_pulled_data_is_not_pushed_back() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device_in(&remote, "G1").await;
    let b = device_in(&remote, "G1").await;

    let _ = a.add_movie(Movie::new("Tampopo", false)).await;
    assert!(a.add_member("Alice").await.unwrap());
    a.settle().await;
    let saves = remote.stats().saves;

    b.refresh_all(true).await;
    b.settle().await;
    a.refresh_all(true).await;
    a.settle().await;

    assert_eq!(b.movies().len(), 1);
    assert_eq!(remote.stats().saves, saves);
}

#[tokio::test]
async fn test_delete_propagates() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device_in(&remote, "G1").await;
    let b = device_in(&remote, "G1").await;

    let movie = Movie::new("Stalker", false);
    let _ = a.add_movie(movie.clone()).await;
    a.settle().await;
    b.refresh(EntityFamily::Movies, true).await.unwrap();
    assert_eq!(b.movies().len(), 1);

    a.remove_movie(movie.id).await.unwrap();
    a.settle().await;
    assert_eq!(remote.count("Movie"), 0);

    b.refresh(EntityFamily::Movies, true).await.unwrap();
    assert!(b.movies().is_empty());
    assert!(a.remove_movie(movie.id).await.is_err());
}

#[tokio::test]
async fn test_groups_are_isolated() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device_in(&remote, "G1").await;
    let b = device_in(&remote, "G2").await;

    let _ = a.add_movie(Movie::new("Only in G1", false)).await;
    a.settle().await;

    b.refresh(EntityFamily::Movies, true).await.unwrap();
    assert!(b.movies().is_empty());

    b.switch_group(GroupScope::invite("G1").unwrap(), None)
        .await
        .unwrap();
    assert_eq!(b.movies().len(), 1);
    assert_eq!(b.groups().groups().len(), 2);

    // Back to G2: its own (empty) collection, nothing leaked.
    b.switch_group(GroupScope::invite("G2").unwrap(), None)
        .await
        .unwrap();
    assert!(b.movies().is_empty());
}

#[tokio::test]
async fn test_group_display_name_travels_with_movies() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device(&remote).await;
    a.switch_group(
        GroupScope::invite("G1").unwrap(),
        Some("Friday Club".to_string()),
    )
    .await
    .unwrap();
    let _ = a.add_movie(Movie::new("Heat", false)).await;
    a.settle().await;

    let b = device_in(&remote, "G1").await;
    assert_eq!(b.groups().current().display_name.as_deref(), Some("Friday Club"));
}

#[tokio::test]
async fn test_ratings_for_fetches_without_full_pull() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device_in(&remote, "G1").await;
    let b = device_in(&remote, "G1").await;

    let seen = Movie::new("Seen", false);
    let other = Movie::new("Other", false);
    let _ = a.rate_movie(rating_at(&seen, "Ana", 7.0, 10)).await;
    let _ = a.rate_movie(rating_at(&other, "Ana", 2.0, 10)).await;
    a.settle().await;

    let book = b.ratings_for(&[seen.id]).await.unwrap();
    assert_eq!(book.len(), 1);
    assert_eq!(book.average(seen.id), Some(7.0));
    assert!(b.ratings().is_empty());
}

// ============================================================================
// Tier 2: failures and bootstrap
// ============================================================================

#[tokio::test]
async fn test_failed_pull_leaves_snapshot_untouched() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device_in(&remote, "G1").await;
    let b = device_in(&remote, "G1").await;

    let _ = a.add_movie(Movie::new("First", false)).await;
    a.settle().await;
    b.refresh(EntityFamily::Movies, true).await.unwrap();
    let before = b.movies();

    let _ = a.add_movie(Movie::new("Second", false)).await;
    a.settle().await;

    remote.fail_query_page(1);
    assert!(b.refresh(EntityFamily::Movies, true).await.is_err());
    assert_eq!(b.movies(), before);
    let status = b.status(EntityFamily::Movies);
    assert_eq!(status.pull, PullPhase::Failed);
    assert!(status.last_error.is_some());

    b.refresh(EntityFamily::Movies, true).await.unwrap();
    assert_eq!(b.movies().len(), 2);
    assert_eq!(b.status(EntityFamily::Movies).pull, PullPhase::Applied);
}

#[tokio::test]
async fn test_failed_save_is_retried_by_next_push() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device_in(&remote, "G1").await;

    let movie = Movie::new("Flaky", false);
    remote.fail_record(movie.id.into());
    let _ = a.add_movie(movie.clone()).await;
    a.settle().await;
    assert_eq!(remote.count("Movie"), 0);
    assert_eq!(a.status(EntityFamily::Movies).last_push.unwrap().failed, 1);

    // A pull in between must not drop the unpushed movie.
    a.refresh(EntityFamily::Movies, true).await.unwrap();
    assert_eq!(a.movies().len(), 1);

    remote.heal_record(movie.id.into());
    let report = a.push(EntityFamily::Movies).await.unwrap();
    assert_eq!(report.upserted, 1);
    assert_eq!(remote.count("Movie"), 1);
}

#[tokio::test]
async fn test_empty_remote_is_seeded_from_local() {
    let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let first = Arc::new(MemoryRemote::new());
    let a = device_with(first.clone(), blobs.clone()).await;
    a.switch_group(GroupScope::invite("G1").unwrap(), None)
        .await
        .unwrap();
    let _ = a.add_movie(Movie::new("Survivor", false)).await;
    a.settle().await;
    drop(a);

    // Same device, but the server has lost everything.
    let wiped = Arc::new(MemoryRemote::new());
    let a = device_with(wiped.clone(), blobs).await;
    let outcome = a.refresh(EntityFamily::Movies, true).await.unwrap();
    match outcome {
        PullOutcome::Bootstrapped { pushed, fetched } => {
            assert_eq!(pushed.upserted, 1);
            assert_eq!(fetched, 1);
        }
        other => panic!("expected bootstrap, got {other:?}"),
    }
    assert_eq!(wiped.count("Movie"), 1);
    assert_eq!(a.movies().len(), 1);
}

#[tokio::test]
async fn test_empty_remote_and_empty_local_is_plain_pull() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device_in(&remote, "G1").await;
    let outcome = a.refresh(EntityFamily::Goals, true).await.unwrap();
    assert_eq!(outcome, PullOutcome::Applied { fetched: 0, skipped: 0 });
    assert_eq!(remote.stats().saves, 0);
}

// ============================================================================
// Tier 3: pull control
// ============================================================================

#[tokio::test]
async fn test_pull_is_throttled_unless_forced() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device(&remote).await;

    assert!(matches!(
        a.refresh(EntityFamily::Members, false).await.unwrap(),
        PullOutcome::Applied { .. }
    ));
    assert_eq!(
        a.refresh(EntityFamily::Members, false).await.unwrap(),
        PullOutcome::Skipped(SkipReason::Throttled)
    );
    assert!(matches!(
        a.refresh(EntityFamily::Members, true).await.unwrap(),
        PullOutcome::Applied { .. }
    ));
}

#[tokio::test]
async fn test_concurrent_pulls_are_single_flight() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device(&remote).await;
    remote.set_latency(Duration::from_millis(20));

    let (first, second) = tokio::join!(
        a.refresh(EntityFamily::Movies, true),
        a.refresh(EntityFamily::Movies, true),
    );
    assert!(matches!(first.unwrap(), PullOutcome::Applied { .. }));
    assert_eq!(second.unwrap(), PullOutcome::Skipped(SkipReason::InFlight));
}

#[tokio::test]
async fn test_pull_finishing_after_group_switch_is_discarded() {
    let remote = Arc::new(MemoryRemote::new());
    let seeder = device_in(&remote, "G1").await;
    let _ = seeder.add_movie(Movie::new("G1 only", false)).await;
    seeder.settle().await;

    let a = Arc::new(device_in(&remote, "G1").await);
    assert_eq!(a.movies().len(), 1);

    remote.set_latency(Duration::from_millis(50));
    let pulling = tokio::spawn({
        let a = a.clone();
        async move { a.refresh(EntityFamily::Movies, true).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let report = a
        .switch_group(GroupScope::invite("G2").unwrap(), None)
        .await
        .unwrap();

    assert_eq!(
        report[&EntityFamily::Movies].as_ref().unwrap(),
        &PullOutcome::Skipped(SkipReason::InFlight)
    );
    assert_eq!(pulling.await.unwrap().unwrap(), PullOutcome::Discarded);
    assert!(a.movies().is_empty());
    assert_eq!(a.current_group_scope(), GroupScope::invite("G2").unwrap());
}

#[tokio::test]
async fn test_edit_right_before_group_switch_is_pushed_to_its_group() {
    let remote = Arc::new(MemoryRemote::new());
    let g1 = GroupScope::invite("G1").unwrap();
    let a = device_in(&remote, "G1").await;
    let _ = a.add_movie(Movie::new("X", false)).await;
    a.settle().await;

    // No settle between the edit and the switch.
    let _ = a.add_movie(Movie::new("M", false)).await;
    a.switch_group(GroupScope::invite("G2").unwrap(), None)
        .await
        .unwrap();
    a.settle().await;
    a.switch_group(g1, None).await.unwrap();
    a.settle().await;

    assert_eq!(a.movies().len(), 2);
    assert_eq!(remote.count("Movie"), 2);
    let b = device_in(&remote, "G1").await;
    assert_eq!(b.movies().len(), 2);
}

#[tokio::test]
async fn test_unpushed_edit_goes_out_on_return_to_its_group() {
    let remote = Arc::new(MemoryRemote::new());
    let g1 = GroupScope::invite("G1").unwrap();
    let a = device_in(&remote, "G1").await;
    let _ = a.add_movie(Movie::new("Synced", false)).await;
    a.settle().await;

    let stuck = Movie::new("Stuck", false);
    remote.fail_record(stuck.id.into());
    let _ = a.add_movie(stuck.clone()).await;
    a.switch_group(GroupScope::invite("G2").unwrap(), None)
        .await
        .unwrap();
    assert_eq!(remote.count("Movie"), 1);

    // Coming back pulls G1; the kept local edit is pushed right after.
    remote.heal_record(stuck.id.into());
    let report = a.switch_group(g1, None).await.unwrap();
    assert!(matches!(
        report[&EntityFamily::Movies].as_ref().unwrap(),
        PullOutcome::Applied { fetched: 1, .. }
    ));
    assert!(remote.peek("Movie", stuck.id.into()).is_some());

    let b = device_in(&remote, "G1").await;
    assert!(b.movies().get(stuck.id).is_some());
}

#[tokio::test]
async fn test_delete_pushed_during_paged_pull_stays_deleted() {
    let remote = Arc::new(MemoryRemote::new());
    let config = SyncConfig {
        page_size: 1,
        ..SyncConfig::default()
    };
    let a = Arc::new(device_configured(&remote, "G1", config).await);
    let movies = [
        Movie::new("One", false),
        Movie::new("Two", false),
        Movie::new("Three", false),
    ];
    for movie in &movies {
        let _ = a.add_movie(movie.clone()).await;
    }
    a.settle().await;
    assert_eq!(remote.count("Movie"), 3);

    // Records page out in id order, so this one is on the first page.
    let victim = movies
        .iter()
        .map(|m| m.id)
        .min_by_key(|id| RecordId::from(*id))
        .unwrap();

    remote.set_latency(Duration::from_millis(40));
    let pulling = tokio::spawn({
        let a = a.clone();
        async move { a.refresh(EntityFamily::Movies, true).await }
    });
    tokio::time::sleep(Duration::from_millis(60)).await;
    a.remove_movie(victim).await.unwrap();
    a.settle().await;
    assert_eq!(remote.count("Movie"), 2);

    assert!(matches!(
        pulling.await.unwrap().unwrap(),
        PullOutcome::Applied { .. }
    ));
    assert!(a.movies().get(victim).is_none());
    assert_eq!(a.movies().len(), 2);

    // Nothing left locally that could re-create it.
    assert!(a.set_movie_backlog(victim, true).await.is_err());
    a.settle().await;
    assert_eq!(remote.count("Movie"), 2);
}

// ============================================================================
// Tier 4: durable backends
// ============================================================================

#[tokio::test]
async fn test_restart_with_files_and_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let remote: Arc<dyn RemoteStore> =
        Arc::new(SqliteRemote::open(dir.path().join("remote.db")).unwrap());
    let g1 = GroupScope::invite("G1").unwrap();

    {
        let blobs: Arc<dyn BlobStore> =
            Arc::new(FileBlobStore::open(dir.path().join("a")).await.unwrap());
        let a = device_with(remote.clone(), blobs).await;
        a.switch_group(g1.clone(), Some("Club".to_string()))
            .await
            .unwrap();
        let _ = a.add_movie(Movie::new("Persisted", true)).await;
        assert!(a.add_member("Alice").await.unwrap());
        a.settle().await;
    }

    let blobs: Arc<dyn BlobStore> =
        Arc::new(FileBlobStore::open(dir.path().join("a")).await.unwrap());
    let a = device_with(remote.clone(), blobs).await;
    assert_eq!(a.current_group_scope(), g1);
    assert_eq!(a.groups().current().display_name.as_deref(), Some("Club"));
    assert_eq!(a.movies().backlog.len(), 1);
    assert_eq!(a.members().selected.as_deref(), Some("Alice"));

    // Nothing changed while offline, so a pull pushes nothing back.
    a.refresh_all(true).await;
    a.settle().await;
    assert_eq!(a.movies().len(), 1);

    let blobs: Arc<dyn BlobStore> =
        Arc::new(FileBlobStore::open(dir.path().join("b")).await.unwrap());
    let b = device_with(remote, blobs).await;
    b.switch_group(g1, None).await.unwrap();
    assert_eq!(b.movies().backlog.len(), 1);
    assert_eq!(b.members().len(), 1);
}
