//! Subcommands and their dispatch against a [`SyncEngine`].

use std::io::Write;

use anyhow::{Result, anyhow, bail};
use clap::Subcommand;
use marquee_sync::{MovieShelf, PullOutcome, SkipReason, SyncEngine};
use marquee_types::{CustomGoal, EntityFamily, GoalId, GroupScope, Movie, MovieId, Rating};
use strum::IntoEnumIterator;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join, list, or leave groups
    #[command(subcommand)]
    Group(GroupCommand),

    /// Manage the watched list and backlog
    #[command(subcommand)]
    Movie(MovieCommand),

    /// Rate a movie (as the selected member unless --reviewer is given)
    Rate {
        /// Movie id or id prefix
        movie: String,
        score: f32,
        #[arg(long)]
        reviewer: Option<String>,
        #[arg(long)]
        comment: Option<String>,
    },

    /// Show a movie's ratings, fetched from the shared store
    Ratings {
        /// Movie id or id prefix
        movie: String,
    },

    /// Manage group members
    #[command(subcommand)]
    Member(MemberCommand),

    /// Manage viewing goals
    #[command(subcommand)]
    Goal(GoalCommand),

    /// Push local changes, then pull every collection
    Sync {
        /// Ignore the pull cooldown
        #[arg(long)]
        force: bool,
    },

    /// Show the active group and per-collection sync state
    Status,
}

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    /// Join (or switch to) a group by invite code
    Join {
        code: String,
        /// Display name for the group
        #[arg(long)]
        name: Option<String>,
    },
    /// Go back to the ungrouped collection
    Leave,
    /// List joined groups
    List,
}

#[derive(Subcommand, Debug)]
pub enum MovieCommand {
    /// Add a movie
    Add {
        title: String,
        #[arg(long)]
        year: Option<u16>,
        /// Add to the backlog instead of the watched list
        #[arg(long)]
        backlog: bool,
    },
    /// Remove a movie
    Remove { movie: String },
    /// Mark a movie as watched
    Watched { movie: String },
    /// Move a movie back to the backlog
    Backlog { movie: String },
    /// List movies
    List,
}

#[derive(Subcommand, Debug)]
pub enum MemberCommand {
    Add { name: String },
    Remove { name: String },
    /// Choose who is using this device
    Select { name: String },
    List,
}

#[derive(Subcommand, Debug)]
pub enum GoalCommand {
    /// Movies to watch in a year (0 clears)
    Annual { year: i32, target: u32 },
    /// Movies to watch from a decade, e.g. 1970
    Decade { decade: u16, target: u32 },
    /// Movies to watch featuring an actor
    Actor { actor: String, target: u32 },
    /// Remove a custom goal
    Remove { goal: String },
    List,
}

pub async fn run(engine: &SyncEngine, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Group(cmd) => group(engine, cmd, out).await,
        Command::Movie(cmd) => movie(engine, cmd, out).await,
        Command::Rate {
            movie,
            score,
            reviewer,
            comment,
        } => {
            let id = resolve_movie(&engine.movies(), &movie)?;
            let reviewer = match reviewer {
                Some(name) => name,
                None => engine
                    .members()
                    .selected_member()
                    .map(|m| m.name.clone())
                    .ok_or_else(|| anyhow!("no member selected; pass --reviewer"))?,
            };
            let mut rating = Rating::new(id, reviewer, score);
            if let Some(comment) = comment {
                rating = rating.with_comment(comment);
            }
            writeln!(out, "{} rated {:.1}", rating.reviewer, rating.score)?;
            let _ = engine.rate_movie(rating).await;
            Ok(())
        }
        Command::Ratings { movie } => {
            let id = resolve_movie(&engine.movies(), &movie)?;
            let book = engine.ratings_for(&[id]).await?;
            for rating in book.for_movie(id) {
                write!(out, "{:<16} {:>4.1}", rating.reviewer, rating.score)?;
                match &rating.comment {
                    Some(comment) => writeln!(out, "  {comment}")?,
                    None => writeln!(out)?,
                }
            }
            if let Some(avg) = book.average(id) {
                writeln!(out, "average {avg:.1}")?;
            }
            Ok(())
        }
        Command::Member(cmd) => member(engine, cmd, out).await,
        Command::Goal(cmd) => goal(engine, cmd, out).await,
        Command::Sync { force } => {
            for (family, report) in engine.push_all().await {
                match report {
                    Ok(report) if report.is_empty() => {}
                    Ok(report) => writeln!(
                        out,
                        "{family:<8} pushed {} upserted, {} deleted, {} failed",
                        report.upserted, report.deleted, report.failed
                    )?,
                    Err(e) => writeln!(out, "{family:<8} push failed: {e}")?,
                }
            }
            for (family, outcome) in engine.refresh_all(force).await {
                match outcome {
                    Ok(outcome) => writeln!(out, "{family:<8} {}", describe(&outcome))?,
                    Err(e) => writeln!(out, "{family:<8} pull failed: {e}")?,
                }
            }
            Ok(())
        }
        Command::Status => {
            writeln!(out, "group: {}", engine.groups().current().label())?;
            for family in EntityFamily::iter() {
                let status = engine.status(family);
                write!(out, "{family:<8} pull {:?}, push {:?}", status.pull, status.push)?;
                match status.last_error {
                    Some(e) => writeln!(out, " (last error: {e})")?,
                    None => writeln!(out)?,
                }
            }
            Ok(())
        }
    }
}

fn describe(outcome: &PullOutcome) -> String {
    match outcome {
        PullOutcome::Applied { fetched, skipped: 0 } => format!("{fetched} records"),
        PullOutcome::Applied { fetched, skipped } => {
            format!("{fetched} records ({skipped} unreadable, skipped)")
        }
        PullOutcome::Bootstrapped { pushed, fetched } => {
            format!("seeded {} from local, {fetched} records", pushed.upserted)
        }
        PullOutcome::Discarded => "group changed, result discarded".to_string(),
        PullOutcome::Skipped(SkipReason::InFlight) => "already pulling".to_string(),
        PullOutcome::Skipped(SkipReason::Throttled) => "pulled recently (use --force)".to_string(),
    }
}

async fn group(engine: &SyncEngine, cmd: GroupCommand, out: &mut impl Write) -> Result<()> {
    match cmd {
        GroupCommand::Join { code, name } => {
            let scope = GroupScope::invite(&code)?;
            let report = engine.switch_group(scope, name).await?;
            let failed = report.values().filter(|r| r.is_err()).count();
            writeln!(out, "now in {}", engine.groups().current().label())?;
            if failed > 0 {
                writeln!(out, "{failed} collections could not be pulled; using local data")?;
            }
        }
        GroupCommand::Leave => {
            engine.switch_group(GroupScope::Ungrouped, None).await?;
            writeln!(out, "now ungrouped")?;
        }
        GroupCommand::List => {
            let current = engine.current_group_scope();
            for info in engine.groups().groups() {
                let marker = if info.scope == current { '*' } else { ' ' };
                writeln!(out, "{marker} {:<12} {}", info.scope.storage_key(), info.label())?;
            }
        }
    }
    Ok(())
}

async fn movie(engine: &SyncEngine, cmd: MovieCommand, out: &mut impl Write) -> Result<()> {
    match cmd {
        MovieCommand::Add {
            title,
            year,
            backlog,
        } => {
            let mut movie = Movie::new(title, backlog);
            if let Some(year) = year {
                movie = movie.with_year(year);
            }
            writeln!(out, "{}  {}", movie.id.short(), movie.title)?;
            let _ = engine.add_movie(movie).await;
        }
        MovieCommand::Remove { movie } => {
            let id = resolve_movie(&engine.movies(), &movie)?;
            let removed = engine.remove_movie(id).await?;
            writeln!(out, "removed {}", removed.title)?;
        }
        MovieCommand::Watched { movie } => {
            let id = resolve_movie(&engine.movies(), &movie)?;
            engine.set_movie_backlog(id, false).await?;
        }
        MovieCommand::Backlog { movie } => {
            let id = resolve_movie(&engine.movies(), &movie)?;
            engine.set_movie_backlog(id, true).await?;
        }
        MovieCommand::List => {
            let shelf = engine.movies();
            for (heading, movies) in [("Watched", &shelf.watched), ("Backlog", &shelf.backlog)] {
                writeln!(out, "{heading} ({})", movies.len())?;
                for movie in movies {
                    match movie.year {
                        Some(year) => {
                            writeln!(out, "  {}  {} ({year})", movie.id.short(), movie.title)?
                        }
                        None => writeln!(out, "  {}  {}", movie.id.short(), movie.title)?,
                    }
                }
            }
        }
    }
    Ok(())
}

async fn member(engine: &SyncEngine, cmd: MemberCommand, out: &mut impl Write) -> Result<()> {
    match cmd {
        MemberCommand::Add { name } => {
            if !engine.add_member(&name).await? {
                bail!("'{}' is blank or already a member", name.trim());
            }
        }
        MemberCommand::Remove { name } => {
            engine.remove_member(&name).await?;
        }
        MemberCommand::Select { name } => {
            engine.select_member(&name).await?;
        }
        MemberCommand::List => {
            let roster = engine.members();
            let selected = roster.selected_member().map(|m| m.name_key());
            for m in &roster.members {
                let marker = if selected.as_ref() == Some(&m.name_key()) { '*' } else { ' ' };
                writeln!(out, "{marker} {}", m.name)?;
            }
        }
    }
    Ok(())
}

async fn goal(engine: &SyncEngine, cmd: GoalCommand, out: &mut impl Write) -> Result<()> {
    match cmd {
        GoalCommand::Annual { year, target } => {
            let _ = engine.set_annual_goal(year, target).await;
        }
        GoalCommand::Decade { decade, target } => {
            let goal = CustomGoal::decade(decade, target);
            writeln!(out, "{}  {}", goal.id().short(), goal.label())?;
            let _ = engine.add_custom_goal(goal).await;
        }
        GoalCommand::Actor { actor, target } => {
            let goal = CustomGoal::actor(actor, target);
            writeln!(out, "{}  {}", goal.id().short(), goal.label())?;
            let _ = engine.add_custom_goal(goal).await;
        }
        GoalCommand::Remove { goal } => {
            let book = engine.goals();
            let ids: Vec<GoalId> = book.custom.iter().map(CustomGoal::id).collect();
            let id = resolve_prefix(&ids, &goal, "goal")?;
            let removed = engine.remove_custom_goal(id).await?;
            writeln!(out, "removed {}", removed.label())?;
        }
        GoalCommand::List => {
            let book = engine.goals();
            for (year, target) in &book.annual {
                writeln!(out, "{year}: {target} movies")?;
            }
            for goal in &book.custom {
                writeln!(out, "{}  {}: {} movies", goal.id().short(), goal.label(), goal.target())?;
            }
        }
    }
    Ok(())
}

fn resolve_movie(shelf: &MovieShelf, query: &str) -> Result<MovieId> {
    let ids: Vec<MovieId> = shelf.iter().map(|m| m.id).collect();
    resolve_prefix(&ids, query, "movie")
}

/// Find the one id whose hex form starts with `query` (hyphens ignored).
fn resolve_prefix<T: Copy + std::fmt::Display>(ids: &[T], query: &str, what: &str) -> Result<T> {
    let needle = query.trim().replace('-', "").to_lowercase();
    if needle.is_empty() {
        bail!("empty {what} id");
    }
    let mut matches = ids
        .iter()
        .filter(|id| id.to_string().replace('-', "").starts_with(&needle));
    match (matches.next(), matches.next()) {
        (Some(id), None) => Ok(*id),
        (None, _) => bail!("no {what} matches '{query}'"),
        (Some(_), Some(_)) => bail!("'{query}' matches more than one {what}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use clap::Parser;
    use marquee_remote::MemoryRemote;
    use marquee_sync::{MemoryBlobStore, SyncConfig};

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(subcommand)]
        command: Command,
    }

    async fn engine() -> SyncEngine {
        SyncEngine::open(
            Arc::new(MemoryRemote::new()),
            Arc::new(MemoryBlobStore::new()),
            SyncConfig::default(),
        )
        .await
        .unwrap()
    }

    async fn exec(engine: &SyncEngine, argv: &[&str]) -> Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("marquee").chain(argv.iter().copied()))?;
        let mut out = Vec::new();
        run(engine, cli.command, &mut out).await?;
        engine.settle().await;
        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn test_resolve_prefix() {
        let a = MovieId::from(uuid_from("0190aa00-0000-7000-8000-000000000001"));
        let b = MovieId::from(uuid_from("0190ab00-0000-7000-8000-000000000002"));
        let ids = [a, b];
        assert_eq!(resolve_prefix(&ids, "0190AA", "movie").unwrap(), a);
        assert_eq!(resolve_prefix(&ids, &b.to_string(), "movie").unwrap(), b);
        assert!(resolve_prefix(&ids, "0190a", "movie").is_err());
        assert!(resolve_prefix(&ids, "ffff", "movie").is_err());
        assert!(resolve_prefix(&ids, " ", "movie").is_err());
    }

    fn uuid_from(s: &str) -> uuid::Uuid {
        uuid::Uuid::parse_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_movie_add_watch_and_list() {
        let engine = engine().await;
        let added = exec(&engine, &["movie", "add", "Tampopo", "--year", "1985", "--backlog"])
            .await
            .unwrap();
        let short = added.split_whitespace().next().unwrap().to_string();

        let listing = exec(&engine, &["movie", "list"]).await.unwrap();
        assert!(listing.contains("Backlog (1)"));
        assert!(listing.contains("Tampopo (1985)"));

        exec(&engine, &["movie", "watched", &short]).await.unwrap();
        let listing = exec(&engine, &["movie", "list"]).await.unwrap();
        assert!(listing.contains("Watched (1)"));
        assert!(listing.contains("Backlog (0)"));
    }

    #[tokio::test]
    async fn test_rate_uses_selected_member() {
        let engine = engine().await;
        let added = exec(&engine, &["movie", "add", "Heat"]).await.unwrap();
        let short = added.split_whitespace().next().unwrap().to_string();

        assert!(exec(&engine, &["rate", &short, "8"]).await.is_err());

        exec(&engine, &["member", "add", "Ana"]).await.unwrap();
        let rated = exec(&engine, &["rate", &short, "8", "--comment", "great"])
            .await
            .unwrap();
        assert_eq!(rated.trim(), "Ana rated 8.0");

        let ratings = exec(&engine, &["ratings", &short]).await.unwrap();
        assert!(ratings.contains("great"));
        assert!(ratings.contains("average 8.0"));
    }

    #[tokio::test]
    async fn test_group_join_and_list() {
        let engine = engine().await;
        exec(&engine, &["group", "join", "G1", "--name", "Friday Club"])
            .await
            .unwrap();
        let listing = exec(&engine, &["group", "list"]).await.unwrap();
        assert!(listing.starts_with("* G1"));
        assert!(listing.contains("Friday Club"));

        assert!(exec(&engine, &["group", "join", "default"]).await.is_err());
        exec(&engine, &["group", "leave"]).await.unwrap();
        assert!(engine.current_group_scope().is_ungrouped());
    }

    #[tokio::test]
    async fn test_goals_and_sync() {
        let engine = engine().await;
        exec(&engine, &["goal", "annual", "2026", "52"]).await.unwrap();
        let added = exec(&engine, &["goal", "decade", "1974", "5"]).await.unwrap();
        assert!(added.contains("1970s"));

        let listing = exec(&engine, &["goal", "list"]).await.unwrap();
        assert!(listing.contains("2026: 52 movies"));
        assert!(listing.contains("1970s: 5 movies"));

        let synced = exec(&engine, &["sync", "--force"]).await.unwrap();
        assert!(synced.contains("Goals"));
        assert!(!synced.contains("failed"));

        let short = added.split_whitespace().next().unwrap().to_string();
        exec(&engine, &["goal", "remove", &short]).await.unwrap();
        assert!(engine.goals().custom.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_member_is_error() {
        let engine = engine().await;
        exec(&engine, &["member", "add", "Alice"]).await.unwrap();
        assert!(exec(&engine, &["member", "add", "alice "]).await.is_err());
        exec(&engine, &["member", "add", "Bob"]).await.unwrap();
        exec(&engine, &["member", "select", "bob"]).await.unwrap();
        let listing = exec(&engine, &["member", "list"]).await.unwrap();
        assert_eq!(listing, "  Alice\n* Bob\n");
    }
}
