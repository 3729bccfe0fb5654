//! Lock-scoped mutations over the on-disk event log.
//!
//! Every write runs the same unit: take the exclusive lock without waiting,
//! replay the log as it is now, plan against that graph, append the planned
//! events in one write, release. Reads skip the lock entirely.

use crate::bulk::{self, BulkCreated, BulkPlan};
use crate::compact;
use crate::config::Config;
use crate::error::{Error, ValidationError};
use crate::event::{Event, Evidence};
use crate::graph::{Graph, Task};
use crate::log;
use crate::ops::{self, ClaimFilter, NewEpic, NewTask, TaskUpdate};
use crate::prune::{self, PrunePlan};
use crate::replay::{extend, replay};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

pub const EVENTS_FILE: &str = "events.jsonl";
pub const LOCK_FILE: &str = "lock";

/// Handle on one data directory. Holds no state between calls.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompactReport {
    pub before: usize,
    pub after: usize,
}

impl Store {
    /// Open an existing data directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(Error::NotInitialized {
                dir: dir.display().to_string(),
            });
        }
        Ok(Self { dir })
    }

    /// Create the data directory, an empty log, and the lock file. Safe to
    /// run on an existing directory.
    pub fn init(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        let store = Self { dir };
        for path in [store.events_path(), store.lock_path()] {
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(&path)
                .map_err(|e| Error::io(&path, e))?;
        }
        tracing::debug!(dir = %store.dir.display(), "initialized data directory");
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn events_path(&self) -> PathBuf {
        self.dir.join(EVENTS_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    pub fn config(&self) -> Result<Config, Error> {
        Ok(Config::load(&self.dir)?)
    }

    // ── Read path (no lock) ──

    pub fn events(&self) -> Result<Vec<Event>, Error> {
        Ok(log::read(self.events_path())?)
    }

    pub fn load(&self) -> Result<Graph, Error> {
        Ok(replay(&self.events()?)?)
    }

    // ── Write path ──

    /// Run one read-validate-append unit under the lock and return the
    /// planner's value with the post-append graph.
    fn transact<T, F>(&self, plan: F) -> Result<(T, Graph), Error>
    where
        F: FnOnce(&Graph, DateTime<Utc>) -> Result<(T, Vec<Event>), Error>,
    {
        if !self.dir.is_dir() {
            return Err(Error::NotInitialized {
                dir: self.dir.display().to_string(),
            });
        }
        let _guard = LockGuard::acquire(&self.lock_path())?;

        let mut graph = self.load()?;
        let (value, events) = plan(&graph, Utc::now())?;
        if !events.is_empty() {
            log::append(self.events_path(), &events)?;
            extend(&mut graph, &events)?;
        }
        Ok((value, graph))
    }

    pub fn create_task(&self, request: &NewTask) -> Result<Task, Error> {
        let (id, graph) =
            self.transact(|graph, now| Ok(ops::create_task(graph, request, now)?))?;
        current(&graph, &id)
    }

    pub fn create_epic(&self, request: &NewEpic) -> Result<Task, Error> {
        let (id, graph) =
            self.transact(|graph, now| Ok(ops::create_epic(graph, request, now)?))?;
        current(&graph, &id)
    }

    pub fn create_bulk(&self, plan: &BulkPlan) -> Result<BulkCreated, Error> {
        let (created, _) = self.transact(|graph, now| Ok(bulk::plan_bulk(graph, plan, now)?))?;
        Ok(created)
    }

    pub fn update(
        &self,
        id: &str,
        update: &TaskUpdate,
        agent: Option<&str>,
    ) -> Result<Task, Error> {
        let id = crate::id::normalize(id);
        let (_, graph) = self.transact(|graph, now| {
            Ok(((), ops::update(graph, &id, update, agent, now)?))
        })?;
        current(&graph, &id)
    }

    /// Add a dependency. Returns `false` when the edge already existed.
    pub fn link(&self, from: &str, to: &str) -> Result<bool, Error> {
        let (changed, _) = self.transact(|graph, now| {
            let events = ops::link(graph, from, to, now)?;
            Ok((!events.is_empty(), events))
        })?;
        Ok(changed)
    }

    pub fn unlink(&self, from: &str, to: &str) -> Result<(), Error> {
        self.transact(|graph, now| Ok(((), ops::unlink(graph, from, to, now)?)))?;
        Ok(())
    }

    /// Atomically claim the next ready task. `None` means no ready work.
    pub fn claim_next(&self, agent: &str, filter: &ClaimFilter) -> Result<Option<Task>, Error> {
        let (claimed, graph) = self.transact(|graph, now| {
            Ok(match ops::claim_next(graph, agent, filter, now)? {
                Some((id, events)) => (Some(id), events),
                None => (None, Vec::new()),
            })
        })?;
        match claimed {
            Some(id) => {
                tracing::debug!(id = %id, agent, "claimed next ready task");
                current(&graph, &id).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn attach_result(&self, id: &str, evidence: Evidence) -> Result<Task, Error> {
        let id = crate::id::normalize(id);
        let (_, graph) = self.transact(|graph, now| {
            Ok(((), ops::attach_result(graph, &id, evidence, now)?))
        })?;
        current(&graph, &id)
    }

    /// Plan a prune and, unless `dry_run`, tombstone everything selected.
    pub fn prune(&self, dry_run: bool) -> Result<PrunePlan, Error> {
        let (plan, _) = self.transact(|graph, now| {
            let plan = prune::plan(graph);
            let events = if dry_run {
                Vec::new()
            } else {
                plan.tombstones(now)
            };
            Ok((plan, events))
        })?;
        tracing::debug!(selected = plan.ids.len(), dry_run, "prune planned");
        Ok(plan)
    }

    /// Replace the log with its compacted form.
    pub fn compact(&self) -> Result<CompactReport, Error> {
        self.compact_with(compact::compact)
    }

    /// The compacted events are replayed and compared with the current
    /// graph before anything is written.
    fn compact_with<F>(&self, compactor: F) -> Result<CompactReport, Error>
    where
        F: FnOnce(&Graph) -> Vec<Event>,
    {
        if !self.dir.is_dir() {
            return Err(Error::NotInitialized {
                dir: self.dir.display().to_string(),
            });
        }
        let _guard = LockGuard::acquire(&self.lock_path())?;

        let events = self.events()?;
        let graph = replay(&events)?;
        let compacted = compactor(&graph);
        let rebuilt = replay(&compacted)?;
        if !compact::is_equivalent(&graph, &rebuilt) {
            tracing::warn!(
                before = events.len(),
                after = compacted.len(),
                "compaction changed the replayed graph; refusing to rewrite"
            );
            return Err(Error::CompactionMismatch {
                events: compacted.len(),
            });
        }
        log::write_full(self.events_path(), &compacted)?;
        let report = CompactReport {
            before: events.len(),
            after: compacted.len(),
        };
        tracing::debug!(before = report.before, after = report.after, "compacted log");
        Ok(report)
    }
}

fn current(graph: &Graph, id: &str) -> Result<Task, Error> {
    graph
        .task(id)
        .cloned()
        .ok_or_else(|| ValidationError::NotFound(id.to_string()).into())
}

/// Exclusive advisory lock on the lock file, released on drop.
struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    fn acquire(path: &Path) -> Result<Self, Error> {
        let lock_io = |message: String| Error::LockIo {
            lock_path: path.display().to_string(),
            message,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| lock_io(e.to_string()))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "lock acquired");
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                tracing::debug!(path = %path.display(), "lock busy");
                Err(Error::LockBusy {
                    lock_path: path.display().to_string(),
                })
            }
            Err(err) => Err(lock_io(err.to_string())),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        tracing::debug!(path = %self.path.display(), "lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{TaskState, Worker};
    use crate::ops::ClaimChange;
    use tempfile::TempDir;

    fn store() -> (TempDir, Store) {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::init(dir.path().join(".ergo")).expect("init");
        (dir, store)
    }

    fn task(store: &Store, title: &str) -> Task {
        store
            .create_task(&NewTask {
                title: title.to_string(),
                ..NewTask::default()
            })
            .expect("create task")
    }

    #[test]
    fn init_creates_log_and_lock_and_is_idempotent() {
        let (dir, store) = store();
        assert!(store.events_path().is_file());
        assert!(store.lock_path().is_file());
        Store::init(dir.path().join(".ergo")).expect("second init");
        assert!(store.load().expect("load").is_empty());
    }

    #[test]
    fn open_requires_existing_dir() {
        let dir = TempDir::new().expect("temp dir");
        assert!(matches!(
            Store::open(dir.path().join("missing")),
            Err(Error::NotInitialized { .. })
        ));
    }

    #[test]
    fn mutations_are_visible_to_fresh_reads() {
        let (_dir, store) = store();
        let created = task(&store, "write docs");
        let graph = store.load().expect("load");
        assert_eq!(graph.task(&created.id), Some(&created));
        assert_eq!(store.events().expect("events").len(), 1);
    }

    #[test]
    fn held_lock_fails_fast_and_appends_nothing() {
        let (_dir, store) = store();
        let _held = LockGuard::acquire(&store.lock_path()).expect("hold lock");

        let err = store
            .create_task(&NewTask {
                title: "blocked".to_string(),
                ..NewTask::default()
            })
            .expect_err("lock is held");
        assert!(err.is_lock_busy(), "expected lock busy, got {err:?}");
        assert!(store.events().expect("events").is_empty());
    }

    #[test]
    fn lock_file_is_recreated_on_demand() {
        let (_dir, store) = store();
        fs::remove_file(store.lock_path()).expect("remove lock file");
        task(&store, "still works");
        assert!(store.lock_path().is_file());
    }

    #[test]
    fn validation_failure_leaves_the_log_untouched() {
        let (_dir, store) = store();
        let created = task(&store, "a");
        let err = store
            .update(
                &created.id,
                &TaskUpdate {
                    state: Some(TaskState::Error),
                    ..TaskUpdate::default()
                },
                None,
            )
            .expect_err("todo -> error is invalid");
        assert!(matches!(
            err,
            Error::Validation(ValidationError::InvalidTransition { .. })
        ));
        assert_eq!(store.events().expect("events").len(), 1);
    }

    #[test]
    fn claim_next_then_finish() {
        let (_dir, store) = store();
        let first = task(&store, "first");
        let filter = ClaimFilter {
            worker: Worker::Agent,
            epic: None,
        };

        let claimed = store
            .claim_next("bot", &filter)
            .expect("claim next")
            .expect("ready work");
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.claimed_by.as_deref(), Some("bot"));
        assert_eq!(claimed.state, Some(TaskState::Doing));
        assert!(store.claim_next("bot", &filter).expect("claim next").is_none());

        let done = store
            .update(
                &first.id,
                &TaskUpdate {
                    state: Some(TaskState::Done),
                    ..TaskUpdate::default()
                },
                Some("bot"),
            )
            .expect("done");
        assert_eq!(done.claimed_by, None);
    }

    #[test]
    fn explicit_claim_then_release() {
        let (_dir, store) = store();
        let created = task(&store, "a");
        let claimed = store
            .update(
                &created.id.to_lowercase(),
                &TaskUpdate {
                    claim: Some(ClaimChange::Claim("alice".to_string())),
                    ..TaskUpdate::default()
                },
                None,
            )
            .expect("claim");
        assert_eq!(claimed.claimed_by.as_deref(), Some("alice"));
        let released = store
            .update(
                &created.id,
                &TaskUpdate {
                    claim: Some(ClaimChange::Release),
                    ..TaskUpdate::default()
                },
                None,
            )
            .expect("release");
        assert_eq!(released.claimed_by, None);
    }

    #[test]
    fn compact_preserves_state_and_shrinks_the_log() {
        let (_dir, store) = store();
        let a = task(&store, "a");
        let b = task(&store, "b");
        assert!(store.link(&b.id, &a.id).expect("link"));
        assert!(!store.link(&b.id, &a.id).expect("relink is a no-op"));
        for title in ["a1", "a2", "a3"] {
            store
                .update(
                    &a.id,
                    &TaskUpdate {
                        title: Some(title.to_string()),
                        ..TaskUpdate::default()
                    },
                    None,
                )
                .expect("retitle");
        }

        let before = store.load().expect("load");
        let report = store.compact().expect("compact");
        assert_eq!(report.before, 6);
        assert_eq!(report.after, 4);
        let after = store.load().expect("load");
        assert!(compact::is_equivalent(&before, &after));
    }

    #[test]
    fn compaction_that_changes_the_graph_is_refused() {
        let (_dir, store) = store();
        let a = task(&store, "a");
        let b = task(&store, "b");
        store.link(&b.id, &a.id).expect("link");
        let before = fs::read(store.events_path()).expect("log bytes");

        let err = store
            .compact_with(|graph| {
                let mut events = compact::compact(graph);
                events.pop();
                events
            })
            .expect_err("lossy compaction must be refused");
        assert!(matches!(err, Error::CompactionMismatch { .. }));
        assert_eq!(fs::read(store.events_path()).expect("log bytes"), before);
    }
}
