//! In-memory materialization of the event log.
//!
//! The graph is rebuilt from scratch on every read and is never persisted.
//! Public accessors expose live entities and dependency edges; per-entity
//! [`Provenance`] is crate-private and exists only for compaction.

use crate::event::{Evidence, TaskState, Worker};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// An attached result: evidence plus the time it was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskResult {
    #[serde(flatten)]
    pub evidence: Evidence,
    pub recorded_at: DateTime<Utc>,
}

/// A task or an epic (`is_epic`). Epics never carry state, claim, or worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    // ── Identity ──
    pub id: String,
    pub uuid: Uuid,
    pub is_epic: bool,

    // ── Content ──
    pub title: String,
    pub body: String,

    // ── Workflow (tasks only) ──
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<Worker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epic: Option<String>,

    // ── Timestamps ──
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Newest first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<TaskResult>,
}

impl Task {
    /// Current state, treating epics as having none.
    pub fn task_state(&self) -> Option<TaskState> {
        if self.is_epic { None } else { self.state }
    }

    pub fn is_closed(&self) -> bool {
        self.task_state().is_some_and(|state| state.is_closed())
    }

    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.updated_at {
            self.updated_at = at;
        }
    }
}

/// Field values as they were in the creation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CreationSnapshot {
    pub title: String,
    pub body: String,
    pub state: Option<TaskState>,
    pub worker: Option<Worker>,
    pub epic: Option<String>,
}

/// Latest timestamp at which each field was written after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FieldStamps {
    pub title: Option<DateTime<Utc>>,
    pub body: Option<DateTime<Utc>>,
    pub epic: Option<DateTime<Utc>>,
    pub worker: Option<DateTime<Utc>>,
    pub claim: Option<DateTime<Utc>>,
    pub state: Option<DateTime<Utc>>,
}

pub(crate) fn stamp(slot: &mut Option<DateTime<Utc>>, at: DateTime<Utc>) {
    if slot.is_none_or(|prev| at > prev) {
        *slot = Some(at);
    }
}

/// Bookkeeping produced by replay and consumed only by compaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Provenance {
    pub created: CreationSnapshot,
    pub touched: FieldStamps,
}

impl Provenance {
    pub fn from_task(task: &Task) -> Self {
        Self {
            created: CreationSnapshot {
                title: task.title.clone(),
                body: task.body.clone(),
                state: task.state,
                worker: task.worker,
                epic: task.epic.clone(),
            },
            touched: FieldStamps::default(),
        }
    }
}

/// Live entities, dependency adjacency, and tombstoned IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    tasks: BTreeMap<String, Task>,
    /// from -> {to}: `from` depends on `to`.
    deps: BTreeMap<String, BTreeSet<String>>,
    /// to -> {from}; derived from `deps` after every replay.
    rdeps: BTreeMap<String, BTreeSet<String>>,
    tombstones: BTreeSet<String>,
    pub(crate) provenance: BTreeMap<String, Provenance>,
}

impl Graph {
    /// Number of live tasks and epics.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// Live epic with this ID, if any.
    pub fn epic(&self, id: &str) -> Option<&Task> {
        self.task(id).filter(|task| task.is_epic)
    }

    /// All live entities in ID order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn epics(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values().filter(|task| task.is_epic)
    }

    /// Tasks (never epics) whose epic membership is `epic_id`.
    pub fn tasks_in_epic<'a>(&'a self, epic_id: &'a str) -> impl Iterator<Item = &'a Task> + 'a {
        self.tasks
            .values()
            .filter(move |task| !task.is_epic && task.epic.as_deref() == Some(epic_id))
    }

    pub fn is_tombstoned(&self, id: &str) -> bool {
        self.tombstones.contains(id)
    }

    pub fn tombstones(&self) -> impl Iterator<Item = &str> {
        self.tombstones.iter().map(String::as_str)
    }

    /// IDs `id` depends on.
    pub fn deps_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.deps
            .get(id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// IDs that depend on `id`.
    pub fn dependents_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.rdeps
            .get(id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.deps.get(from).is_some_and(|set| set.contains(to))
    }

    /// Every `(from, to)` edge in deterministic order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.deps
            .iter()
            .flat_map(|(from, tos)| tos.iter().map(move |to| (from.as_str(), to.as_str())))
    }

    // ── Crate-internal mutation (replay and scratch validation) ──

    pub(crate) fn insert(&mut self, task: Task) {
        self.provenance
            .insert(task.id.clone(), Provenance::from_task(&task));
        self.tasks.insert(task.id.clone(), task);
    }

    pub(crate) fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    pub(crate) fn entry_mut(&mut self, id: &str) -> Option<(&mut Task, &mut Provenance)> {
        let task = self.tasks.get_mut(id)?;
        let provenance = self.provenance.get_mut(id)?;
        Some((task, provenance))
    }

    pub(crate) fn provenance_of(&self, id: &str) -> Option<&Provenance> {
        self.provenance.get(id)
    }

    pub(crate) fn add_edge(&mut self, from: &str, to: &str) {
        self.deps
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        self.rdeps
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
    }

    pub(crate) fn remove_edge(&mut self, from: &str, to: &str) {
        if let Some(set) = self.deps.get_mut(from) {
            set.remove(to);
            if set.is_empty() {
                self.deps.remove(from);
            }
        }
        if let Some(set) = self.rdeps.get_mut(to) {
            set.remove(from);
            if set.is_empty() {
                self.rdeps.remove(to);
            }
        }
    }

    /// Forget `id` permanently: entity, bookkeeping, and every edge touching it.
    pub(crate) fn tombstone(&mut self, id: &str) {
        self.tombstones.insert(id.to_string());
        self.tasks.remove(id);
        self.provenance.remove(id);
        self.deps.remove(id);
        for set in self.deps.values_mut() {
            set.remove(id);
        }
        self.deps.retain(|_, set| !set.is_empty());
        self.rebuild_reverse_index();
    }

    pub(crate) fn rebuild_reverse_index(&mut self) {
        let mut rdeps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (from, tos) in &self.deps {
            for to in tos {
                rdeps.entry(to.clone()).or_default().insert(from.clone());
            }
        }
        self.rdeps = rdeps;
    }

    /// Drop epic memberships that no longer point at a live epic.
    pub(crate) fn detach_dangling_epics(&mut self) {
        let epics: BTreeSet<String> = self.epics().map(|epic| epic.id.clone()).collect();
        for task in self.tasks.values_mut() {
            if task
                .epic
                .as_ref()
                .is_some_and(|epic| !epics.contains(epic))
            {
                task.epic = None;
            }
        }
    }
}
