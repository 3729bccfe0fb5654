//! Atomic multi-task creation from one payload.
//!
//! Tasks reference each other by title. Every reference is resolved and the
//! whole dependency set checked for self-references and cycles before a
//! single event is produced.

use crate::error::ValidationError;
use crate::event::{Event, EventBody, NewEpicPayload, NewTaskPayload, TaskState, Worker};
use crate::graph::Graph;
use crate::{id, oracle, ops};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkPlan {
    #[serde(default)]
    pub epic: Option<BulkEpic>,
    #[serde(default)]
    pub tasks: Vec<BulkTask>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkEpic {
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkTask {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub worker: Worker,
    /// Titles of other tasks in this payload, or IDs of existing tasks.
    #[serde(default)]
    pub after: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedTask {
    pub title: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkCreated {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epic: Option<String>,
    pub tasks: Vec<CreatedTask>,
}

pub fn plan_bulk(
    graph: &Graph,
    plan: &BulkPlan,
    now: DateTime<Utc>,
) -> Result<(BulkCreated, Vec<Event>), ValidationError> {
    if plan.tasks.is_empty() {
        return Err(ValidationError::EmptyBulk);
    }

    let epic_title = match &plan.epic {
        Some(epic) => Some(non_empty(&epic.title)?),
        None => None,
    };

    let mut local: BTreeMap<String, usize> = BTreeMap::new();
    let mut titles = Vec::with_capacity(plan.tasks.len());
    for (idx, task) in plan.tasks.iter().enumerate() {
        let title = non_empty(&task.title)?;
        if local.insert(title.clone(), idx).is_some() {
            return Err(ValidationError::DuplicateLocalId(title));
        }
        titles.push(title);
    }

    let mut reserved = BTreeSet::new();
    let epic_id = match epic_title {
        Some(_) => {
            let id = id::allocate(graph, &reserved)?;
            reserved.insert(id.clone());
            Some(id)
        }
        None => None,
    };
    let mut ids = Vec::with_capacity(titles.len());
    for _ in &titles {
        let id = id::allocate(graph, &reserved)?;
        reserved.insert(id.clone());
        ids.push(id);
    }

    let mut edges: Vec<(String, String)> = Vec::new();
    for (idx, task) in plan.tasks.iter().enumerate() {
        let from_title = &titles[idx];
        for reference in &task.after {
            let reference = reference.trim();
            let to = match local.get(reference) {
                Some(&target) if target == idx => {
                    return Err(ValidationError::SelfDependency(from_title.clone()));
                }
                Some(&target) => ids[target].clone(),
                None => resolve_existing(graph, from_title, reference)?,
            };
            if !edges.iter().any(|(f, t)| *f == ids[idx] && *t == to) {
                edges.push((ids[idx].clone(), to));
            }
        }
    }

    let mut scratch = graph.clone();
    for (from, to) in &edges {
        if oracle::has_cycle(&scratch, from, to) {
            return Err(ValidationError::Cycle {
                from: label(&ids, &titles, from),
                to: label(&ids, &titles, to),
            });
        }
        scratch.add_edge(from, to);
    }

    let mut events = Vec::with_capacity(1 + ids.len() + edges.len());
    if let (Some(id), Some(epic)) = (&epic_id, &plan.epic) {
        events.push(Event::new(
            now,
            EventBody::NewEpic(NewEpicPayload {
                id: id.clone(),
                uuid: Some(Uuid::new_v4()),
                title: non_empty(&epic.title)?,
                body: epic.body.clone(),
            }),
        ));
    }
    for (idx, task) in plan.tasks.iter().enumerate() {
        events.push(Event::new(
            now,
            EventBody::NewTask(NewTaskPayload {
                id: ids[idx].clone(),
                uuid: Some(Uuid::new_v4()),
                title: titles[idx].clone(),
                body: task.body.clone(),
                state: TaskState::Todo,
                worker: task.worker,
                epic: epic_id.clone(),
            }),
        ));
    }
    events.extend(edges.iter().map(|(from, to)| Event::link(from, to, now)));

    let created = BulkCreated {
        epic: epic_id,
        tasks: titles
            .into_iter()
            .zip(ids)
            .map(|(title, id)| CreatedTask { title, id })
            .collect(),
    };
    Ok((created, events))
}

fn non_empty(title: &str) -> Result<String, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(title.to_string())
}

fn resolve_existing(graph: &Graph, from: &str, reference: &str) -> Result<String, ValidationError> {
    let id = id::normalize(reference);
    match ops::live(graph, &id) {
        Ok(task) if task.is_epic => Err(ValidationError::MixedKinds {
            from: from.to_string(),
            to: id,
        }),
        Ok(task) => Ok(task.id.clone()),
        Err(ValidationError::NotFound(_)) => Err(ValidationError::DanglingReference {
            from: from.to_string(),
            reference: reference.to_string(),
        }),
        Err(err) => Err(err),
    }
}

/// Local title for a freshly allocated ID, the ID itself otherwise.
fn label(ids: &[String], titles: &[String], id: &str) -> String {
    ids.iter()
        .position(|candidate| candidate == id)
        .map(|idx| titles[idx].clone())
        .unwrap_or_else(|| id.to_string())
}
