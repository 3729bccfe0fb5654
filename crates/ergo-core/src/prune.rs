//! Prune planner: choose closed work that can be forgotten.

use crate::event::{Event, TaskState};
use crate::graph::Graph;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneItem {
    pub id: String,
    pub is_epic: bool,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrunePlan {
    pub ids: Vec<String>,
    pub items: Vec<PruneItem>,
}

impl PrunePlan {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// One `tombstone` event per selected ID.
    pub fn tombstones(&self, now: DateTime<Utc>) -> Vec<Event> {
        self.ids.iter().map(|id| Event::tombstone(id, now)).collect()
    }
}

/// Select every done or canceled task, then every epic whose tasks are all
/// selected or already closed. An epic with no tasks qualifies.
pub fn plan(graph: &Graph) -> PrunePlan {
    let mut plan = PrunePlan::default();
    let mut selected: BTreeSet<&str> = BTreeSet::new();

    for task in graph.tasks().filter(|task| !task.is_epic && task.is_closed()) {
        selected.insert(&task.id);
        plan.ids.push(task.id.clone());
        plan.items.push(PruneItem {
            id: task.id.clone(),
            is_epic: false,
            title: task.title.clone(),
            state: task.state,
        });
    }

    for epic in graph.epics() {
        let finished = graph
            .tasks_in_epic(&epic.id)
            .all(|task| selected.contains(task.id.as_str()) || task.is_closed());
        if finished {
            plan.ids.push(epic.id.clone());
            plan.items.push(PruneItem {
                id: epic.id.clone(),
                is_epic: true,
                title: epic.title.clone(),
                state: None,
            });
        }
    }
    plan
}
