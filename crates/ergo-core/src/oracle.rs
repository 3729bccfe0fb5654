//! Dependency and readiness oracle.
//!
//! Pure functions over a [`Graph`]. Ready and blocked are mutually exclusive:
//! ready requires `todo` with everything satisfied, blocked requires either
//! the `blocked` state or `todo` with something unsatisfied.

use crate::event::TaskState;
use crate::graph::{Graph, Task};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Would adding `from -> to` close a cycle? True when `from` is reachable
/// from `to` over existing edges; a self-edge trivially is.
pub fn has_cycle(graph: &Graph, from: &str, to: &str) -> bool {
    if from == to {
        return true;
    }
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([to]);
    while let Some(current) = queue.pop_front() {
        if current == from {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        queue.extend(graph.deps_of(current).filter(|next| !seen.contains(next)));
    }
    false
}

/// Every task in the epic is closed. Vacuously true for an empty epic.
pub fn is_epic_complete(graph: &Graph, epic_id: &str) -> bool {
    graph.tasks_in_epic(epic_id).all(Task::is_closed)
}

/// Direct dependencies of `task` that are not yet done or canceled.
pub fn unmet_dependencies<'a>(graph: &'a Graph, task: &Task) -> Vec<&'a str> {
    graph
        .deps_of(&task.id)
        .filter(|dep| !graph.task(dep).is_some_and(Task::is_closed))
        .collect()
}

/// Epic-level dependencies of the task's epic that are not complete.
pub fn incomplete_epic_dependencies<'a>(graph: &'a Graph, task: &Task) -> Vec<&'a str> {
    let Some(epic) = task.epic.as_deref() else {
        return Vec::new();
    };
    graph
        .deps_of(epic)
        .filter(|dep| !is_epic_complete(graph, dep))
        .collect()
}

pub fn is_ready(task: &Task, graph: &Graph) -> bool {
    task.task_state() == Some(TaskState::Todo)
        && task.claimed_by.is_none()
        && unmet_dependencies(graph, task).is_empty()
        && incomplete_epic_dependencies(graph, task).is_empty()
}

pub fn is_blocked(task: &Task, graph: &Graph) -> bool {
    match task.task_state() {
        Some(TaskState::Blocked) => true,
        Some(TaskState::Todo) => {
            !unmet_dependencies(graph, task).is_empty()
                || !incomplete_epic_dependencies(graph, task).is_empty()
        }
        _ => false,
    }
}

/// Ready tasks in ID order.
pub fn ready_tasks(graph: &Graph) -> Vec<&Task> {
    graph.tasks().filter(|task| is_ready(task, graph)).collect()
}

/// Blocked tasks in ID order.
pub fn blocked_tasks(graph: &Graph) -> Vec<&Task> {
    graph
        .tasks()
        .filter(|task| is_blocked(task, graph))
        .collect()
}

/// Deterministic display order for a subset of entities: Kahn's algorithm
/// over edges inside the subset, ties broken ready-first then by ID.
///
/// Members of a cycle (impossible through validated mutations, but possible
/// in a hand-edited log) are appended in ID order at the end.
pub fn topo_order<'a>(graph: &'a Graph, ids: &[&str]) -> Vec<&'a Task> {
    let members: BTreeSet<&str> = ids.iter().copied().filter(|id| graph.contains(id)).collect();

    let mut indegree: BTreeMap<&str, usize> = members.iter().map(|id| (*id, 0)).collect();
    for id in members.iter().copied() {
        let inside = graph.deps_of(id).filter(|dep| members.contains(dep)).count();
        indegree.insert(id, inside);
    }

    let rank = |id: &str| -> (bool, String) {
        let ready = graph.task(id).is_some_and(|task| is_ready(task, graph));
        (!ready, id.to_string())
    };

    let mut frontier: BTreeSet<((bool, String), &str)> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| (rank(*id), *id))
        .collect();

    let mut ordered = Vec::with_capacity(members.len());
    let mut emitted: BTreeSet<&str> = BTreeSet::new();
    while let Some(entry) = frontier.pop_first() {
        let id = entry.1;
        emitted.insert(id);
        if let Some(task) = graph.task(id) {
            ordered.push(task);
        }
        for dependent in graph.dependents_of(id) {
            if let Some(degree) = indegree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    frontier.insert((rank(dependent), dependent));
                }
            }
        }
    }

    for id in &members {
        if !emitted.contains(id)
            && let Some(task) = graph.task(id)
        {
            ordered.push(task);
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventBody, NewEpicPayload, NewTaskPayload, Worker};
    use crate::replay::replay;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("fixed time")
            + Duration::minutes(minutes)
    }

    fn task(id: &str, epic: Option<&str>) -> Event {
        Event::new(
            t(0),
            EventBody::NewTask(NewTaskPayload {
                id: id.to_string(),
                uuid: None,
                title: id.to_lowercase(),
                body: String::new(),
                state: TaskState::Todo,
                worker: Worker::Any,
                epic: epic.map(str::to_string),
            }),
        )
    }

    fn epic(id: &str) -> Event {
        Event::new(
            t(0),
            EventBody::NewEpic(NewEpicPayload {
                id: id.to_string(),
                uuid: None,
                title: id.to_lowercase(),
                body: String::new(),
            }),
        )
    }

    #[test]
    fn cycle_detection_follows_existing_edges() {
        let graph = replay(&[
            task("AAAAAA", None),
            task("BBBBBB", None),
            task("CCCCCC", None),
            Event::link("BBBBBB", "AAAAAA", t(1)),
            Event::link("CCCCCC", "BBBBBB", t(1)),
        ])
        .expect("replay");

        assert!(has_cycle(&graph, "AAAAAA", "CCCCCC"));
        assert!(has_cycle(&graph, "AAAAAA", "AAAAAA"));
        assert!(!has_cycle(&graph, "CCCCCC", "AAAAAA"));
    }

    #[test]
    fn ready_and_blocked_follow_task_dependencies() {
        let events = vec![
            task("AAAAAA", None),
            task("BBBBBB", None),
            Event::link("BBBBBB", "AAAAAA", t(1)),
        ];
        let graph = replay(&events).expect("replay");
        let a = graph.task("AAAAAA").expect("a");
        let b = graph.task("BBBBBB").expect("b");
        assert!(is_ready(a, &graph));
        assert!(!is_blocked(a, &graph));
        assert!(is_blocked(b, &graph));
        assert!(!is_ready(b, &graph));

        let mut events = events;
        events.push(Event::state("AAAAAA", TaskState::Canceled, t(2)));
        let graph = replay(&events).expect("replay");
        assert!(is_ready(graph.task("BBBBBB").expect("b"), &graph));
    }

    #[test]
    fn epic_dependencies_propagate_to_member_tasks() {
        let mut events = vec![
            epic("E1E1E1"),
            epic("E2E2E2"),
            task("AAAAAA", Some("E1E1E1")),
            task("BBBBBB", Some("E2E2E2")),
            Event::link("E2E2E2", "E1E1E1", t(1)),
        ];
        let graph = replay(&events).expect("replay");
        let b = graph.task("BBBBBB").expect("b");
        assert!(is_blocked(b, &graph));
        assert!(!is_ready(b, &graph));

        events.push(Event::state("AAAAAA", TaskState::Done, t(2)));
        let graph = replay(&events).expect("replay");
        assert!(is_ready(graph.task("BBBBBB").expect("b"), &graph));
    }

    #[test]
    fn empty_epic_dependency_is_vacuously_complete() {
        let graph = replay(&[
            epic("E1E1E1"),
            epic("E2E2E2"),
            task("BBBBBB", Some("E2E2E2")),
            Event::link("E2E2E2", "E1E1E1", t(1)),
        ])
        .expect("replay");
        assert!(is_ready(graph.task("BBBBBB").expect("b"), &graph));
    }

    #[test]
    fn claimed_todo_is_neither_ready_nor_blocked() {
        let graph = replay(&[
            task("AAAAAA", None),
            Event::claim("AAAAAA", "agent-1", t(1)),
        ])
        .expect("replay");
        let a = graph.task("AAAAAA").expect("a");
        assert!(!is_ready(a, &graph));
        assert!(!is_blocked(a, &graph));
    }

    #[test]
    fn topo_order_puts_blockers_first_then_ready_then_by_id() {
        let graph = replay(&[
            task("AAAAAA", None),
            task("BBBBBB", None),
            task("CCCCCC", None),
            task("DDDDDD", None),
            Event::link("AAAAAA", "CCCCCC", t(1)),
            Event::state("BBBBBB", TaskState::Blocked, t(1)),
        ])
        .expect("replay");

        let order: Vec<&str> = topo_order(&graph, &["AAAAAA", "BBBBBB", "CCCCCC", "DDDDDD"])
            .into_iter()
            .map(|task| task.id.as_str())
            .collect();
        assert_eq!(order, vec!["CCCCCC", "DDDDDD", "AAAAAA", "BBBBBB"]);
    }
}
