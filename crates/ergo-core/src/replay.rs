//! Replay: a strict left-to-right fold of events into a [`Graph`].
//!
//! Replay is pure. Every timestamp comes from the events themselves, so the
//! same log always yields the same graph. Events about unknown or tombstoned
//! IDs are skipped; a second creation of a live ID is a hard error.

use crate::event::{Event, EventBody, NewEpicPayload, NewTaskPayload};
use crate::graph::{Graph, Task, TaskResult, stamp};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("duplicate id {id} created again by event #{ordinal}")]
    DuplicateId { id: String, ordinal: usize },
}

/// Fold `events` into a fresh graph.
pub fn replay(events: &[Event]) -> Result<Graph, ReplayError> {
    let mut graph = Graph::default();
    fold(&mut graph, events, 0)?;
    finalize(&mut graph);
    tracing::debug!(
        events = events.len(),
        live = graph.len(),
        "replayed event log"
    );
    Ok(graph)
}

/// Apply further events to an already-replayed graph.
///
/// Equivalent to replaying the concatenated log; used to materialize the
/// post-mutation state without reading the file back.
pub fn extend(graph: &mut Graph, events: &[Event]) -> Result<(), ReplayError> {
    fold(graph, events, 0)?;
    finalize(graph);
    Ok(())
}

fn fold(graph: &mut Graph, events: &[Event], offset: usize) -> Result<(), ReplayError> {
    for (idx, event) in events.iter().enumerate() {
        apply(graph, event, offset + idx + 1)?;
    }
    Ok(())
}

/// Deterministic identity for entities created before UUIDs were recorded.
pub fn legacy_uuid(id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes())
}

fn apply(graph: &mut Graph, event: &Event, ordinal: usize) -> Result<(), ReplayError> {
    let at = event.timestamp;
    match &event.body {
        EventBody::NewTask(payload) => create_task(graph, payload, at, ordinal)?,
        EventBody::NewEpic(payload) => create_epic(graph, payload, at, ordinal)?,

        EventBody::State(p) => {
            if let Some((task, prov)) = graph.entry_mut(&p.id)
                && !task.is_epic
            {
                task.state = Some(p.state);
                if p.state.clears_claim() {
                    task.claimed_by = None;
                }
                stamp(&mut prov.touched.state, at);
                task.touch(at);
            }
        }
        EventBody::Claim(p) => {
            if let Some((task, prov)) = graph.entry_mut(&p.id)
                && !task.is_epic
            {
                task.claimed_by = Some(p.agent.clone());
                stamp(&mut prov.touched.claim, at);
                task.touch(at);
            }
        }
        EventBody::Unclaim(p) => {
            if let Some((task, prov)) = graph.entry_mut(&p.id)
                && !task.is_epic
            {
                task.claimed_by = None;
                stamp(&mut prov.touched.claim, at);
                task.touch(at);
            }
        }
        EventBody::Title(p) => {
            if let Some((task, prov)) = graph.entry_mut(&p.id) {
                task.title = p.title.clone();
                stamp(&mut prov.touched.title, at);
                task.touch(at);
            }
        }
        EventBody::Body(p) => {
            if let Some((task, prov)) = graph.entry_mut(&p.id) {
                task.body = p.body.clone();
                stamp(&mut prov.touched.body, at);
                task.touch(at);
            }
        }
        EventBody::Epic(p) => {
            if let Some((task, prov)) = graph.entry_mut(&p.id)
                && !task.is_epic
            {
                task.epic = p.epic.clone();
                stamp(&mut prov.touched.epic, at);
                task.touch(at);
            }
        }
        EventBody::Worker(p) => {
            if let Some((task, prov)) = graph.entry_mut(&p.id)
                && !task.is_epic
            {
                task.worker = Some(p.worker);
                stamp(&mut prov.touched.worker, at);
                task.touch(at);
            }
        }
        EventBody::Link(p) => {
            let same_kind = match (graph.task(&p.from), graph.task(&p.to)) {
                (Some(from), Some(to)) => from.is_epic == to.is_epic,
                _ => false,
            };
            if same_kind && p.from != p.to {
                graph.add_edge(&p.from, &p.to);
            }
        }
        EventBody::Unlink(p) => graph.remove_edge(&p.from, &p.to),
        EventBody::Result(p) => {
            if let Some(task) = graph.task_mut(&p.id) {
                task.results.insert(
                    0,
                    TaskResult {
                        evidence: p.evidence.clone(),
                        recorded_at: at,
                    },
                );
                task.touch(at);
            }
        }
        EventBody::Tombstone(p) => graph.tombstone(&p.id),
        EventBody::Unknown { kind, .. } => {
            tracing::trace!(kind = %kind, ordinal, "skipping unknown event type");
        }
    }
    Ok(())
}

fn create_task(
    graph: &mut Graph,
    payload: &NewTaskPayload,
    at: chrono::DateTime<chrono::Utc>,
    ordinal: usize,
) -> Result<(), ReplayError> {
    if graph.is_tombstoned(&payload.id) {
        return Ok(());
    }
    if graph.contains(&payload.id) {
        return Err(ReplayError::DuplicateId {
            id: payload.id.clone(),
            ordinal,
        });
    }
    graph.insert(Task {
        id: payload.id.clone(),
        uuid: payload.uuid.unwrap_or_else(|| legacy_uuid(&payload.id)),
        is_epic: false,
        title: payload.title.clone(),
        body: payload.body.clone(),
        state: Some(payload.state),
        worker: Some(payload.worker),
        claimed_by: None,
        epic: payload.epic.clone(),
        created_at: at,
        updated_at: at,
        results: Vec::new(),
    });
    Ok(())
}

fn create_epic(
    graph: &mut Graph,
    payload: &NewEpicPayload,
    at: chrono::DateTime<chrono::Utc>,
    ordinal: usize,
) -> Result<(), ReplayError> {
    if graph.is_tombstoned(&payload.id) {
        return Ok(());
    }
    if graph.contains(&payload.id) {
        return Err(ReplayError::DuplicateId {
            id: payload.id.clone(),
            ordinal,
        });
    }
    graph.insert(Task {
        id: payload.id.clone(),
        uuid: payload.uuid.unwrap_or_else(|| legacy_uuid(&payload.id)),
        is_epic: true,
        title: payload.title.clone(),
        body: payload.body.clone(),
        state: None,
        worker: None,
        claimed_by: None,
        epic: None,
        created_at: at,
        updated_at: at,
        results: Vec::new(),
    });
    Ok(())
}

fn finalize(graph: &mut Graph) {
    graph.detach_dangling_epics();
    graph.rebuild_reverse_index();
    migrate_legacy_titles(graph);
}

/// Give untitled entities from the pre-title schema a title taken from the
/// body. Idempotent: a titled entity is never touched again.
pub(crate) fn migrate_legacy_titles(graph: &mut Graph) {
    let ids: Vec<String> = graph
        .tasks()
        .filter(|task| task.title.trim().is_empty())
        .map(|task| task.id.clone())
        .collect();

    for id in ids {
        let Some((task, prov)) = graph.entry_mut(&id) else {
            continue;
        };
        if prov.touched.title.is_some() {
            continue;
        }
        let Some((title, rest)) = split_legacy_body(&task.body) else {
            continue;
        };
        task.title = title.clone();
        task.body = rest.clone();
        prov.created.title = title;
        if prov.touched.body.is_none() {
            prov.created.body = rest;
        }
    }
}

/// First non-blank line (heading markers stripped) becomes the title; the
/// rest, trimmed of surrounding blank lines, becomes the body.
fn split_legacy_body(body: &str) -> Option<(String, String)> {
    let lines: Vec<&str> = body.lines().collect();
    let (idx, title) = lines.iter().enumerate().find_map(|(idx, line)| {
        let text = line.trim().trim_start_matches('#').trim();
        (!text.is_empty()).then(|| (idx, text.to_string()))
    })?;
    let rest = lines[idx + 1..].join("\n").trim_matches('\n').to_string();
    Some((title, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{TaskState, Worker};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("fixed time")
            + Duration::minutes(minutes)
    }

    fn new_task(id: &str, title: &str, at: DateTime<Utc>) -> Event {
        Event::new(
            at,
            EventBody::NewTask(NewTaskPayload {
                id: id.to_string(),
                uuid: None,
                title: title.to_string(),
                body: String::new(),
                state: TaskState::Todo,
                worker: Worker::Any,
                epic: None,
            }),
        )
    }

    fn new_epic(id: &str, at: DateTime<Utc>) -> Event {
        Event::new(
            at,
            EventBody::NewEpic(NewEpicPayload {
                id: id.to_string(),
                uuid: None,
                title: format!("Epic {id}"),
                body: String::new(),
            }),
        )
    }

    #[test]
    fn replay_is_deterministic() {
        let events = vec![
            new_task("AAAAAA", "one", t(0)),
            new_task("BBBBBB", "two", t(1)),
            Event::link("BBBBBB", "AAAAAA", t(2)),
            Event::claim("AAAAAA", "agent-1", t(3)),
            Event::state("AAAAAA", TaskState::Doing, t(3)),
        ];
        let first = replay(&events).expect("replay");
        let second = replay(&events).expect("replay");
        assert_eq!(first, second);
        assert_eq!(
            first.task("AAAAAA").expect("task").uuid,
            legacy_uuid("AAAAAA")
        );
    }

    #[test]
    fn duplicate_creation_is_an_integrity_error() {
        let events = vec![new_task("AAAAAA", "one", t(0)), new_task("AAAAAA", "again", t(1))];
        match replay(&events) {
            Err(ReplayError::DuplicateId { id, ordinal }) => {
                assert_eq!(id, "AAAAAA");
                assert_eq!(ordinal, 2);
            }
            other => panic!("expected duplicate id error, got {other:?}"),
        }
    }

    #[test]
    fn terminal_and_todo_states_clear_the_claim() {
        for state in [TaskState::Todo, TaskState::Done, TaskState::Canceled] {
            let events = vec![
                new_task("AAAAAA", "one", t(0)),
                Event::claim("AAAAAA", "agent-1", t(1)),
                Event::state("AAAAAA", TaskState::Doing, t(1)),
                Event::state("AAAAAA", state, t(2)),
            ];
            let graph = replay(&events).expect("replay");
            assert_eq!(graph.task("AAAAAA").expect("task").claimed_by, None);
        }

        let events = vec![
            new_task("AAAAAA", "one", t(0)),
            Event::claim("AAAAAA", "agent-1", t(1)),
            Event::state("AAAAAA", TaskState::Blocked, t(2)),
        ];
        let graph = replay(&events).expect("replay");
        assert_eq!(
            graph.task("AAAAAA").expect("task").claimed_by.as_deref(),
            Some("agent-1")
        );
    }

    #[test]
    fn tombstone_before_creation_wins() {
        let events = vec![
            Event::tombstone("AAAAAA", t(0)),
            new_task("AAAAAA", "zombie", t(1)),
            Event::title("AAAAAA", "still dead", t(2)),
        ];
        let graph = replay(&events).expect("replay");
        assert!(graph.task("AAAAAA").is_none());
        assert!(graph.is_tombstoned("AAAAAA"));
    }

    #[test]
    fn tombstone_drops_edges_and_memberships() {
        let mut task = new_task("BBBBBB", "member", t(1));
        if let EventBody::NewTask(payload) = &mut task.body {
            payload.epic = Some("EEEEEE".to_string());
        }
        let events = vec![
            new_epic("EEEEEE", t(0)),
            task,
            new_task("AAAAAA", "blocker", t(2)),
            Event::link("BBBBBB", "AAAAAA", t(3)),
            Event::tombstone("AAAAAA", t(4)),
            Event::tombstone("EEEEEE", t(5)),
        ];
        let graph = replay(&events).expect("replay");
        assert_eq!(graph.edges().count(), 0);
        assert_eq!(graph.dependents_of("AAAAAA").count(), 0);
        assert_eq!(graph.task("BBBBBB").expect("task").epic, None);
    }

    #[test]
    fn events_for_unknown_ids_are_skipped() {
        let events = vec![
            Event::state("NOPE00", TaskState::Done, t(0)),
            Event::link("NOPE00", "NOPE01", t(0)),
            Event::title("NOPE00", "ghost", t(0)),
        ];
        let graph = replay(&events).expect("forward compatible replay");
        assert!(graph.is_empty());
    }

    #[test]
    fn epics_ignore_workflow_events() {
        let events = vec![
            new_epic("EEEEEE", t(0)),
            Event::state("EEEEEE", TaskState::Done, t(1)),
            Event::claim("EEEEEE", "agent-1", t(1)),
            Event::worker("EEEEEE", Worker::Human, t(1)),
        ];
        let graph = replay(&events).expect("replay");
        let epic = graph.task("EEEEEE").expect("epic");
        assert_eq!(epic.state, None);
        assert_eq!(epic.claimed_by, None);
        assert_eq!(epic.worker, None);
        assert_eq!(epic.updated_at, t(0));
    }

    #[test]
    fn mixed_kind_and_self_links_are_ignored() {
        let events = vec![
            new_epic("EEEEEE", t(0)),
            new_task("AAAAAA", "one", t(0)),
            Event::link("AAAAAA", "EEEEEE", t(1)),
            Event::link("AAAAAA", "AAAAAA", t(1)),
        ];
        let graph = replay(&events).expect("replay");
        assert_eq!(graph.edges().count(), 0);
    }

    #[test]
    fn results_are_newest_first() {
        let evidence = |path: &str| crate::event::Evidence {
            summary: String::new(),
            path: path.to_string(),
            sha256: "00".to_string(),
            mtime: t(0),
            git_commit: None,
        };
        let events = vec![
            new_task("AAAAAA", "one", t(0)),
            Event::result("AAAAAA", evidence("a.txt"), t(1)),
            Event::result("AAAAAA", evidence("b.txt"), t(2)),
        ];
        let graph = replay(&events).expect("replay");
        let task = graph.task("AAAAAA").expect("task");
        let paths: Vec<&str> = task
            .results
            .iter()
            .map(|r| r.evidence.path.as_str())
            .collect();
        assert_eq!(paths, vec!["b.txt", "a.txt"]);
        assert_eq!(task.updated_at, t(2));
    }

    #[test]
    fn legacy_body_only_tasks_get_a_title() {
        let mut event = new_task("AAAAAA", "", t(0));
        if let EventBody::NewTask(payload) = &mut event.body {
            payload.body = "\n# Fix the parser\n\nIt drops the last token.\n".to_string();
        }
        let mut graph = replay(&[event]).expect("replay");
        let task = graph.task("AAAAAA").expect("task").clone();
        assert_eq!(task.title, "Fix the parser");
        assert_eq!(task.body, "It drops the last token.");

        migrate_legacy_titles(&mut graph);
        assert_eq!(graph.task("AAAAAA").expect("task"), &task);
    }

    #[test]
    fn extend_matches_full_replay() {
        let head = vec![new_task("AAAAAA", "one", t(0))];
        let tail = vec![
            new_task("BBBBBB", "two", t(1)),
            Event::link("BBBBBB", "AAAAAA", t(2)),
        ];
        let mut graph = replay(&head).expect("replay head");
        extend(&mut graph, &tail).expect("extend");

        let all: Vec<Event> = head.into_iter().chain(tail).collect();
        assert_eq!(graph, replay(&all).expect("replay all"));
    }
}
