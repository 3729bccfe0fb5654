//! Compaction: rewrite a graph as the shortest log that replays to it.
//!
//! Each live entity becomes its creation event (with the values it was
//! created with) followed by the field events needed to reach its current
//! state, then its results oldest first. Edges follow as fresh `link`
//! events. Tombstoned entities are not carried over.

use crate::event::{Event, EventBody, NewEpicPayload, NewTaskPayload};
use crate::graph::{Graph, Provenance, Task};
use chrono::{DateTime, Utc};

pub fn compact(graph: &Graph) -> Vec<Event> {
    let mut entities: Vec<&Task> = graph.tasks().collect();
    entities.sort_by(|a, b| {
        (!a.is_epic, a.created_at, &a.id).cmp(&(!b.is_epic, b.created_at, &b.id))
    });

    let mut events = Vec::new();
    for task in entities {
        let Some(prov) = graph.provenance_of(&task.id) else {
            continue;
        };
        entity_events(graph, task, prov, &mut events);
    }

    for (from, to) in graph.edges() {
        let at = match (graph.task(from), graph.task(to)) {
            (Some(a), Some(b)) => a.created_at.max(b.created_at),
            _ => continue,
        };
        events.push(Event::link(from, to, at));
    }

    tracing::debug!(
        entities = graph.len(),
        events = events.len(),
        "compacted graph"
    );
    events
}

// Same-timestamp field events sort in this order.
const RANK_TITLE: u8 = 0;
const RANK_BODY: u8 = 1;
const RANK_EPIC: u8 = 2;
const RANK_WORKER: u8 = 3;
const RANK_STATE_FIRST: u8 = 4;
const RANK_CLAIM: u8 = 5;
const RANK_STATE: u8 = 6;

fn entity_events(graph: &Graph, task: &Task, prov: &Provenance, out: &mut Vec<Event>) {
    let created = &prov.created;
    let touched = &prov.touched;
    let id = task.id.as_str();
    let at_or_created = |stamp: Option<DateTime<Utc>>| stamp.unwrap_or(task.created_at);

    // A membership pointing at a since-pruned epic cannot be re-created.
    let created_epic = created
        .epic
        .clone()
        .filter(|epic| graph.epic(epic).is_some());

    if task.is_epic {
        out.push(Event::new(
            task.created_at,
            EventBody::NewEpic(NewEpicPayload {
                id: task.id.clone(),
                uuid: Some(task.uuid),
                title: created.title.clone(),
                body: created.body.clone(),
            }),
        ));
    } else {
        out.push(Event::new(
            task.created_at,
            EventBody::NewTask(NewTaskPayload {
                id: task.id.clone(),
                uuid: Some(task.uuid),
                title: created.title.clone(),
                body: created.body.clone(),
                state: created.state.unwrap_or_default(),
                worker: created.worker.unwrap_or_default(),
                epic: created_epic.clone(),
            }),
        ));
    }

    let mut fields: Vec<(DateTime<Utc>, u8, Event)> = Vec::new();

    if task.title != created.title || touched.title.is_some() {
        let at = at_or_created(touched.title);
        fields.push((at, RANK_TITLE, Event::title(id, &task.title, at)));
    }
    if task.body != created.body || touched.body.is_some() {
        let at = at_or_created(touched.body);
        fields.push((at, RANK_BODY, Event::body(id, &task.body, at)));
    }

    if !task.is_epic {
        if task.epic != created_epic || touched.epic.is_some() {
            let at = at_or_created(touched.epic);
            fields.push((at, RANK_EPIC, Event::epic(id, task.epic.as_deref(), at)));
        }
        if task.worker != created.worker || touched.worker.is_some() {
            let at = at_or_created(touched.worker);
            let worker = task.worker.unwrap_or_default();
            fields.push((at, RANK_WORKER, Event::worker(id, worker, at)));
        }
        claim_and_state(task, prov, &mut fields);
    }

    fields.sort_by_key(|(at, rank, _)| (*at, *rank));
    out.extend(fields.into_iter().map(|(_, _, event)| event));

    out.extend(
        task.results
            .iter()
            .rev()
            .map(|result| Event::result(id, result.evidence.clone(), result.recorded_at)),
    );
}

/// A held claim on a task whose state clears claims must replay after that
/// state event, so it is never emitted earlier than it.
fn claim_and_state(task: &Task, prov: &Provenance, fields: &mut Vec<(DateTime<Utc>, u8, Event)>) {
    let id = task.id.as_str();
    let state = task.state.unwrap_or_default();
    let state_changed = task.state != prov.created.state || prov.touched.state.is_some();
    let state_at = prov.touched.state.unwrap_or(task.created_at);
    let claim_at = prov.touched.claim.unwrap_or(task.created_at);

    match &task.claimed_by {
        Some(agent) if state_changed && state.clears_claim() => {
            fields.push((state_at, RANK_STATE_FIRST, Event::state(id, state, state_at)));
            let at = claim_at.max(state_at);
            fields.push((at, RANK_CLAIM, Event::claim(id, agent, at)));
            return;
        }
        Some(agent) => fields.push((claim_at, RANK_CLAIM, Event::claim(id, agent, claim_at))),
        None if prov.touched.claim.is_some() => {
            fields.push((claim_at, RANK_CLAIM, Event::unclaim(id, claim_at)));
        }
        None => {}
    }
    if state_changed {
        fields.push((state_at, RANK_STATE, Event::state(id, state, state_at)));
    }
}

/// Whether replaying `compact(graph)` would give back the same observable
/// entities and edges.
pub fn is_equivalent(a: &Graph, b: &Graph) -> bool {
    a.tasks().eq(b.tasks()) && a.edges().eq(b.edges())
}
