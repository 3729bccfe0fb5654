//! Pure mutation planners.
//!
//! Each planner validates a request against a freshly replayed [`Graph`] and
//! returns the events that implement it. Nothing here touches disk; the
//! store runs these under its lock and appends the result in one write.
//! An empty event list means the request was already satisfied.

use crate::error::ValidationError;
use crate::event::{
    Event, EventBody, Evidence, NewEpicPayload, NewTaskPayload, TaskState, Worker,
};
use crate::graph::{Graph, Task};
use crate::id;
use crate::oracle;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub body: String,
    pub worker: Worker,
    pub epic: Option<String>,
    /// IDs of existing tasks the new task depends on.
    pub after: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewEpic {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimChange {
    Claim(String),
    Release,
}

/// Field-by-field update. `None` leaves a field alone; `epic: Some(None)`
/// removes epic membership.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub body: Option<String>,
    pub epic: Option<Option<String>>,
    pub worker: Option<Worker>,
    pub claim: Option<ClaimChange>,
    pub state: Option<TaskState>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.body.is_none()
            && self.epic.is_none()
            && self.worker.is_none()
            && self.claim.is_none()
            && self.state.is_none()
    }
}

/// Which ready tasks a claim-next caller will take.
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    pub worker: Worker,
    pub epic: Option<String>,
}

/// Look up a live entity, distinguishing pruned IDs from unknown ones.
pub fn live<'a>(graph: &'a Graph, id: &str) -> Result<&'a Task, ValidationError> {
    match graph.task(id) {
        Some(task) => Ok(task),
        None if graph.is_tombstoned(id) => Err(ValidationError::Tombstoned(id.to_string())),
        None => Err(ValidationError::NotFound(id.to_string())),
    }
}

fn live_epic<'a>(graph: &'a Graph, id: &str) -> Result<&'a Task, ValidationError> {
    let epic = live(graph, id)?;
    if !epic.is_epic {
        return Err(ValidationError::NotAnEpic(id.to_string()));
    }
    Ok(epic)
}

fn clean_title(title: &str) -> Result<String, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(title.to_string())
}

fn clean_agent(agent: &str) -> Result<String, ValidationError> {
    let agent = agent.trim();
    if agent.is_empty() {
        return Err(ValidationError::EmptyAgent);
    }
    Ok(agent.to_string())
}

pub fn create_task(
    graph: &Graph,
    request: &NewTask,
    now: DateTime<Utc>,
) -> Result<(String, Vec<Event>), ValidationError> {
    let title = clean_title(&request.title)?;
    let epic = match &request.epic {
        Some(raw) => Some(live_epic(graph, &id::normalize(raw))?.id.clone()),
        None => None,
    };

    let mut after = BTreeSet::new();
    for raw in &request.after {
        let dep = live(graph, &id::normalize(raw))?;
        if dep.is_epic {
            return Err(ValidationError::MixedKinds {
                from: title.clone(),
                to: dep.id.clone(),
            });
        }
        after.insert(dep.id.clone());
    }

    let id = id::allocate(graph, &BTreeSet::new())?;
    let mut events = vec![Event::new(
        now,
        EventBody::NewTask(NewTaskPayload {
            id: id.clone(),
            uuid: Some(Uuid::new_v4()),
            title,
            body: request.body.clone(),
            state: TaskState::Todo,
            worker: request.worker,
            epic,
        }),
    )];
    events.extend(after.iter().map(|dep| Event::link(&id, dep, now)));
    Ok((id, events))
}

pub fn create_epic(
    graph: &Graph,
    request: &NewEpic,
    now: DateTime<Utc>,
) -> Result<(String, Vec<Event>), ValidationError> {
    let title = clean_title(&request.title)?;
    let id = id::allocate(graph, &BTreeSet::new())?;
    let event = Event::new(
        now,
        EventBody::NewEpic(NewEpicPayload {
            id: id.clone(),
            uuid: Some(Uuid::new_v4()),
            title,
            body: request.body.clone(),
        }),
    );
    Ok((id, vec![event]))
}

/// Apply `update` to one task or epic.
///
/// Fields apply in a fixed order: title and body, epic, worker, claim, then
/// state. `agent` is the acting agent; moving an unclaimed task to `doing`
/// claims it for that agent.
pub fn update(
    graph: &Graph,
    id: &str,
    update: &TaskUpdate,
    agent: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<Event>, ValidationError> {
    let id = id::normalize(id);
    let task = live(graph, &id)?;

    if task.is_epic {
        let field = if update.epic.is_some() {
            Some("epic")
        } else if update.worker.is_some() {
            Some("worker")
        } else if update.claim.is_some() {
            Some("claim")
        } else if update.state.is_some() {
            Some("state")
        } else {
            None
        };
        if let Some(field) = field {
            return Err(ValidationError::EpicField { id, field });
        }
    }

    let mut events = Vec::new();

    if let Some(title) = &update.title {
        let title = clean_title(title)?;
        if title != task.title {
            events.push(Event::title(&id, &title, now));
        }
    }
    if let Some(body) = &update.body
        && *body != task.body
    {
        events.push(Event::body(&id, body, now));
    }

    match &update.epic {
        Some(Some(raw)) => {
            let epic = live_epic(graph, &id::normalize(raw))?;
            if task.epic.as_deref() != Some(epic.id.as_str()) {
                events.push(Event::epic(&id, Some(epic.id.as_str()), now));
            }
        }
        Some(None) if task.epic.is_some() => events.push(Event::epic(&id, None, now)),
        _ => {}
    }

    if let Some(worker) = update.worker
        && task.worker != Some(worker)
    {
        events.push(Event::worker(&id, worker, now));
    }

    let state = task.task_state().unwrap_or_default();
    let mut claimed = task.claimed_by.clone();

    match &update.claim {
        Some(ClaimChange::Claim(agent)) => {
            let agent = clean_agent(agent)?;
            if state.is_closed() {
                return Err(ValidationError::ClaimClosed { id, state });
            }
            match claimed.clone() {
                Some(holder) if holder == agent => {}
                Some(holder) => {
                    return Err(ValidationError::AlreadyClaimed { id, by: holder });
                }
                None => {
                    events.push(Event::claim(&id, &agent, now));
                    claimed = Some(agent);
                }
            }
        }
        Some(ClaimChange::Release) if claimed.is_some() => {
            events.push(Event::unclaim(&id, now));
            claimed = None;
        }
        _ => {}
    }

    let mut final_state = state;
    if let Some(next) = update.state
        && next != state
    {
        if !state.can_transition_to(next) {
            return Err(ValidationError::InvalidTransition {
                id,
                from: state,
                to: next,
            });
        }
        if next == TaskState::Doing
            && claimed.is_none()
            && let Some(agent) = agent
        {
            let agent = clean_agent(agent)?;
            events.push(Event::claim(&id, &agent, now));
            claimed = Some(agent);
        }
        events.push(Event::state(&id, next, now));
        if next.clears_claim() {
            claimed = None;
        }
        final_state = next;
    }

    if !task.is_epic && final_state.requires_claim() && claimed.is_none() {
        return Err(ValidationError::ClaimRequired {
            id,
            state: final_state,
        });
    }

    Ok(events)
}

/// Add `from -> to`. An existing edge is a no-op.
pub fn link(
    graph: &Graph,
    from: &str,
    to: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Event>, ValidationError> {
    let (from, to) = (id::normalize(from), id::normalize(to));
    let source = live(graph, &from)?;
    let target = live(graph, &to)?;
    if from == to {
        return Err(ValidationError::SelfDependency(from));
    }
    if source.is_epic != target.is_epic {
        return Err(ValidationError::MixedKinds { from, to });
    }
    if graph.has_edge(&from, &to) {
        return Ok(Vec::new());
    }
    if oracle::has_cycle(graph, &from, &to) {
        return Err(ValidationError::Cycle { from, to });
    }
    Ok(vec![Event::link(&from, &to, now)])
}

pub fn unlink(
    graph: &Graph,
    from: &str,
    to: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Event>, ValidationError> {
    let (from, to) = (id::normalize(from), id::normalize(to));
    live(graph, &from)?;
    live(graph, &to)?;
    if !graph.has_edge(&from, &to) {
        return Err(ValidationError::EdgeNotFound { from, to });
    }
    Ok(vec![Event::unlink(&from, &to, now)])
}

/// The task claim-next would pick: oldest ready match, then lowest ID.
pub fn next_ready<'a>(graph: &'a Graph, filter: &ClaimFilter) -> Option<&'a Task> {
    oracle::ready_tasks(graph)
        .into_iter()
        .filter(|task| filter.worker.accepts(task.worker.unwrap_or_default()))
        .filter(|task| match &filter.epic {
            Some(epic) => task.epic.as_deref() == Some(epic.as_str()),
            None => true,
        })
        .min_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)))
}

/// Claim the next ready task for `agent` and move it to `doing`.
///
/// `Ok(None)` means there is no ready work matching the filter.
pub fn claim_next(
    graph: &Graph,
    agent: &str,
    filter: &ClaimFilter,
    now: DateTime<Utc>,
) -> Result<Option<(String, Vec<Event>)>, ValidationError> {
    let agent = clean_agent(agent)?;
    let filter = match &filter.epic {
        Some(raw) => ClaimFilter {
            worker: filter.worker,
            epic: Some(live_epic(graph, &id::normalize(raw))?.id.clone()),
        },
        None => filter.clone(),
    };
    let Some(task) = next_ready(graph, &filter) else {
        return Ok(None);
    };
    let events = vec![
        Event::claim(&task.id, &agent, now),
        Event::state(&task.id, TaskState::Doing, now),
    ];
    Ok(Some((task.id.clone(), events)))
}

pub fn attach_result(
    graph: &Graph,
    id: &str,
    evidence: Evidence,
    now: DateTime<Utc>,
) -> Result<Vec<Event>, ValidationError> {
    let id = id::normalize(id);
    live(graph, &id)?;
    Ok(vec![Event::result(&id, evidence, now)])
}
