//! Event envelope and typed payloads for the append-only log.
//!
//! On disk every event is `{"type", "timestamp", "payload"}`. The envelope
//! decodes the payload by type; types this build does not know decode into
//! [`EventBody::Unknown`] so older readers keep working against newer logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const EVENT_NEW_TASK: &str = "new_task";
pub const EVENT_NEW_EPIC: &str = "new_epic";
pub const EVENT_STATE: &str = "state";
pub const EVENT_CLAIM: &str = "claim";
pub const EVENT_UNCLAIM: &str = "unclaim";
pub const EVENT_TITLE: &str = "title";
pub const EVENT_BODY: &str = "body";
pub const EVENT_EPIC: &str = "epic";
pub const EVENT_WORKER: &str = "worker";
pub const EVENT_LINK: &str = "link";
pub const EVENT_UNLINK: &str = "unlink";
pub const EVENT_RESULT: &str = "result";
pub const EVENT_TOMBSTONE: &str = "tombstone";

/// Task lifecycle state. Epics never carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Todo,
    Doing,
    Blocked,
    Done,
    Canceled,
    Error,
}

impl TaskState {
    pub const ALL: [TaskState; 6] = [
        TaskState::Todo,
        TaskState::Doing,
        TaskState::Blocked,
        TaskState::Done,
        TaskState::Canceled,
        TaskState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Todo => "todo",
            TaskState::Doing => "doing",
            TaskState::Blocked => "blocked",
            TaskState::Done => "done",
            TaskState::Canceled => "canceled",
            TaskState::Error => "error",
        }
    }

    /// Done or canceled: satisfies dependencies and is eligible for prune.
    pub fn is_closed(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Canceled)
    }

    /// Entering this state drops any claim holder.
    pub fn clears_claim(&self) -> bool {
        matches!(self, TaskState::Todo | TaskState::Done | TaskState::Canceled)
    }

    /// Being in this state requires a claim holder.
    pub fn requires_claim(&self) -> bool {
        matches!(self, TaskState::Doing | TaskState::Error)
    }

    /// Whether a mutation may move a task from `self` to `next`.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        match self {
            Todo => matches!(next, Doing | Blocked | Done | Canceled),
            Doing => matches!(next, Todo | Blocked | Done | Canceled | Error),
            Blocked => matches!(next, Todo | Doing | Done | Canceled),
            Error => matches!(next, Todo | Doing | Canceled),
            Done | Canceled => matches!(next, Todo),
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        TaskState::ALL
            .into_iter()
            .find(|state| state.as_str() == raw.trim())
            .ok_or_else(|| format!("unknown state `{raw}` (expected todo, doing, blocked, done, canceled, error)"))
    }
}

/// Worker affinity of a task, or the kind of worker asking for work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Worker {
    #[default]
    Any,
    Agent,
    Human,
}

impl Worker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Worker::Any => "any",
            Worker::Agent => "agent",
            Worker::Human => "human",
        }
    }

    /// Whether a caller of kind `self` may pick up a task tagged `task`.
    pub fn accepts(&self, task: Worker) -> bool {
        match self {
            Worker::Any => true,
            caller => task == Worker::Any || task == *caller,
        }
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Worker {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "any" => Ok(Worker::Any),
            "agent" => Ok(Worker::Agent),
            "human" => Ok(Worker::Human),
            other => Err(format!("unknown worker `{other}` (expected any, agent, human)")),
        }
    }
}

/// Evidence attached to a task by a `result` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    pub path: String,
    pub sha256: String,
    pub mtime: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
}

// ── Payloads ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTaskPayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub state: TaskState,
    #[serde(default)]
    pub worker: Worker,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEpicPayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdPayload {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePayload {
    pub id: String,
    pub state: TaskState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimPayload {
    pub id: String,
    pub agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitlePayload {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyPayload {
    pub id: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpicPayload {
    pub id: String,
    #[serde(default)]
    pub epic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPayload {
    pub id: String,
    pub worker: Worker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgePayload {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub id: String,
    #[serde(flatten)]
    pub evidence: Evidence,
}

/// Decoded event body, one variant per event type.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    NewTask(NewTaskPayload),
    NewEpic(NewEpicPayload),
    State(StatePayload),
    Claim(ClaimPayload),
    Unclaim(IdPayload),
    Title(TitlePayload),
    Body(BodyPayload),
    Epic(EpicPayload),
    Worker(WorkerPayload),
    Link(EdgePayload),
    Unlink(EdgePayload),
    Result(ResultPayload),
    Tombstone(IdPayload),
    /// A type this build does not understand; carried through, never applied.
    Unknown { kind: String, payload: Value },
}

impl EventBody {
    pub fn kind(&self) -> &str {
        match self {
            EventBody::NewTask(_) => EVENT_NEW_TASK,
            EventBody::NewEpic(_) => EVENT_NEW_EPIC,
            EventBody::State(_) => EVENT_STATE,
            EventBody::Claim(_) => EVENT_CLAIM,
            EventBody::Unclaim(_) => EVENT_UNCLAIM,
            EventBody::Title(_) => EVENT_TITLE,
            EventBody::Body(_) => EVENT_BODY,
            EventBody::Epic(_) => EVENT_EPIC,
            EventBody::Worker(_) => EVENT_WORKER,
            EventBody::Link(_) => EVENT_LINK,
            EventBody::Unlink(_) => EVENT_UNLINK,
            EventBody::Result(_) => EVENT_RESULT,
            EventBody::Tombstone(_) => EVENT_TOMBSTONE,
            EventBody::Unknown { kind, .. } => kind,
        }
    }

    /// Every entity ID this event mentions.
    pub fn referenced_ids(&self) -> Vec<&str> {
        match self {
            EventBody::NewTask(p) => {
                let mut ids = vec![p.id.as_str()];
                ids.extend(p.epic.as_deref());
                ids
            }
            EventBody::NewEpic(p) => vec![p.id.as_str()],
            EventBody::State(p) => vec![p.id.as_str()],
            EventBody::Claim(p) => vec![p.id.as_str()],
            EventBody::Unclaim(p) | EventBody::Tombstone(p) => vec![p.id.as_str()],
            EventBody::Title(p) => vec![p.id.as_str()],
            EventBody::Body(p) => vec![p.id.as_str()],
            EventBody::Epic(p) => {
                let mut ids = vec![p.id.as_str()];
                ids.extend(p.epic.as_deref());
                ids
            }
            EventBody::Worker(p) => vec![p.id.as_str()],
            EventBody::Link(p) | EventBody::Unlink(p) => vec![p.from.as_str(), p.to.as_str()],
            EventBody::Result(p) => vec![p.id.as_str()],
            EventBody::Unknown { .. } => Vec::new(),
        }
    }
}

/// One immutable, timestamped log record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawEvent")]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub body: EventBody,
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>, body: EventBody) -> Self {
        Self { timestamp, body }
    }

    pub fn kind(&self) -> &str {
        self.body.kind()
    }

    pub fn state(id: &str, state: TaskState, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            timestamp,
            EventBody::State(StatePayload {
                id: id.to_string(),
                state,
            }),
        )
    }

    pub fn claim(id: &str, agent: &str, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            timestamp,
            EventBody::Claim(ClaimPayload {
                id: id.to_string(),
                agent: agent.to_string(),
            }),
        )
    }

    pub fn unclaim(id: &str, timestamp: DateTime<Utc>) -> Self {
        Self::new(timestamp, EventBody::Unclaim(IdPayload { id: id.to_string() }))
    }

    pub fn title(id: &str, title: &str, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            timestamp,
            EventBody::Title(TitlePayload {
                id: id.to_string(),
                title: title.to_string(),
            }),
        )
    }

    pub fn body(id: &str, body: &str, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            timestamp,
            EventBody::Body(BodyPayload {
                id: id.to_string(),
                body: body.to_string(),
            }),
        )
    }

    pub fn epic(id: &str, epic: Option<&str>, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            timestamp,
            EventBody::Epic(EpicPayload {
                id: id.to_string(),
                epic: epic.map(str::to_string),
            }),
        )
    }

    pub fn worker(id: &str, worker: Worker, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            timestamp,
            EventBody::Worker(WorkerPayload {
                id: id.to_string(),
                worker,
            }),
        )
    }

    pub fn link(from: &str, to: &str, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            timestamp,
            EventBody::Link(EdgePayload {
                from: from.to_string(),
                to: to.to_string(),
            }),
        )
    }

    pub fn unlink(from: &str, to: &str, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            timestamp,
            EventBody::Unlink(EdgePayload {
                from: from.to_string(),
                to: to.to_string(),
            }),
        )
    }

    pub fn result(id: &str, evidence: Evidence, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            timestamp,
            EventBody::Result(ResultPayload {
                id: id.to_string(),
                evidence,
            }),
        )
    }

    pub fn tombstone(id: &str, timestamp: DateTime<Utc>) -> Self {
        Self::new(timestamp, EventBody::Tombstone(IdPayload { id: id.to_string() }))
    }
}

/// Wire shape of one log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    payload: Value,
}

impl TryFrom<RawEvent> for Event {
    type Error = serde_json::Error;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let RawEvent {
            kind,
            timestamp,
            payload,
        } = raw;
        let body = match kind.as_str() {
            EVENT_NEW_TASK => EventBody::NewTask(serde_json::from_value(payload)?),
            EVENT_NEW_EPIC => EventBody::NewEpic(serde_json::from_value(payload)?),
            EVENT_STATE => EventBody::State(serde_json::from_value(payload)?),
            EVENT_CLAIM => EventBody::Claim(serde_json::from_value(payload)?),
            EVENT_UNCLAIM => EventBody::Unclaim(serde_json::from_value(payload)?),
            EVENT_TITLE => EventBody::Title(serde_json::from_value(payload)?),
            EVENT_BODY => EventBody::Body(serde_json::from_value(payload)?),
            EVENT_EPIC => EventBody::Epic(serde_json::from_value(payload)?),
            EVENT_WORKER => EventBody::Worker(serde_json::from_value(payload)?),
            EVENT_LINK => EventBody::Link(serde_json::from_value(payload)?),
            EVENT_UNLINK => EventBody::Unlink(serde_json::from_value(payload)?),
            EVENT_RESULT => EventBody::Result(serde_json::from_value(payload)?),
            EVENT_TOMBSTONE => EventBody::Tombstone(serde_json::from_value(payload)?),
            _ => EventBody::Unknown { kind, payload },
        };
        Ok(Event { timestamp, body })
    }
}

impl TryFrom<&Event> for RawEvent {
    type Error = serde_json::Error;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        let payload = match &event.body {
            EventBody::NewTask(p) => serde_json::to_value(p)?,
            EventBody::NewEpic(p) => serde_json::to_value(p)?,
            EventBody::State(p) => serde_json::to_value(p)?,
            EventBody::Claim(p) => serde_json::to_value(p)?,
            EventBody::Unclaim(p) | EventBody::Tombstone(p) => serde_json::to_value(p)?,
            EventBody::Title(p) => serde_json::to_value(p)?,
            EventBody::Body(p) => serde_json::to_value(p)?,
            EventBody::Epic(p) => serde_json::to_value(p)?,
            EventBody::Worker(p) => serde_json::to_value(p)?,
            EventBody::Link(p) | EventBody::Unlink(p) => serde_json::to_value(p)?,
            EventBody::Result(p) => serde_json::to_value(p)?,
            EventBody::Unknown { payload, .. } => payload.clone(),
        };
        Ok(RawEvent {
            kind: event.kind().to_string(),
            timestamp: event.timestamp,
            payload,
        })
    }
}

// Hand-written so a payload that fails to serialize surfaces as an error
// instead of a null payload on disk.
impl Serialize for Event {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawEvent::try_from(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0)
            .single()
            .expect("fixed time")
    }

    #[test]
    fn event_line_uses_type_timestamp_payload_envelope() {
        let line = serde_json::to_string(&Event::claim("ABC234", "worker-a", ts()))
            .expect("event should serialize");
        let value: Value = serde_json::from_str(&line).expect("line should be json");
        assert_eq!(value["type"], "claim");
        assert_eq!(value["payload"]["id"], "ABC234");
        assert_eq!(value["payload"]["agent"], "worker-a");
        assert!(value["timestamp"].as_str().is_some());
    }

    #[test]
    fn unknown_event_type_decodes_as_opaque() {
        let raw = r#"{"type":"label","timestamp":"2026-03-01T09:30:00Z","payload":{"id":"ABC234","label":"x"}}"#;
        let event: Event = serde_json::from_str(raw).expect("unknown type must parse");
        match event.body {
            EventBody::Unknown { kind, payload } => {
                assert_eq!(kind, "label");
                assert_eq!(payload["label"], "x");
            }
            other => panic!("expected unknown body, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_reserializes_with_its_payload() {
        let raw = r#"{"type":"label","timestamp":"2026-03-01T09:30:00Z","payload":{"id":"ABC234","label":"x"}}"#;
        let event: Event = serde_json::from_str(raw).expect("unknown type must parse");
        let value = serde_json::to_value(&event).expect("event should serialize");
        assert_eq!(value["type"], "label");
        assert_eq!(value["payload"]["label"], "x");
        assert_eq!(serde_json::from_value::<Event>(value).expect("reparse"), event);
    }

    #[test]
    fn known_type_with_bad_payload_is_rejected() {
        let raw = r#"{"type":"state","timestamp":"2026-03-01T09:30:00Z","payload":{"id":"ABC234","state":"sleeping"}}"#;
        assert!(serde_json::from_str::<Event>(raw).is_err());
    }

    #[test]
    fn new_task_payload_fills_defaults_for_old_lines() {
        let raw = r#"{"type":"new_task","timestamp":"2026-03-01T09:30:00Z","payload":{"id":"ABC234","body":"Fix it"}}"#;
        let event: Event = serde_json::from_str(raw).expect("legacy new_task must parse");
        let EventBody::NewTask(payload) = event.body else {
            panic!("expected new_task");
        };
        assert_eq!(payload.title, "");
        assert_eq!(payload.state, TaskState::Todo);
        assert_eq!(payload.worker, Worker::Any);
        assert_eq!(payload.uuid, None);
    }

    #[test]
    fn transition_table_allows_reopen_only_from_closed_states() {
        assert!(TaskState::Done.can_transition_to(TaskState::Todo));
        assert!(!TaskState::Done.can_transition_to(TaskState::Doing));
        assert!(!TaskState::Canceled.can_transition_to(TaskState::Done));
        assert!(TaskState::Doing.can_transition_to(TaskState::Error));
        assert!(!TaskState::Todo.can_transition_to(TaskState::Error));
    }

    #[test]
    fn worker_affinity_matching() {
        assert!(Worker::Agent.accepts(Worker::Any));
        assert!(Worker::Agent.accepts(Worker::Agent));
        assert!(!Worker::Agent.accepts(Worker::Human));
        assert!(Worker::Any.accepts(Worker::Human));
    }
}
