//! # ergo-core
//!
//! Storage and consistency core for a file-backed task backlog shared by
//! many short-lived processes.
//!
//! This crate provides:
//! - the event envelope and payloads (`event`)
//! - the append-only JSONL log with tolerant tail and strict interior (`log`)
//! - deterministic replay into an in-memory [`Graph`] (`replay`, `graph`)
//! - cycle detection, readiness, and display ordering (`oracle`)
//! - pure mutation planners (`ops`, `bulk`) and the locked [`Store`]
//! - compaction and prune planning (`compact`, `prune`)
//!
//! It never prints. Rendering, argument parsing, and exit codes live in
//! `ergo-cli`.
//!
//! ## Data model
//!
//! ```text
//! .ergo/events.jsonl (append-only, one event per line)
//!     ↓  log::read + replay
//! Graph (live tasks/epics, edges, tombstones, provenance)
//!     ↓  ops::* plan under .ergo/lock
//! Vec<Event> → log::append (single write)
//!
//! Graph → compact → log::write_full (temp + rename + dir sync)
//! ```

pub mod bulk;
pub mod compact;
pub mod config;
pub mod dir;
pub mod error;
pub mod event;
pub mod evidence;
pub mod graph;
pub mod id;
pub mod log;
pub mod ops;
pub mod oracle;
pub mod prune;
pub mod replay;
pub mod store;

pub use bulk::{BulkCreated, BulkEpic, BulkPlan, BulkTask, CreatedTask, plan_bulk};
pub use compact::{compact, is_equivalent};
pub use config::{AGENT_ENV, CONFIG_FILE, Config, ConfigError, resolve_agent};
pub use dir::{DATA_DIR, DirOptions, ergo_dir, project_root};
pub use error::{Error, Result, ValidationError};
pub use event::{Event, EventBody, Evidence, TaskState, Worker};
pub use evidence::{EvidenceError, capture_evidence};
pub use graph::{Graph, Task, TaskResult};
pub use log::LogError;
pub use ops::{ClaimChange, ClaimFilter, NewEpic, NewTask, TaskUpdate};
pub use oracle::{has_cycle, is_blocked, is_ready, topo_order};
pub use prune::{PruneItem, PrunePlan};
pub use replay::{ReplayError, replay};
pub use store::{CompactReport, EVENTS_FILE, LOCK_FILE, Store};
