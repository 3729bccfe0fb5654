use crate::cli::GlobalArgs;
use ergo_core::oracle::{is_epic_complete, unmet_dependencies};
use ergo_core::{
    AGENT_ENV, Config, DATA_DIR, DirOptions, Error, Graph, Store, Task, ergo_dir, is_blocked,
    is_ready, resolve_agent,
};
use serde::Serialize;
use std::fmt::Display;
use std::path::PathBuf;

pub const EXIT_ERROR: i32 = 1;
pub const EXIT_NO_READY_WORK: i32 = 3;
/// EX_TEMPFAIL: another writer holds the lock; retry.
pub const EXIT_LOCK_BUSY: i32 = 75;

/// Global flags shared by every command.
pub struct Context {
    pub global: GlobalArgs,
}

impl Context {
    pub fn new(global: GlobalArgs) -> Self {
        Self { global }
    }

    pub fn json(&self) -> bool {
        self.global.json
    }

    fn dir_options(&self) -> DirOptions {
        DirOptions {
            explicit: self.global.dir.clone(),
            start: current_dir_or_exit(),
        }
    }

    pub fn data_dir(&self) -> Result<PathBuf, Error> {
        ergo_dir(&self.dir_options())
    }

    /// Where `init` should create the data directory.
    pub fn init_dir(&self) -> PathBuf {
        match &self.global.dir {
            Some(dir) => dir.clone(),
            None => current_dir_or_exit().join(DATA_DIR),
        }
    }

    pub fn store_or_exit(&self) -> Store {
        let dir = self.data_dir().unwrap_or_else(|e| exit_with_error(&e));
        Store::open(dir).unwrap_or_else(|e| exit_with_error(&e))
    }

    pub fn agent_or_exit(&self, store: &Store) -> String {
        let config = store.config().unwrap_or_else(|e| exit_with_error(&e));
        resolve_agent(
            self.global.agent.as_deref(),
            std::env::var(AGENT_ENV).ok().as_deref(),
            &config,
        )
    }

    /// Best-effort config lookup for logging, before any command runs.
    pub fn config_log_level(&self) -> Option<String> {
        self.data_dir()
            .ok()
            .and_then(|dir| Config::load(&dir).ok())
            .and_then(|config| config.log_level)
    }
}

fn current_dir_or_exit() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|e| fail(format!("cannot read working directory: {e}")))
}

pub fn exit_code(err: &Error) -> i32 {
    if err.is_lock_busy() {
        EXIT_LOCK_BUSY
    } else {
        EXIT_ERROR
    }
}

pub fn exit_with_error(err: &Error) -> ! {
    tracing::debug!(error = ?err, "command failed");
    eprintln!("error: {err}");
    std::process::exit(exit_code(err));
}

pub fn fail(message: impl Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(EXIT_ERROR);
}

pub fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("json serialization")
    );
}

/// A task as rendered by every command that prints one.
#[derive(Debug, Serialize)]
pub struct TaskView<'a> {
    #[serde(flatten)]
    pub task: &'a Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
    pub after: Vec<&'a str>,
    pub dependents: Vec<&'a str>,
}

impl<'a> TaskView<'a> {
    pub fn new(graph: &'a Graph, task: &'a Task) -> Self {
        let (ready, blocked, complete) = if task.is_epic {
            (None, None, Some(is_epic_complete(graph, &task.id)))
        } else {
            (
                Some(is_ready(task, graph)),
                Some(is_blocked(task, graph)),
                None,
            )
        };
        Self {
            task,
            ready,
            blocked,
            complete,
            after: graph.deps_of(&task.id).collect(),
            dependents: graph.dependents_of(&task.id).collect(),
        }
    }
}

/// One-line plain rendering: `ID  state  title  (@agent) [after X, Y]`.
pub fn task_line(graph: &Graph, task: &Task) -> String {
    if task.is_epic {
        let mark = if is_epic_complete(graph, &task.id) {
            "complete"
        } else {
            "epic"
        };
        return format!("{}  {:<8} {}", task.id, mark, task.title);
    }

    let state = task.state.map(|s| s.as_str()).unwrap_or("todo");
    let mut line = format!("{}  {:<8} {}", task.id, state, task.title);
    if let Some(agent) = &task.claimed_by {
        line.push_str(&format!("  (@{agent})"));
    }
    let waiting = unmet_dependencies(graph, task);
    if !waiting.is_empty() {
        line.push_str(&format!("  [after {}]", waiting.join(", ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use ergo_core::LogError;

    #[test]
    fn lock_contention_maps_to_tempfail() {
        let busy = Error::LockBusy {
            lock_path: ".ergo/lock".to_string(),
        };
        assert_eq!(exit_code(&busy), EXIT_LOCK_BUSY);

        let other = Error::Log(LogError::Serialize("boom".to_string()));
        assert_eq!(exit_code(&other), EXIT_ERROR);
    }
}
