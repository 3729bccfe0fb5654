use clap::{Args, Parser, Subcommand, ValueEnum};
use ergo_core::{TaskState, Worker};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ergo",
    about = "ergo: a plain-text, append-only task graph shared by agents and humans",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone, Debug)]
pub struct GlobalArgs {
    /// Data directory (default: nearest `.ergo/` at or above the working directory)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Agent identity used for claims (default: ERGO_AGENT, config, then user@host)
    #[arg(long, global = true)]
    pub agent: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log level for diagnostics on stderr (default: ERGO_LOG, config, then warn)
    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the data directory, the event log, and the lock file
    Init,

    /// Create a task or an epic
    New {
        #[command(subcommand)]
        command: NewCommands,
    },

    /// Create an optional epic and several linked tasks from JSON on stdin
    Bulk,

    /// List tasks and epics in dependency order
    List {
        /// Only tasks that are ready to start
        #[arg(long, conflicts_with = "blocked")]
        ready: bool,

        /// Only tasks waiting on unfinished dependencies
        #[arg(long)]
        blocked: bool,

        /// Only tasks in this epic
        #[arg(long)]
        epic: Option<String>,
    },

    /// Show one task or epic
    Show {
        /// Task or epic ID
        id: String,
    },

    /// Change fields, claim, or state of a task or epic
    Set {
        /// Task or epic ID
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New body
        #[arg(long)]
        body: Option<String>,

        /// Move the task into this epic
        #[arg(long, conflicts_with = "no_epic")]
        epic: Option<String>,

        /// Remove the task from its epic
        #[arg(long)]
        no_epic: bool,

        /// Worker affinity
        #[arg(long, value_enum)]
        worker: Option<WorkerArg>,

        /// Claim for this agent
        #[arg(long, conflicts_with = "release")]
        claim: Option<String>,

        /// Release the current claim
        #[arg(long)]
        release: bool,

        /// Lifecycle state
        #[arg(long, value_enum)]
        state: Option<StateArg>,
    },

    /// Add (or with --rm remove) a dependency: ID waits on DEP
    Dep {
        /// Dependent task or epic ID
        id: String,

        /// Task or epic it waits on
        dep: String,

        /// Remove the dependency instead
        #[arg(long)]
        rm: bool,
    },

    /// Claim the oldest ready task and start it
    Claim {
        /// Only consider tasks in this epic
        #[arg(long)]
        epic: Option<String>,

        /// Kind of worker asking for work
        #[arg(long, value_enum, default_value = "any")]
        worker: WorkerArg,
    },

    /// Attach a result file (path relative to the project root) to a task
    #[command(name = "result")]
    AttachResult {
        /// Task or epic ID
        id: String,

        /// Result file, relative to the project root
        path: String,

        /// One-line summary of the result
        #[arg(long, default_value = "")]
        summary: String,
    },

    /// Remove closed tasks and finished epics
    Prune {
        /// Report what would be removed without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Rewrite the event log in its minimal equivalent form
    Compact,

    /// Print the data directory in use
    Where,
}

#[derive(Subcommand, Clone, Debug)]
pub enum NewCommands {
    /// Create a task
    Task {
        /// Task title
        title: String,

        /// Task body
        #[arg(long, default_value = "")]
        body: String,

        /// Worker affinity
        #[arg(long, value_enum, default_value = "any")]
        worker: WorkerArg,

        /// Epic the task belongs to
        #[arg(long)]
        epic: Option<String>,

        /// Tasks this one waits on (repeatable)
        #[arg(long)]
        after: Vec<String>,
    },

    /// Create an epic
    Epic {
        /// Epic title
        title: String,

        /// Epic body
        #[arg(long, default_value = "")]
        body: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StateArg {
    #[value(name = "todo")]
    Todo,
    #[value(name = "doing")]
    Doing,
    #[value(name = "blocked")]
    Blocked,
    #[value(name = "done")]
    Done,
    #[value(name = "canceled")]
    Canceled,
    #[value(name = "error")]
    Error,
}

impl From<StateArg> for TaskState {
    fn from(arg: StateArg) -> Self {
        match arg {
            StateArg::Todo => TaskState::Todo,
            StateArg::Doing => TaskState::Doing,
            StateArg::Blocked => TaskState::Blocked,
            StateArg::Done => TaskState::Done,
            StateArg::Canceled => TaskState::Canceled,
            StateArg::Error => TaskState::Error,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum WorkerArg {
    #[value(name = "any")]
    Any,
    #[value(name = "agent")]
    Agent,
    #[value(name = "human")]
    Human,
}

impl From<WorkerArg> for Worker {
    fn from(arg: WorkerArg) -> Self {
        match arg {
            WorkerArg::Any => Worker::Any,
            WorkerArg::Agent => Worker::Agent,
            WorkerArg::Human => Worker::Human,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}
