use crate::cli::{StateArg, WorkerArg};
use crate::support::{Context, TaskView, exit_with_error, fail, print_json, task_line};
use ergo_core::{ClaimChange, TaskUpdate};

pub struct Args {
    pub id: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub epic: Option<String>,
    pub no_epic: bool,
    pub worker: Option<WorkerArg>,
    pub claim: Option<String>,
    pub release: bool,
    pub state: Option<StateArg>,
}

impl Args {
    fn update(&self) -> TaskUpdate {
        let epic = if self.no_epic {
            Some(None)
        } else {
            self.epic.clone().map(Some)
        };
        let claim = if self.release {
            Some(ClaimChange::Release)
        } else {
            self.claim.clone().map(ClaimChange::Claim)
        };
        TaskUpdate {
            title: self.title.clone(),
            body: self.body.clone(),
            epic,
            worker: self.worker.map(Into::into),
            claim,
            state: self.state.map(Into::into),
        }
    }
}

pub fn run(ctx: &Context, args: Args) {
    let update = args.update();
    if update.is_empty() {
        fail("nothing to change (pass --title, --body, --epic, --worker, --claim, --release, or --state)");
    }

    let store = ctx.store_or_exit();
    let agent = ctx.agent_or_exit(&store);
    let task = store
        .update(&args.id, &update, Some(&agent))
        .unwrap_or_else(|e| exit_with_error(&e));

    let graph = store.load().unwrap_or_else(|e| exit_with_error(&e));
    let current = graph.task(&task.id).unwrap_or(&task);
    if ctx.json() {
        print_json(&TaskView::new(&graph, current));
    } else {
        println!("{}", task_line(&graph, current));
    }
}
