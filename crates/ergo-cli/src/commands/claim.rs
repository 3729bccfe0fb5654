use crate::cli::WorkerArg;
use crate::support::{
    Context, EXIT_NO_READY_WORK, TaskView, exit_with_error, print_json, task_line,
};
use ergo_core::ClaimFilter;
use serde_json::Value;

pub fn run(ctx: &Context, epic: Option<String>, worker: WorkerArg) {
    let store = ctx.store_or_exit();
    let agent = ctx.agent_or_exit(&store);
    let filter = ClaimFilter {
        worker: worker.into(),
        epic,
    };

    let Some(claimed) = store
        .claim_next(&agent, &filter)
        .unwrap_or_else(|e| exit_with_error(&e))
    else {
        if ctx.json() {
            print_json(&Value::Null);
        }
        eprintln!("no ready work");
        std::process::exit(EXIT_NO_READY_WORK);
    };

    let graph = store.load().unwrap_or_else(|e| exit_with_error(&e));
    let task = graph.task(&claimed.id).unwrap_or(&claimed);
    if ctx.json() {
        print_json(&TaskView::new(&graph, task));
    } else {
        println!("{}", task_line(&graph, task));
        if !task.body.is_empty() {
            println!();
            println!("{}", task.body);
        }
    }
}
