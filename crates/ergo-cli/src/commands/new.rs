use crate::cli::NewCommands;
use crate::support::{Context, TaskView, exit_with_error, print_json};
use ergo_core::{NewEpic, NewTask, Store, Task};

pub fn run(ctx: &Context, command: NewCommands) {
    let store = ctx.store_or_exit();
    let created = match command {
        NewCommands::Task {
            title,
            body,
            worker,
            epic,
            after,
        } => store.create_task(&NewTask {
            title,
            body,
            worker: worker.into(),
            epic,
            after,
        }),
        NewCommands::Epic { title, body } => store.create_epic(&NewEpic { title, body }),
    }
    .unwrap_or_else(|e| exit_with_error(&e));

    render(ctx, &store, &created);
}

fn render(ctx: &Context, store: &Store, created: &Task) {
    if ctx.json() {
        let graph = store.load().unwrap_or_else(|e| exit_with_error(&e));
        match graph.task(&created.id) {
            Some(task) => print_json(&TaskView::new(&graph, task)),
            None => print_json(created),
        }
    } else {
        println!("{}", created.id);
    }
}
