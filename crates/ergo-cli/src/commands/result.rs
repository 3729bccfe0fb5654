use crate::support::{Context, TaskView, exit_with_error, print_json};
use ergo_core::{Error, capture_evidence, project_root};

pub fn run(ctx: &Context, id: String, path: String, summary: String) {
    let store = ctx.store_or_exit();
    let root = project_root(store.dir());

    // Hashing and git lookups run before the lock is taken.
    let evidence = capture_evidence(&root, store.dir(), &path, &summary)
        .unwrap_or_else(|e| exit_with_error(&Error::from(e)));
    let sha256 = evidence.sha256.clone();

    let task = store
        .attach_result(&id, evidence)
        .unwrap_or_else(|e| exit_with_error(&e));

    if ctx.json() {
        let graph = store.load().unwrap_or_else(|e| exit_with_error(&e));
        let current = graph.task(&task.id).unwrap_or(&task);
        print_json(&TaskView::new(&graph, current));
    } else {
        println!("ergo result\n  Task: {}\n  Path: {path}\n  SHA-256: {sha256}", task.id);
    }
}
