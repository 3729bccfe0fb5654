use crate::support::{Context, TaskView, exit_with_error, print_json, task_line};
use ergo_core::id::normalize;
use ergo_core::ops::live;
use ergo_core::{Error, Graph, Task};

pub fn run(ctx: &Context, id: String) {
    let store = ctx.store_or_exit();
    let graph = store.load().unwrap_or_else(|e| exit_with_error(&e));
    let task = live(&graph, &normalize(&id)).unwrap_or_else(|e| exit_with_error(&Error::from(e)));

    if ctx.json() {
        print_json(&TaskView::new(&graph, task));
    } else {
        print_plain(&graph, task);
    }
}

fn print_plain(graph: &Graph, task: &Task) {
    println!("{}", task_line(graph, task));
    println!();
    if let Some(worker) = task.worker {
        println!("  worker:  {worker}");
    }
    if let Some(epic) = &task.epic {
        let title = graph.task(epic).map(|e| e.title.as_str()).unwrap_or("");
        println!("  epic:    {epic}  {title}");
    }
    println!("  created: {}", task.created_at.to_rfc3339());
    println!("  updated: {}", task.updated_at.to_rfc3339());

    let after: Vec<&str> = graph.deps_of(&task.id).collect();
    if !after.is_empty() {
        println!("  after:");
        for dep in after.iter().filter_map(|id| graph.task(id)) {
            println!("    {}", task_line(graph, dep));
        }
    }
    let dependents: Vec<&str> = graph.dependents_of(&task.id).collect();
    if !dependents.is_empty() {
        println!("  before:");
        for dependent in dependents.iter().filter_map(|id| graph.task(id)) {
            println!("    {}", task_line(graph, dependent));
        }
    }
    if task.is_epic {
        let members: Vec<&Task> = graph.tasks_in_epic(&task.id).collect();
        if !members.is_empty() {
            println!("  tasks:");
            for member in members {
                println!("    {}", task_line(graph, member));
            }
        }
    }
    if !task.body.is_empty() {
        println!();
        println!("{}", task.body);
    }
    if !task.results.is_empty() {
        println!();
        println!("results:");
        for result in &task.results {
            let evidence = &result.evidence;
            println!(
                "  {}  {}  {}",
                result.recorded_at.to_rfc3339(),
                evidence.path,
                evidence.summary
            );
            println!("    sha256 {}", evidence.sha256);
            if let Some(commit) = &evidence.git_commit {
                println!("    commit {commit}");
            }
        }
    }
}
