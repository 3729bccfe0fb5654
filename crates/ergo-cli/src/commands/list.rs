use crate::support::{Context, TaskView, exit_with_error, print_json, task_line};
use ergo_core::id::normalize;
use ergo_core::oracle::{blocked_tasks, ready_tasks};
use ergo_core::{Error, Graph, Task, ValidationError, topo_order};

pub fn run(ctx: &Context, ready: bool, blocked: bool, epic: Option<String>) {
    let store = ctx.store_or_exit();
    let graph = store.load().unwrap_or_else(|e| exit_with_error(&e));

    let epic = epic.map(|raw| normalize(&raw));
    if let Some(epic_id) = &epic
        && graph.epic(epic_id).is_none()
    {
        let err = if graph.contains(epic_id) {
            ValidationError::NotAnEpic(epic_id.clone())
        } else if graph.is_tombstoned(epic_id) {
            ValidationError::Tombstoned(epic_id.clone())
        } else {
            ValidationError::NotFound(epic_id.clone())
        };
        exit_with_error(&Error::from(err));
    }

    let in_scope = |task: &&Task| match &epic {
        Some(epic_id) => task.epic.as_deref() == Some(epic_id.as_str()),
        None => true,
    };

    if ready || blocked {
        let selected: Vec<&Task> = if ready {
            ready_tasks(&graph)
        } else {
            blocked_tasks(&graph)
        };
        let ids: Vec<&str> = selected
            .into_iter()
            .filter(in_scope)
            .map(|task| task.id.as_str())
            .collect();
        render_flat(ctx, &graph, &topo_order(&graph, &ids));
        return;
    }

    match &epic {
        Some(epic_id) => {
            let ids: Vec<&str> = graph
                .tasks_in_epic(epic_id)
                .map(|task| task.id.as_str())
                .collect();
            render_flat(ctx, &graph, &topo_order(&graph, &ids));
        }
        None => render_grouped(ctx, &graph),
    }
}

fn render_flat(ctx: &Context, graph: &Graph, tasks: &[&Task]) {
    if ctx.json() {
        let views: Vec<TaskView> = tasks
            .iter()
            .map(|task| TaskView::new(graph, task))
            .collect();
        print_json(&views);
    } else {
        for task in tasks {
            println!("{}", task_line(graph, task));
        }
    }
}

/// Epics in dependency order, each followed by its tasks, then the tasks
/// that belong to no epic.
fn render_grouped(ctx: &Context, graph: &Graph) {
    let epic_ids: Vec<&str> = graph.epics().map(|epic| epic.id.as_str()).collect();
    let loose: Vec<&str> = graph
        .tasks()
        .filter(|task| !task.is_epic && task.epic.is_none())
        .map(|task| task.id.as_str())
        .collect();

    let mut ordered: Vec<(usize, &Task)> = Vec::new();
    for epic in topo_order(graph, &epic_ids) {
        ordered.push((0, epic));
        let members: Vec<&str> = graph
            .tasks_in_epic(&epic.id)
            .map(|task| task.id.as_str())
            .collect();
        ordered.extend(topo_order(graph, &members).into_iter().map(|task| (1, task)));
    }
    ordered.extend(topo_order(graph, &loose).into_iter().map(|task| (0, task)));

    if ctx.json() {
        let views: Vec<TaskView> = ordered
            .iter()
            .map(|(_, task)| TaskView::new(graph, task))
            .collect();
        print_json(&views);
        return;
    }
    for (depth, task) in ordered {
        println!("{}{}", "  ".repeat(depth), task_line(graph, task));
    }
}
