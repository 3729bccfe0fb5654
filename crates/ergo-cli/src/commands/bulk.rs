use crate::support::{Context, exit_with_error, fail, print_json};
use ergo_core::BulkPlan;
use std::io::Read;

pub fn run(ctx: &Context) {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .unwrap_or_else(|e| fail(format!("failed to read stdin: {e}")));
    let plan: BulkPlan = serde_json::from_str(&raw)
        .unwrap_or_else(|e| fail(format!("invalid bulk payload: {e}")));

    let store = ctx.store_or_exit();
    let created = store
        .create_bulk(&plan)
        .unwrap_or_else(|e| exit_with_error(&e));

    if ctx.json() {
        print_json(&created);
        return;
    }
    if let Some(epic) = &created.epic {
        println!("{epic}  epic");
    }
    for task in &created.tasks {
        println!("{}  {}", task.id, task.title);
    }
}
