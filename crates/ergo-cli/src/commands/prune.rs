use crate::support::{Context, exit_with_error, print_json};
use serde_json::json;

pub fn run(ctx: &Context, dry_run: bool) {
    let store = ctx.store_or_exit();
    let plan = store.prune(dry_run).unwrap_or_else(|e| exit_with_error(&e));

    if ctx.json() {
        print_json(&json!({
            "dry_run": dry_run,
            "pruned": plan.items,
        }));
        return;
    }
    if plan.is_empty() {
        println!("nothing to prune");
        return;
    }
    let verb = if dry_run { "would prune" } else { "pruned" };
    for item in &plan.items {
        let kind = if item.is_epic { "epic" } else { "task" };
        println!("{verb} {kind} {}  {}", item.id, item.title);
    }
}
