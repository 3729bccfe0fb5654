use crate::support::{Context, exit_with_error, print_json};
use ergo_core::id::normalize;
use serde_json::json;

pub fn run(ctx: &Context, id: String, dep: String, rm: bool) {
    let store = ctx.store_or_exit();
    let (from, to) = (normalize(&id), normalize(&dep));

    let (action, changed) = if rm {
        store
            .unlink(&from, &to)
            .unwrap_or_else(|e| exit_with_error(&e));
        ("dep.rm", true)
    } else {
        let changed = store
            .link(&from, &to)
            .unwrap_or_else(|e| exit_with_error(&e));
        ("dep.add", changed)
    };

    if ctx.json() {
        print_json(&json!({
            "action": action,
            "from": from,
            "to": to,
            "changed": changed,
        }));
    } else if rm {
        println!("ergo dep\n  Removed: {from} -> {to}");
    } else if changed {
        println!("ergo dep\n  Added: {from} -> {to}");
    } else {
        println!("ergo dep\n  Unchanged: {from} -> {to} already exists");
    }
}
