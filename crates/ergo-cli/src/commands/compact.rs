use crate::support::{Context, exit_with_error, print_json};

pub fn run(ctx: &Context) {
    let store = ctx.store_or_exit();
    let report = store.compact().unwrap_or_else(|e| exit_with_error(&e));
    if ctx.json() {
        print_json(&report);
    } else {
        println!(
            "ergo compact\n  Events: {} -> {}\n  Path: {}",
            report.before,
            report.after,
            store.events_path().display()
        );
    }
}
