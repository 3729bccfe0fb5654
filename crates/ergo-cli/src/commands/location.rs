use crate::support::{Context, exit_with_error, print_json};
use serde_json::json;

pub fn run(ctx: &Context) {
    let dir = ctx.data_dir().unwrap_or_else(|e| exit_with_error(&e));
    if ctx.json() {
        print_json(&json!({ "dir": dir.display().to_string() }));
    } else {
        println!("{}", dir.display());
    }
}
