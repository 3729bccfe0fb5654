use crate::support::{Context, exit_with_error, print_json};
use ergo_core::Store;
use serde_json::json;

pub fn run(ctx: &Context) {
    let dir = ctx.init_dir();
    let existed = dir.is_dir();
    let store = Store::init(&dir).unwrap_or_else(|e| exit_with_error(&e));

    if ctx.json() {
        print_json(&json!({
            "action": "init",
            "dir": store.dir().display().to_string(),
            "created": !existed,
        }));
    } else if existed {
        println!("ergo init\n  Already initialized: {}", store.dir().display());
    } else {
        println!("ergo init\n  Created: {}", store.dir().display());
    }
}
