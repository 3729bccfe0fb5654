//! ergo CLI: the `ergo` command.

mod cli;
mod commands;
mod logging;
mod support;

use clap::Parser;
use cli::{Cli, Commands};
use support::Context;

fn main() {
    let cli = Cli::parse();
    let ctx = Context::new(cli.global);
    logging::init_logging(ctx.global.log_level, ctx.config_log_level().as_deref());

    match cli.command {
        Commands::Init => commands::init::run(&ctx),

        Commands::New { command } => commands::new::run(&ctx, command),

        Commands::Bulk => commands::bulk::run(&ctx),

        Commands::List {
            ready,
            blocked,
            epic,
        } => commands::list::run(&ctx, ready, blocked, epic),

        Commands::Show { id } => commands::show::run(&ctx, id),

        Commands::Set {
            id,
            title,
            body,
            epic,
            no_epic,
            worker,
            claim,
            release,
            state,
        } => commands::set::run(
            &ctx,
            commands::set::Args {
                id,
                title,
                body,
                epic,
                no_epic,
                worker,
                claim,
                release,
                state,
            },
        ),

        Commands::Dep { id, dep, rm } => commands::dep::run(&ctx, id, dep, rm),

        Commands::Claim { epic, worker } => commands::claim::run(&ctx, epic, worker),

        Commands::AttachResult { id, path, summary } => commands::result::run(&ctx, id, path, summary),

        Commands::Prune { dry_run } => commands::prune::run(&ctx, dry_run),

        Commands::Compact => commands::compact::run(&ctx),

        Commands::Where => commands::location::run(&ctx),
    }
}
