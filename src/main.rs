use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

use ctm_core::cli::{commands, Cli, Command};
use ctm_core::{config::Config, paths};

fn main() -> Result<()> {
    let level = std::env::var("CTM_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let root = paths::ctm_root().context("resolving CTM root directory")?;
    let cli = Cli::parse();

    match run(&root, cli.command) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn run(root: &std::path::Path, command: Command) -> ctm_core::Result<String> {
    match command {
        Command::Status => commands::status(root),
        Command::List { all, status, project } => {
            commands::list(root, all, status.as_deref(), project.as_deref())
        }
        Command::Show { id } => commands::show(root, &id),
        Command::Spawn {
            title,
            goal,
            project,
            priority,
            tags,
            blocked_by,
            triggers,
            source,
        } => commands::spawn(
            root, &title, &goal, project, &priority, tags, blocked_by, triggers, source,
        ),
        Command::Switch { id } => commands::switch(root, &id),
        Command::Pause { id } => commands::pause(root, id.as_deref()),
        Command::Resume { id } => commands::resume(root, &id),
        Command::Complete { id, force } => commands::complete(root, id.as_deref(), force),
        Command::Cancel { id } => commands::cancel(root, &id),
        Command::Priority { id, direction } => commands::priority(root, &id, &direction),
        Command::Deadline { id, when } => commands::deadline(root, &id, when.as_deref()),
        Command::Deadlines => commands::deadlines(root),
        Command::Block { id, by } => commands::block(root, &id, &by),
        Command::Unblock { id, from } => commands::unblock(root, &id, from.as_deref()),
        Command::Deps { id, all } => commands::deps(root, id.as_deref(), all),
        Command::Queue => commands::queue(root),
        Command::Checkpoint { id } => {
            let config = Config::load(root, None)?;
            commands::checkpoint(root, id.as_deref(), config.checkpointing.keep)
        }
        Command::Restore { name } => commands::restore(root, name.as_deref()),
        Command::Consolidate => commands::consolidate(root),
        Command::Memory => commands::memory(root),
        Command::Repair => commands::repair(root),
    }
}
