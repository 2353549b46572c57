//! MenuTree CLI - Main entry point

mod commands;
mod init;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// MenuTree - permission/menu tree administration
#[derive(Parser, Debug)]
#[command(name = "menutree")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// SQLite database path (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and print its schema version
    Init {
        /// Also write a project config (.menutree/menutree.json)
        #[arg(long)]
        write_config: bool,
    },
    /// Apply a JSON batch file atomically
    Apply {
        /// Batch file ({ "name": ..., "mutations": [...] })
        file: PathBuf,

        /// Migration name; a named batch is applied only once
        #[arg(short, long)]
        name: Option<String>,

        /// Validate without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// List children ordered by (sort, id); roots when no parent is given
    Children {
        parent: Option<i64>,
    },
    /// List every node below a target, level by level
    Descendants {
        /// Node id or code
        target: String,
    },
    /// Print one node as JSON
    Show {
        /// Node id or code
        target: String,
    },
    /// Print the menu tree visible to a scope
    Resolve {
        #[command(flatten)]
        scope: commands::ScopeArgs,
    },
    /// Check whether a scope may use a path or code; fails when denied
    CheckPermission {
        #[command(flatten)]
        scope: commands::ScopeArgs,

        /// Route path to check
        #[arg(long)]
        path: Option<String>,

        /// Permission code to check
        #[arg(long)]
        permission: Option<String>,
    },
    /// Print the codes usable by a scope
    Codes {
        #[command(flatten)]
        scope: commands::ScopeArgs,
    },
    /// Audit the whole tree; fails when it is not a healthy forest
    Check,
    /// Show committed batches, newest first
    History {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr, so JSON output stays clean)
    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let ctx = commands::Context::open(args.db)?;

    match args.command {
        Command::Init { write_config } => init::init_store(&ctx, write_config),
        Command::Apply {
            file,
            name,
            dry_run,
        } => commands::apply(&ctx, &file, name, dry_run),
        Command::Children { parent } => commands::children(&ctx, parent),
        Command::Descendants { target } => commands::descendants(&ctx, &target),
        Command::Show { target } => commands::show(&ctx, &target),
        Command::Resolve { scope } => commands::resolve(&ctx, scope),
        Command::CheckPermission {
            scope,
            path,
            permission,
        } => commands::check_permission(&ctx, scope, path.as_deref(), permission.as_deref()),
        Command::Codes { scope } => commands::codes(&ctx, scope),
        Command::Check => commands::check(&ctx),
        Command::History { limit } => commands::history(&ctx, limit),
    }
}
