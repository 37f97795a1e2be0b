//! CLI argument parsing and command dispatch

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{self, Context};

/// git-vendor - Vendor paths from remote git repositories as locked file copies
#[derive(Parser, Debug)]
#[command(name = "git-vendor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Project root containing .git-vendor/ (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR", env = "GIT_VENDOR_ROOT")]
    root: Option<PathBuf>,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy every locked vendor ref into the project
    Sync(commands::sync::SyncArgs),

    /// Resolve refs to their latest commits, update the lock, then sync
    Update(commands::update::UpdateArgs),

    /// Report refs whose remote tip differs from the lock (exit 1 if any)
    CheckUpdates(commands::check::CheckArgs),

    /// Validate the configuration and destination paths
    Validate(commands::validate::ValidateArgs),

    /// Attach a vendor note for the current lock to an existing commit
    Annotate(commands::annotate::AnnotateArgs),

    /// Inspect or clear the sync cache
    Cache(commands::cache::CacheArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Commands::Sync(args) => args.verbose,
            Commands::Update(args) => args.verbose,
            _ => false,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<ExitCode> {
        // --verbose on sync/update surfaces git command tracing at the default level.
        let level = if self.command.verbose() && self.log_level == "warn" {
            "info"
        } else {
            self.log_level.as_str()
        };
        init_logging(level);

        let root = match self.root {
            Some(root) => root,
            None => std::env::current_dir()?,
        };
        let ctx = Context::new(root, &self.color);
        log::debug!("project root: {}", ctx.layout.root().display());

        match self.command {
            Commands::Sync(args) => commands::sync::execute(&ctx, args),
            Commands::Update(args) => commands::update::execute(&ctx, args),
            Commands::CheckUpdates(args) => commands::check::execute(&ctx, args),
            Commands::Validate(args) => commands::validate::execute(&ctx, args),
            Commands::Annotate(args) => commands::annotate::execute(&ctx, args),
            Commands::Cache(args) => commands::cache::execute(&ctx, args),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

fn init_logging(level: &str) {
    let result = env_logger::Builder::new()
        .parse_filters(level)
        .format_timestamp(None)
        .format_target(false)
        .try_init();
    if let Err(e) = result {
        eprintln!("warning: logging not initialised: {}", e);
    }
}
