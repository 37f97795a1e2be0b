//! # Update Command Implementation
//!
//! Resolves each tracked ref to its current remote tip, writes the new
//! commits into `vendor.lock`, then syncs so the working tree matches the
//! lock again. License paths cached by that sync are recorded in the lock
//! too; `update` is the only command that writes `vendor.lock`.
//!
//! With `--dry-run` the resolutions are reported and the follow-up sync is
//! planned against an in-memory copy of the updated lock; nothing is written.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use git_vendor::exit_codes;
use git_vendor::filesystem::LocalFs;
use git_vendor::lock::{LockDetails, VendorLock};
use git_vendor::output::emoji;
use git_vendor::state::StateStore;
use git_vendor::sync::{SyncOptions, SyncReport, DEFAULT_JOBS};
use git_vendor::update::{apply_updates, UpdateChecker, DEFAULT_MAX_COMMITS};

use super::sync::{commit_requested, commit_vendors, run_sync};
use super::{cancel_token, check, system_git, Context};

/// Resolve refs to their latest commits, update the lock, then sync
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Report what would change without writing the lock or any files
    #[arg(long)]
    pub dry_run: bool,

    /// Create one commit with vendor trailers and note after syncing
    #[arg(long)]
    pub commit: bool,

    /// Only update vendors in this group
    #[arg(long, value_name = "GROUP")]
    pub group: Option<String>,

    /// Only update this vendor
    #[arg(long, value_name = "NAME")]
    pub vendor: Option<String>,

    /// Maximum commits listed per ref
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_COMMITS)]
    pub max_commits: usize,

    /// Trace git commands
    #[arg(short, long)]
    pub verbose: bool,

    /// Number of vendors processed at once
    #[arg(short, long, value_name = "N", env = "GIT_VENDOR_JOBS", default_value_t = DEFAULT_JOBS)]
    pub jobs: usize,

    /// Cancel outstanding git work after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Execute the `update` command.
pub fn execute(ctx: &Context, args: UpdateArgs) -> Result<ExitCode> {
    let (config, lock) = ctx.load()?;
    ctx.check_vendor_filter(&config, args.vendor.as_deref())?;
    let commit = commit_requested(&ctx.output, args.commit, args.dry_run);

    let cancel = cancel_token(args.timeout);
    let git = system_git(args.verbose, &cancel);

    println!(
        "{} Resolving vendor refs...",
        emoji(&ctx.output, "🔍", "[CHECK]")
    );
    let checker = UpdateChecker::new(git.clone(), Arc::new(LocalFs), cancel.clone(), args.max_commits);
    let updates = checker.check_all(
        &config,
        &lock,
        args.vendor.as_deref(),
        args.group.as_deref(),
        args.jobs,
    )?;
    check::print_report(&ctx.output, &updates);

    let mut next = lock.clone();
    let changed: Vec<LockDetails> = apply_updates(&updates, &mut next);
    next.retain_configured(&config);
    if changed.is_empty() {
        println!("All vendor refs are current");
    } else if !args.dry_run {
        ctx.store().save_lock(&next)?;
        println!(
            "{} Updated {} lock entr{}",
            emoji(&ctx.output, "🔒", "[LOCK]"),
            changed.len(),
            if changed.len() == 1 { "y" } else { "ies" }
        );
    }

    let options = SyncOptions {
        force: false,
        no_cache: false,
        dry_run: args.dry_run,
        group: args.group,
        vendor: args.vendor,
        verbose: args.verbose,
        jobs: args.jobs,
    };
    let (report, cache) = run_sync(ctx, git.clone(), &config, &next, &options, cancel)?;

    if !args.dry_run && record_license_paths(&report, &mut next) {
        ctx.store().save_lock(&next)?;
    }

    let failed = updates.has_failures() || report.has_failures();
    if commit {
        if updates.has_failures() {
            log::warn!("skipping vendor commit: some refs could not be resolved");
            println!(
                "{} Skipping commit because some vendors failed",
                emoji(&ctx.output, "⚠️ ", "[WARN]")
            );
        } else {
            let details: Vec<LockDetails> = changed
                .iter()
                .filter_map(|d| next.get(&d.name, &d.r#ref).cloned())
                .collect();
            commit_vendors(ctx, git, &config, &next, &report, &cache, &details)?;
        }
    }

    if failed {
        Ok(ExitCode::from(exit_codes::FAILURE))
    } else {
        Ok(ExitCode::from(exit_codes::SUCCESS))
    }
}

/// Store cached license paths in the lock. Returns whether anything changed.
fn record_license_paths(report: &SyncReport, lock: &mut VendorLock) -> bool {
    let mut changed = false;
    for result in &report.results {
        let Some(path) = &result.license_path else {
            continue;
        };
        let current = lock.get(&result.vendor, &result.r#ref).map(|d| d.license_path.as_str());
        if current.is_some_and(|current| current != path) {
            lock.set_license_path(&result.vendor, &result.r#ref, path);
            changed = true;
        }
    }
    changed
}
