//! # Sync Command Implementation
//!
//! Copies every locked vendor ref into the project. Refs whose destinations
//! still match the cache are skipped without touching git.
//!
//! ## Flow
//!
//! 1. Load `vendor.yml` and `vendor.lock`.
//! 2. Run the sync engine (conflict gate first, then vendors in parallel).
//! 3. Persist the cache. The lock is only read here; `update` is the one
//!    command that writes it.
//! 4. With `--commit`, create one commit covering every synced ref, unless
//!    any ref failed.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use git_vendor::cache::CacheStore;
use git_vendor::cancel::CancelToken;
use git_vendor::commit::{CommitService, NoteMetadata};
use git_vendor::config::VendorConfig;
use git_vendor::exit_codes;
use git_vendor::filesystem::LocalFs;
use git_vendor::git::GitCapability;
use git_vendor::license::LocalLicense;
use git_vendor::lock::{short_hash, LockDetails, VendorLock};
use git_vendor::output::{emoji, sync_marker, OutputConfig};
use git_vendor::suggestions;
use git_vendor::sync::{
    select_targets, MappingAction, RefStatus, RefSyncResult, SyncEngine, SyncOptions, SyncReport,
    DEFAULT_JOBS,
};

use super::{cancel_token, system_git, Context};

/// Copy every locked vendor ref into the project
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Show what would be copied without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Ignore the cache and copy every mapping
    #[arg(long)]
    pub force: bool,

    /// Ignore the cache and do not record new entries
    #[arg(long)]
    pub no_cache: bool,

    /// Only sync vendors in this group
    #[arg(long, value_name = "GROUP")]
    pub group: Option<String>,

    /// Only sync this vendor
    #[arg(long, value_name = "NAME")]
    pub vendor: Option<String>,

    /// Create one commit with vendor trailers and note after syncing
    #[arg(long)]
    pub commit: bool,

    /// Trace git commands
    #[arg(short, long)]
    pub verbose: bool,

    /// Number of vendors synced at once
    #[arg(short, long, value_name = "N", env = "GIT_VENDOR_JOBS", default_value_t = DEFAULT_JOBS)]
    pub jobs: usize,

    /// Cancel outstanding git work after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Execute the `sync` command.
pub fn execute(ctx: &Context, args: SyncArgs) -> Result<ExitCode> {
    let (config, lock) = ctx.load()?;
    ctx.check_vendor_filter(&config, args.vendor.as_deref())?;
    let commit = commit_requested(&ctx.output, args.commit, args.dry_run);

    let options = SyncOptions {
        force: args.force,
        no_cache: args.no_cache,
        dry_run: args.dry_run,
        group: args.group,
        vendor: args.vendor,
        verbose: args.verbose,
        jobs: args.jobs,
    };
    let cancel = cancel_token(args.timeout);
    let git = system_git(args.verbose, &cancel);

    let (report, cache) = run_sync(ctx, git.clone(), &config, &lock, &options, cancel)?;

    if commit {
        let details = synced_details(&report, &lock);
        commit_vendors(ctx, git, &config, &lock, &report, &cache, &details)?;
    }

    Ok(exit_code(&report))
}

/// `--commit` unless dry-run is also active, in which case it is dropped
/// with a warning.
pub(crate) fn commit_requested(output: &OutputConfig, commit: bool, dry_run: bool) -> bool {
    if commit && dry_run {
        log::warn!("--commit ignored in dry-run mode");
        eprintln!(
            "{} --commit is ignored with --dry-run; nothing will be committed",
            emoji(output, "⚠️ ", "[WARN]")
        );
        return false;
    }
    commit
}

/// Run the sync engine over `config` with a progress bar, persist the cache
/// and print the per-ref report.
pub(crate) fn run_sync(
    ctx: &Context,
    git: Arc<dyn GitCapability>,
    config: &VendorConfig,
    lock: &VendorLock,
    options: &SyncOptions,
    cancel: CancelToken,
) -> Result<(SyncReport, Arc<CacheStore>)> {
    let cache = Arc::new(if options.no_cache {
        CacheStore::in_memory()
    } else {
        CacheStore::load(&ctx.layout.cache_dir())
    });
    let engine = SyncEngine::new(
        git,
        Arc::new(LocalFs),
        Arc::new(LocalLicense),
        cache.clone(),
        ctx.layout.clone(),
        cancel,
    );

    let total = select_targets(config, options.vendor.as_deref(), options.group.as_deref())?.len();
    let verb = if options.dry_run { "Planning" } else { "Syncing" };
    println!(
        "{} {} {} vendor ref(s)...",
        emoji(&ctx.output, "🔄", "[SYNC]"),
        verb,
        total
    );

    let bar = ctx.output.progress(total, verb);
    let report = engine.sync_all(config, lock, options, &|result: &RefSyncResult| {
        bar.set_message(format!("{}@{}", result.vendor, result.r#ref));
        bar.inc(1);
    });
    bar.finish_and_clear();
    let report = report?;

    if !options.dry_run && !options.no_cache {
        if let Err(e) = cache.persist() {
            log::warn!("could not persist sync cache: {}", e);
        }
    }

    print_report(&ctx.output, &report, options.dry_run);
    Ok((report, cache))
}

/// Lock entries of the refs that wrote files, in configuration order.
fn synced_details(report: &SyncReport, lock: &VendorLock) -> Vec<LockDetails> {
    report
        .results
        .iter()
        .filter(|r| r.status() == RefStatus::Synced)
        .filter_map(|r| lock.get(&r.vendor, &r.r#ref).cloned())
        .collect()
}

/// Create the single vendor commit for `details`.
///
/// Skipped entirely when any ref of the run failed, so the commit never
/// describes a lock the working tree does not match.
pub(crate) fn commit_vendors(
    ctx: &Context,
    git: Arc<dyn GitCapability>,
    config: &VendorConfig,
    lock: &VendorLock,
    report: &SyncReport,
    cache: &CacheStore,
    details: &[LockDetails],
) -> Result<()> {
    if report.has_failures() {
        log::warn!("skipping vendor commit: some refs failed to sync");
        println!(
            "{} Skipping commit because some vendors failed",
            emoji(&ctx.output, "⚠️ ", "[WARN]")
        );
        return Ok(());
    }
    if details.is_empty() {
        println!("Nothing to commit");
        return Ok(());
    }

    eprintln!(
        "{} --commit stages vendored paths only; anything already staged is committed too",
        emoji(&ctx.output, "ℹ️ ", "[NOTE]")
    );

    let mut paths = report.written_paths();
    if ctx.layout.lock_path().exists() {
        paths.push(ctx.layout.lock_rel_path());
    }

    let mut metadata = NoteMetadata::from_config(config);
    metadata.add_sync_report(report);
    metadata.add_cache(cache, lock, &LocalFs, ctx.layout.root());

    let service = CommitService::new(git, ctx.layout.root());
    let hash = service.commit_vendors(details, &metadata, &paths)?;
    println!(
        "{} Created commit {} for {} ref(s)",
        emoji(&ctx.output, "📦", "[COMMIT]"),
        short_hash(&hash),
        details.len()
    );
    Ok(())
}

fn print_report(output: &OutputConfig, report: &SyncReport, dry_run: bool) {
    for result in &report.results {
        let commit = result.commit.as_deref().map(short_hash).unwrap_or("-");
        println!(
            "{} {}@{} ({})",
            sync_marker(output, result.status()),
            result.vendor,
            result.r#ref,
            commit
        );
        if let Some(error) = &result.error {
            println!("   {}", suggestions::describe(error));
            continue;
        }
        for mapping in &result.mappings {
            let label = match mapping.action {
                MappingAction::Copied => "copied",
                MappingAction::UpToDate => "up to date",
                MappingAction::WouldCopy => "would copy",
            };
            if mapping.action != MappingAction::UpToDate || dry_run {
                println!("   {} {} -> {}", label, mapping.source, mapping.destination);
            }
        }
        if let Some(license) = &result.license {
            log::debug!("{}: license {}", result.vendor, license);
        }
    }

    let mut summary = vec![
        format!("{} synced", report.count(RefStatus::Synced)),
        format!("{} up to date", report.count(RefStatus::UpToDate)),
    ];
    if dry_run {
        summary.push(format!("{} would sync", report.count(RefStatus::WouldSync)));
    }
    summary.push(format!("{} failed", report.count(RefStatus::Failed)));
    println!("\n{}", summary.join(", "));
    if dry_run {
        println!("Dry run: no files, cache entries or lock changes were written");
    }
}

pub(crate) fn exit_code(report: &SyncReport) -> ExitCode {
    if report.has_failures() {
        ExitCode::from(exit_codes::FAILURE)
    } else {
        ExitCode::from(exit_codes::SUCCESS)
    }
}
