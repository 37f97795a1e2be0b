//! # Check-Updates Command Implementation
//!
//! Read-only comparison of every tracked ref with its remote tip. The lock is
//! never written. Exits 0 only when every ref matches its lock entry.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use git_vendor::exit_codes;
use git_vendor::filesystem::LocalFs;
use git_vendor::git::CommitInfo;
use git_vendor::lock::short_hash;
use git_vendor::output::{emoji, update_marker, OutputConfig};
use git_vendor::suggestions;
use git_vendor::sync::DEFAULT_JOBS;
use git_vendor::update::{RefUpdate, UpdateChecker, UpdateReport, UpdateStatus, DEFAULT_MAX_COMMITS};

use super::{cancel_token, system_git, Context};

/// Report refs whose remote tip differs from the lock
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Only check vendors in this group
    #[arg(long, value_name = "GROUP")]
    pub group: Option<String>,

    /// Only check this vendor
    #[arg(long, value_name = "NAME")]
    pub vendor: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Maximum commits listed per ref
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_COMMITS)]
    pub max_commits: usize,

    /// Number of refs checked at once
    #[arg(short, long, value_name = "N", env = "GIT_VENDOR_JOBS", default_value_t = DEFAULT_JOBS)]
    pub jobs: usize,

    /// Cancel outstanding git work after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// One ref in `--json` output.
#[derive(Debug, Serialize)]
struct RefUpdateJson<'a> {
    vendor: &'a str,
    r#ref: &'a str,
    url: &'a str,
    status: UpdateStatus,
    current_hash: Option<&'a str>,
    new_hash: Option<&'a str>,
    tag: Option<&'a str>,
    history_complete: Option<bool>,
    commits: &'a [CommitInfo],
    error: Option<String>,
}

impl<'a> From<&'a RefUpdate> for RefUpdateJson<'a> {
    fn from(update: &'a RefUpdate) -> Self {
        let resolution = update.resolution.as_ref();
        Self {
            vendor: &update.vendor,
            r#ref: &update.r#ref,
            url: &update.url,
            status: update.status(),
            current_hash: update.current_hash.as_deref(),
            new_hash: resolution.map(|r| r.new_hash.as_str()),
            tag: resolution.map(|r| r.tag.as_str()).filter(|t| !t.is_empty()),
            history_complete: resolution.map(|r| r.history_complete),
            commits: resolution.map(|r| r.commits.as_slice()).unwrap_or_default(),
            error: update.error.as_ref().map(ToString::to_string),
        }
    }
}

/// Execute the `check-updates` command.
pub fn execute(ctx: &Context, args: CheckArgs) -> Result<ExitCode> {
    let (config, lock) = ctx.load()?;
    ctx.check_vendor_filter(&config, args.vendor.as_deref())?;

    let cancel = cancel_token(args.timeout);
    let checker = UpdateChecker::new(
        system_git(false, &cancel),
        Arc::new(LocalFs),
        cancel,
        args.max_commits,
    );
    if !args.json {
        println!(
            "{} Checking vendor refs for updates...",
            emoji(&ctx.output, "🔍", "[CHECK]")
        );
    }
    let report = checker.check_all(
        &config,
        &lock,
        args.vendor.as_deref(),
        args.group.as_deref(),
        args.jobs,
    )?;

    if args.json {
        let refs: Vec<RefUpdateJson> = report.refs.iter().map(RefUpdateJson::from).collect();
        println!("{}", serde_json::to_string_pretty(&refs)?);
    } else {
        print_report(&ctx.output, &report);
    }

    if report.all_current() {
        Ok(ExitCode::from(exit_codes::SUCCESS))
    } else {
        Ok(ExitCode::from(exit_codes::FAILURE))
    }
}

/// Human-readable listing of an update report.
pub(crate) fn print_report(output: &OutputConfig, report: &UpdateReport) {
    for update in &report.refs {
        let marker = update_marker(output, update.status());
        let current = update.current_hash.as_deref().map(short_hash).unwrap_or("unlocked");
        match (&update.error, &update.resolution) {
            (Some(error), _) => {
                println!("{} {}@{}", marker, update.vendor, update.r#ref);
                println!("   {}", suggestions::describe(error));
            }
            (None, Some(resolution)) if update.status() == UpdateStatus::Current => {
                println!(
                    "{} {}@{} ({})",
                    marker,
                    update.vendor,
                    update.r#ref,
                    short_hash(&resolution.new_hash)
                );
            }
            (None, Some(resolution)) => {
                let tag = if resolution.tag.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", resolution.tag)
                };
                println!(
                    "{} {}@{} {} -> {}{}",
                    marker,
                    update.vendor,
                    update.r#ref,
                    current,
                    short_hash(&resolution.new_hash),
                    tag
                );
                for commit in &resolution.commits {
                    println!(
                        "   {} {} ({}, {})",
                        commit.short_hash, commit.subject, commit.author, commit.date
                    );
                }
                if !resolution.history_complete {
                    println!("   (commit list unavailable: locked commit is no longer on the remote)");
                }
            }
            (None, None) => println!("{} {}@{}", marker, update.vendor, update.r#ref),
        }
    }

    let pending = report.pending().count();
    let failed = report.refs.iter().filter(|r| r.error.is_some()).count();
    println!(
        "\n{} ref(s) checked, {} with updates, {} failed",
        report.refs.len(),
        pending,
        failed
    );
}
