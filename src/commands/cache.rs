//! # Cache Command Implementation
//!
//! Inspects and clears the sync cache in `.git-vendor/.cache/`.
//!
//! ## Subcommands
//!
//! - **`list`**: Show every cached destination with its commit and checksum
//! - **`clean`**: Remove cache files, all of them or one vendor's

use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Subcommand};

use git_vendor::cache::{self, CacheStore};
use git_vendor::lock::short_hash;
use git_vendor::output::emoji;
use git_vendor::suggestions;

use super::Context;

/// Inspect or clear the sync cache
#[derive(Args, Debug)]
pub struct CacheArgs {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: CacheSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheSubcommand {
    /// List cached destinations
    List(ListArgs),
    /// Remove cache entries
    Clean(CleanArgs),
}

/// Arguments for the cache list command
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the cache clean command
#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Remove the whole cache
    #[arg(long, conflicts_with = "vendor")]
    pub all: bool,

    /// Remove only this vendor's entries
    #[arg(long, value_name = "NAME")]
    pub vendor: Option<String>,
}

/// Execute the `cache` command.
pub fn execute(ctx: &Context, args: CacheArgs) -> Result<ExitCode> {
    match args.command {
        CacheSubcommand::List(list_args) => list(ctx, list_args),
        CacheSubcommand::Clean(clean_args) => clean(ctx, clean_args),
    }
}

fn list(ctx: &Context, args: ListArgs) -> Result<ExitCode> {
    let store = CacheStore::load(&ctx.layout.cache_dir());
    let entries = store.entries();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(ExitCode::SUCCESS);
    }

    if entries.is_empty() {
        println!("Cache is empty");
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{} {} cached destination(s):",
        emoji(&ctx.output, "📦", "[CACHE]"),
        entries.len()
    );
    for entry in &entries {
        let checksum = entry.record.checksum.trim_start_matches("sha256:");
        println!(
            "  {}@{} {} ({}, sha256:{})",
            entry.vendor,
            entry.r#ref,
            entry.destination,
            short_hash(&entry.record.commit),
            checksum.get(..12).unwrap_or(checksum)
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn clean(ctx: &Context, args: CleanArgs) -> Result<ExitCode> {
    if !args.all && args.vendor.is_none() {
        return Err(suggestions::cache_clean_no_filter());
    }
    let removed = cache::clean(&ctx.layout.cache_dir(), args.vendor.as_deref())?;
    println!(
        "{} Removed {} cache file(s)",
        emoji(&ctx.output, "🧹", "[CLEAN]"),
        removed
    );
    Ok(ExitCode::SUCCESS)
}
