//! # Annotate Command Implementation
//!
//! Attaches a vendor note describing the current lock to an existing commit
//! (HEAD by default). Useful when vendored changes were committed by hand.

use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::Args;

use git_vendor::cache::CacheStore;
use git_vendor::cancel::CancelToken;
use git_vendor::commit::{CommitService, NoteMetadata, NOTES_REF};
use git_vendor::filesystem::LocalFs;
use git_vendor::lock::short_hash;
use git_vendor::output::emoji;

use super::{system_git, Context};

/// Attach a vendor note for the current lock to an existing commit
#[derive(Args, Debug)]
pub struct AnnotateArgs {
    /// Commit to annotate
    #[arg(value_name = "COMMIT", default_value = "HEAD")]
    pub commit: String,
}

/// Execute the `annotate` command.
pub fn execute(ctx: &Context, args: AnnotateArgs) -> Result<ExitCode> {
    let (config, mut lock) = ctx.load()?;
    lock.retain_configured(&config);
    if lock.vendors.is_empty() {
        bail!("The lock has no entries for configured vendors\n\nhint: Run 'git-vendor update' first");
    }

    let mut metadata = NoteMetadata::from_config(&config);
    metadata.add_cache(
        &CacheStore::load(&ctx.layout.cache_dir()),
        &lock,
        &LocalFs,
        ctx.layout.root(),
    );

    let service = CommitService::new(system_git(false, &CancelToken::new()), ctx.layout.root());
    let hash = service.annotate(&args.commit, &lock.vendors, &metadata)?;
    println!(
        "{} Attached {} note for {} ref(s) to {}",
        emoji(&ctx.output, "📝", "[NOTE]"),
        NOTES_REF,
        lock.vendors.len(),
        short_hash(&hash)
    );
    Ok(ExitCode::SUCCESS)
}
