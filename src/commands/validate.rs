//! # Validate Command Implementation
//!
//! Loads the configuration (structural checks run on load), then runs the
//! destination conflict gate. Nothing is cloned or written.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use git_vendor::conflict;
use git_vendor::exit_codes;
use git_vendor::output::emoji;

use super::Context;

/// Validate the configuration and destination paths
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Also fail when a configured ref has no lock entry
    #[arg(long)]
    pub strict: bool,
}

/// Execute the `validate` command.
pub fn execute(ctx: &Context, args: ValidateArgs) -> Result<ExitCode> {
    let (config, lock) = ctx.load()?;
    println!(
        "{} Validating {}",
        emoji(&ctx.output, "🔍", "[CHECK]"),
        ctx.layout.config_path().display()
    );

    conflict::validate(&config)?;
    let destinations = conflict::expand_claims(&config).len();

    let unlocked: Vec<String> = config
        .vendors
        .iter()
        .flat_map(|v| v.specs.iter().map(move |s| (v, s)))
        .filter(|(v, s)| lock.get(&v.name, &s.r#ref).is_none())
        .map(|(v, s)| format!("{}@{}", v.name, s.r#ref))
        .collect();

    println!(
        "{} Configuration is valid: {} vendor(s), {} ref(s), {} destination(s)",
        emoji(&ctx.output, "✅", "[OK]"),
        config.vendors.len(),
        config.ref_count(),
        destinations
    );
    if !unlocked.is_empty() {
        println!(
            "{} Not locked yet: {} (run 'git-vendor update')",
            emoji(&ctx.output, "⚠️ ", "[WARN]"),
            unlocked.join(", ")
        );
        if args.strict {
            return Ok(ExitCode::from(exit_codes::FAILURE));
        }
    }
    Ok(ExitCode::from(exit_codes::SUCCESS))
}
