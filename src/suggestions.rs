//! # Error Suggestions
//!
//! Helpers that build command-layer errors carrying hints. Errors should say
//! what went wrong AND how to fix it.
//!
//! ```rust,ignore
//! use git_vendor::suggestions;
//!
//! // Instead of:
//! anyhow::bail!("unknown vendor: {}", name);
//!
//! // Use:
//! return Err(suggestions::unknown_vendor(name, &config));
//! ```

use std::path::Path;

use crate::config::VendorConfig;
use crate::error::Error;
use crate::state::{CONFIG_FILE, STATE_DIR};

/// The configuration file does not exist.
pub fn config_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Configuration file not found: {path}\n\n\
         hint: Create {STATE_DIR}/{CONFIG_FILE} in your project root\n\
         hint: Use --root to point at a different project\n\
         hint: Set the GIT_VENDOR_ROOT environment variable",
        path = path.display()
    )
}

/// `cache clean` was called without choosing what to remove.
pub fn cache_clean_no_filter() -> anyhow::Error {
    anyhow::anyhow!(
        "At least one filter must be specified for cache clean\n\n\
         hint: Use --all to remove the whole sync cache\n\
         hint: Use --vendor <NAME> to remove one vendor's entries"
    )
}

/// A vendor filter names no configured vendor.
pub fn unknown_vendor(name: &str, config: &VendorConfig) -> anyhow::Error {
    let names: Vec<&str> = config.vendors.iter().map(|v| v.name.as_str()).collect();
    let did_you_mean = find_similar(name, &names)
        .map(|s| format!("\nhint: Did you mean '{s}'?"))
        .unwrap_or_default();
    anyhow::anyhow!(
        "Unknown vendor: {name}{did_you_mean}\n\n\
         Configured vendors: {list}",
        list = if names.is_empty() {
            "(none)".to_string()
        } else {
            names.join(", ")
        }
    )
}

/// Hint lines for a library error, if there is something actionable to say.
pub fn hint_for(error: &Error) -> Option<&'static str> {
    match error {
        Error::NotLocked { .. } => Some("hint: Run 'git-vendor update' to resolve and lock the ref"),
        Error::Conflict { .. } => {
            Some("hint: Give each mapping its own 'to:' destination, then run 'git-vendor validate'")
        }
        Error::UnsafePath { .. } => {
            Some("hint: Mapping paths must be relative and must not use '..'")
        }
        Error::Cancelled => {
            Some("hint: Stopped by Ctrl-C or --timeout; raise --timeout if the remotes are slow")
        }
        Error::GitCommand { .. } if error.is_missing_object() => {
            Some("hint: The locked commit may have been force-pushed away; run 'git-vendor update'")
        }
        _ => None,
    }
}

/// Render a library error with its hint, for per-vendor reporting.
pub fn describe(error: &Error) -> String {
    match hint_for(error) {
        Some(hint) => format!("{error}\n   {hint}"),
        None => error.to_string(),
    }
}

/// Find a similar string from a list of candidates using edit distance.
///
/// Returns Some(candidate) if a close match is found (edit distance <= 2).
fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = edit_distance(input, candidate);
            if distance <= 2 && distance < input.len() {
                Some((candidate, distance))
            } else {
                None
            }
        })
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Levenshtein edit distance between two strings.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
