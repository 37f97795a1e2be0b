//! # Error Handling
//!
//! This module defines the centralized error type for `git-vendor`. It uses
//! `thiserror` to build one `Error` enum covering every failure mode of the
//! synchronization engine, with a `Result<T>` alias used across the library.
//!
//! ## Severity
//!
//! The variants fall into distinct severity classes, and callers are expected
//! to treat them accordingly:
//!
//! - **Fatal before any work**: `Config`, `Conflict`, `UnsafePath`. These abort
//!   a run before a single clone or copy happens.
//! - **Scoped to one vendor**: `GitCommand`, `GitClone`, `NotLocked`,
//!   `Filesystem`, `Io`. These are attached to the failing vendor's result and
//!   never abort sibling vendors.
//! - **Never fatal**: `Cache` (treated as a cache miss) and `NoteAttachment`
//!   (logged, the commit still stands).
//! - **Fatal to the commit step only**: `Commit`.
//!
//! Git failures carry a [`GitErrorKind`] classification derived from the git
//! stderr text, so resolution logic can branch on the kind of failure instead
//! of matching strings at every call site.

use std::fmt;

use thiserror::Error;

/// Classification of a failed git invocation.
///
/// Git reports most failures only as text on stderr. The substrings matched
/// here are the stable part of that surface: for example a checkout of a
/// commit that a shallow clone has not fetched yet reports "reference is not a
/// tree", and a log range whose left end is absent (beyond the fetch depth, or
/// force-pushed away) reports "Invalid revision range".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitErrorKind {
    /// The named commit, tree or revision is not present in the local object
    /// database.
    MissingObject,
    /// The remote rejected our credentials.
    Authentication,
    /// The remote could not be reached.
    Network,
    /// Anything else.
    Other,
}

impl GitErrorKind {
    /// Classify git stderr output.
    pub fn classify(stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        const MISSING: [&str; 7] = [
            "not a valid object",
            "invalid revision range",
            "reference is not a tree",
            "unknown revision",
            "bad object",
            "not our ref",
            "did not match any file(s) known to git",
        ];
        const AUTH: [&str; 4] = [
            "authentication failed",
            "permission denied",
            "could not read from remote repository",
            "terminal prompts disabled",
        ];
        const NETWORK: [&str; 4] = [
            "could not resolve host",
            "connection timed out",
            "connection refused",
            "unable to access",
        ];

        if MISSING.iter().any(|m| lower.contains(m)) {
            GitErrorKind::MissingObject
        } else if AUTH.iter().any(|m| lower.contains(m)) {
            GitErrorKind::Authentication
        } else if NETWORK.iter().any(|m| lower.contains(m)) {
            GitErrorKind::Network
        } else {
            GitErrorKind::Other
        }
    }
}

impl fmt::Display for GitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GitErrorKind::MissingObject => "missing object",
            GitErrorKind::Authentication => "authentication",
            GitErrorKind::Network => "network",
            GitErrorKind::Other => "other",
        };
        f.write_str(label)
    }
}

/// Main error type for git-vendor operations
#[derive(Error, Debug)]
pub enum Error {
    /// The vendor configuration or lock file is missing or malformed.
    ///
    /// This error includes the specific issue and optionally a hint about how
    /// to fix it.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// Two or more mappings write to the same destination.
    #[error("Destination conflicts detected:\n{}", format_conflicts(conflicts))]
    Conflict {
        conflicts: Vec<crate::conflict::Conflict>,
    },

    /// A mapping path escapes the project root or the checked-out tree.
    #[error("Unsafe path '{path}' in vendor '{vendor}': {reason}")]
    UnsafePath {
        vendor: String,
        path: String,
        reason: String,
    },

    /// A git command failed.
    #[error("Git command failed ({kind}): git {command}: {stderr}")]
    GitCommand {
        command: String,
        stderr: String,
        kind: GitErrorKind,
    },

    /// An error occurred while cloning a Git repository.
    ///
    /// Includes the repository URL, ref, error message, and an optional hint
    /// for resolution.
    #[error("Git clone error for {url}@{r#ref}: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    GitClone {
        url: String,
        r#ref: String,
        message: String,
        /// Optional hint for how to resolve the clone issue
        hint: Option<String>,
    },

    /// A cache entry could not be read or written.
    #[error("Cache operation error: {message}")]
    Cache { message: String },

    /// The vendor note could not be attached to a commit.
    #[error("Failed to attach vendor note to {commit}: {message}")]
    NoteAttachment { commit: String, message: String },

    /// The vendor commit could not be created.
    #[error("Commit error: {message}")]
    Commit { message: String },

    /// A ref is declared in the config but has no lock entry.
    #[error("No lock entry for {vendor}@{r#ref}")]
    NotLocked { vendor: String, r#ref: String },

    /// The run was cancelled by timeout or interrupt.
    #[error("Operation cancelled")]
    Cancelled,

    /// An error occurred while copying or hashing vendored files.
    #[error("Filesystem operation error: {message}")]
    Filesystem { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A semantic versioning parsing error, wrapped from `semver::Error`.
    #[error("Semver parsing error: {0}")]
    Semver(#[from] semver::Error),

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Shorthand for a configuration error without a hint.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            hint: None,
        }
    }

    /// The git classification of this error, if it came from git.
    pub fn git_kind(&self) -> Option<GitErrorKind> {
        match self {
            Error::GitCommand { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether this error means a git object is not available locally.
    pub fn is_missing_object(&self) -> bool {
        self.git_kind() == Some(GitErrorKind::MissingObject)
    }
}

fn format_conflicts(conflicts: &[crate::conflict::Conflict]) -> String {
    conflicts
        .iter()
        .map(|c| format!("  {}", c))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{Conflict, DestinationClaim};

    #[test]
    fn test_error_display_config() {
        let error = Error::config("vendor 'x' has no specs");
        let display = format!("{}", error);
        assert!(display.contains("Configuration error"));
        assert!(display.contains("vendor 'x' has no specs"));
        assert!(!display.contains("hint:"));
    }

    #[test]
    fn test_error_display_config_with_hint() {
        let error = Error::Config {
            message: "Missing url field".to_string(),
            hint: Some("Add 'url:' to the vendor entry".to_string()),
        };
        let display = format!("{}", error);
        assert!(display.contains("Missing url field"));
        assert!(display.contains("hint:"));
        assert!(display.contains("Add 'url:'"));
    }

    #[test]
    fn test_error_display_git_clone_with_hint() {
        let error = Error::GitClone {
            url: "https://github.com/test/repo.git".to_string(),
            r#ref: "main".to_string(),
            message: "Authentication failed".to_string(),
            hint: Some("Check SSH keys".to_string()),
        };
        let display = format!("{}", error);
        assert!(display.contains("Git clone error"));
        assert!(display.contains("https://github.com/test/repo.git@main"));
        assert!(display.contains("Check SSH keys"));
    }

    #[test]
    fn test_error_display_git_command_includes_kind() {
        let error = Error::GitCommand {
            command: "checkout abc123".to_string(),
            stderr: "fatal: reference is not a tree: abc123".to_string(),
            kind: GitErrorKind::MissingObject,
        };
        let display = format!("{}", error);
        assert!(display.contains("missing object"));
        assert!(display.contains("git checkout abc123"));
        assert!(error.is_missing_object());
    }

    #[test]
    fn test_error_display_conflict_lists_every_claim() {
        let error = Error::Conflict {
            conflicts: vec![Conflict {
                destination: "lib/utils".to_string(),
                claims: vec![
                    DestinationClaim::new("a", "main", "src/utils", "lib/utils"),
                    DestinationClaim::new("b", "v1", "utils", "lib/utils"),
                ],
            }],
        };
        let display = format!("{}", error);
        assert!(display.contains("lib/utils"));
        assert!(display.contains("a:src/utils"));
        assert!(display.contains("b:utils"));
    }

    #[test]
    fn test_classify_missing_object_messages() {
        for stderr in [
            "fatal: not a valid object name deadbeef",
            "fatal: reference is not a tree: deadbeef",
            "fatal: ambiguous argument 'a..b': unknown revision or path",
            "fatal: bad object deadbeef",
            "fatal: Invalid revision range 6aabbaf0..a521743c",
            "error: Server does not allow request for unadvertised object; not our ref",
        ] {
            assert_eq!(
                GitErrorKind::classify(stderr),
                GitErrorKind::MissingObject,
                "{stderr}"
            );
        }
    }

    #[test]
    fn test_classify_other_kinds() {
        assert_eq!(
            GitErrorKind::classify("fatal: Authentication failed for 'https://x'"),
            GitErrorKind::Authentication
        );
        assert_eq!(
            GitErrorKind::classify("fatal: unable to access 'https://x/': Could not resolve host: x"),
            GitErrorKind::Network
        );
        assert_eq!(
            GitErrorKind::classify("fatal: something else"),
            GitErrorKind::Other
        );
    }

    #[test]
    fn test_non_git_errors_have_no_kind() {
        let error = Error::Cache {
            message: "corrupt".to_string(),
        };
        assert_eq!(error.git_kind(), None);
        assert!(!error.is_missing_object());
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let error: Error = io_error.into();
        let display = format!("{}", error);
        assert!(display.contains("I/O error"));
        assert!(display.contains("File not found"));
    }

    #[test]
    fn test_error_from_yaml_error() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: [unclosed").unwrap_err();
        let error: Error = yaml_error.into();
        assert!(format!("{}", error).contains("YAML parsing error"));
    }

    #[test]
    fn test_error_not_locked() {
        let error = Error::NotLocked {
            vendor: "lodash".to_string(),
            r#ref: "main".to_string(),
        };
        assert_eq!(format!("{}", error), "No lock entry for lodash@main");
    }
}
