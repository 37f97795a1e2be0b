//! # git-vendor Library
//!
//! Vendors arbitrary paths from remote git repositories into a project as
//! plain file copies, pinned to exact commits. It backs the `git-vendor`
//! command-line tool.
//!
//! ## Quick Example
//!
//! ```
//! use git_vendor::{config, conflict};
//!
//! let config = config::parse(r#"
//! vendors:
//!   - name: utils
//!     url: https://github.com/example/utils.git
//!     license: MIT
//!     specs:
//!       - ref: main
//!         default_target: vendor/utils
//!         mapping:
//!           - from: src/strings
//!           - from: src/paths
//! "#).unwrap();
//!
//! // Destinations are checked for collisions and traversal before any I/O.
//! conflict::validate(&config).unwrap();
//! assert_eq!(config.ref_count(), 1);
//! ```
//!
//! ## Core Concepts
//!
//! - **Configuration (`config`)** and **lock (`lock`)**: what to vendor, and
//!   which commit each (vendor, ref) is pinned to. Loaded and saved through a
//!   `state::StateStore` only.
//! - **Conflict validation (`conflict`)**: a synchronous gate that rejects
//!   colliding or unsafe destinations.
//! - **Sync (`sync`)**: per-ref cache check, clone, checkout of the locked
//!   commit, and copy, run in parallel across vendors.
//! - **Cache (`cache`)**: per-destination records of commit and checksum that
//!   let unchanged vendors skip all git work.
//! - **Updates (`update`)**: compares locks with remote tips, lists the commits
//!   in between and picks a representative tag.
//! - **Commits (`commit`)**: one commit for all vendors of a run, with
//!   positional trailers and a JSON note.
//! - **Capabilities (`git`, `filesystem`, `license`)**: traits the engine
//!   consumes, with system implementations.
//!
//! ## Execution Flow
//!
//! 1.  Load config and lock once.
//! 2.  Validate destinations (fatal on conflict or unsafe path).
//! 3.  Sync vendors in parallel, reading and writing the cache.
//! 4.  Optionally resolve updates first (`update`) or only report them
//!     (`check-updates`).
//! 5.  Persist the lock and cache, then optionally create the vendor commit.

pub mod cache;
pub mod cancel;
pub mod commit;
pub mod config;
pub mod conflict;
pub mod error;
pub mod exit_codes;
pub mod filesystem;
pub mod git;
pub mod license;
pub mod lock;
pub mod output;
pub mod path;
pub mod state;
pub mod suggestions;
pub mod sync;
pub mod update;

#[cfg(test)]
mod path_proptest;
#[cfg(test)]
mod testing;
