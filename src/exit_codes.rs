//! Process exit codes
//!
//! - `0`: everything succeeded, or every tracked ref is current
//! - `1`: an error, at least one failed vendor, or updates are available
//! - `2`: invalid command-line usage (reported by clap)

/// Success.
pub const SUCCESS: u8 = 0;

/// A general error, a failed vendor, or pending updates for `check-updates`.
pub const FAILURE: u8 = 1;

/// Invalid command-line usage.
pub const USAGE: u8 = 2;
