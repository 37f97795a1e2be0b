//! # Output Configuration
//!
//! Controls how the CLI renders results: emoji or plain markers, and whether
//! a progress bar is drawn.
//!
//! ## Respecting User Preferences
//!
//! - `--color=never|always|auto` - CLI flag for color control
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals
//!
//! ## Usage
//!
//! ```rust,ignore
//! use git_vendor::output::{OutputConfig, emoji};
//!
//! let config = OutputConfig::from_env_and_flag("auto");
//! println!("{} Syncing...", emoji(&config, "🔄", "[SYNC]"));
//! ```

use std::env;

use indicatif::{ProgressBar, ProgressStyle};

use crate::sync::RefStatus;
use crate::update::UpdateStatus;

/// Output configuration for controlling colors and emojis.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
    /// Whether stdout is an interactive terminal.
    pub interactive: bool,
}

impl OutputConfig {
    /// Create an output configuration from environment and CLI flag.
    ///
    /// `color_flag` is the value of `--color`: "always", "never" or "auto".
    /// In auto mode, colors are disabled if `NO_COLOR` is set (even empty),
    /// `CLICOLOR=0`, `TERM=dumb`, or stdout is not a TTY (unless
    /// `CLICOLOR_FORCE=1`).
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self {
            use_color,
            interactive: console::Term::stdout().is_term(),
        }
    }

    fn detect_color_support() -> bool {
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stdout().features().colors_supported()
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self {
            use_color: true,
            interactive: false,
        }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self {
            use_color: false,
            interactive: false,
        }
    }

    /// A progress bar over `len` items, hidden when not on a terminal.
    pub fn progress(&self, len: usize, message: &str) -> ProgressBar {
        if !self.interactive {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        let template = if self.use_color {
            "{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len}"
        } else {
            "{msg} [{bar:30}] {pos}/{len}"
        };
        if let Ok(style) = ProgressStyle::with_template(template) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(message.to_string());
        bar
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Returns the emoji when colors are enabled, the plain text otherwise.
///
/// ```rust,ignore
/// let config = OutputConfig::from_env_and_flag("auto");
/// println!("{} Validating...", emoji(&config, "🔍", "[CHECK]"));
/// ```
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// Marker for a sync outcome.
pub fn sync_marker(config: &OutputConfig, status: RefStatus) -> &'static str {
    match status {
        RefStatus::Synced => emoji(config, "✅", "[SYNCED]"),
        RefStatus::UpToDate => emoji(config, "💤", "[CURRENT]"),
        RefStatus::WouldSync => emoji(config, "📝", "[WOULD SYNC]"),
        RefStatus::Failed => emoji(config, "❌", "[FAILED]"),
    }
}

/// Marker for an update-check outcome.
pub fn update_marker(config: &OutputConfig, status: UpdateStatus) -> &'static str {
    match status {
        UpdateStatus::Current => emoji(config, "✅", "[CURRENT]"),
        UpdateStatus::UpdateAvailable => emoji(config, "🔄", "[UPDATE]"),
        UpdateStatus::NotLocked => emoji(config, "🆕", "[NEW]"),
        UpdateStatus::Failed => emoji(config, "❌", "[FAILED]"),
    }
}
