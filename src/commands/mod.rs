//! # CLI Command Implementations
//!
//! One module per `git-vendor` subcommand. Each module holds an `Args`
//! struct derived with `clap` and an `execute` function that drives the
//! `git_vendor` library.
//!
//! Commands load configuration and lock exactly once through
//! [`Context::load`], hand them to the engine by reference, and save the lock
//! only after all work is done.

pub mod annotate;
pub mod cache;
pub mod check;
pub mod completions;
pub mod sync;
pub mod update;
pub mod validate;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use git_vendor::cancel::CancelToken;
use git_vendor::config::VendorConfig;
use git_vendor::git::{GitCapability, SystemGit};
use git_vendor::lock::VendorLock;
use git_vendor::output::OutputConfig;
use git_vendor::state::{FileStateStore, ProjectLayout, StateStore};
use git_vendor::suggestions;

/// State shared by every command: where the project is and how to print.
pub struct Context {
    pub layout: ProjectLayout,
    pub output: OutputConfig,
}

impl Context {
    pub fn new(root: PathBuf, color: &str) -> Self {
        Self {
            layout: ProjectLayout::new(root),
            output: OutputConfig::from_env_and_flag(color),
        }
    }

    pub fn store(&self) -> FileStateStore {
        FileStateStore::new(self.layout.clone())
    }

    /// Load configuration and lock.
    pub fn load(&self) -> Result<(VendorConfig, VendorLock)> {
        let config_path = self.layout.config_path();
        if !config_path.exists() {
            return Err(suggestions::config_not_found(&config_path));
        }
        let store = self.store();
        let config = store.load_config()?;
        let lock = store.load_lock()?;
        log::debug!(
            "loaded {} vendors and {} lock entries",
            config.vendors.len(),
            lock.vendors.len()
        );
        Ok((config, lock))
    }

    /// Fail early with a did-you-mean hint when `--vendor` names nothing.
    pub fn check_vendor_filter(&self, config: &VendorConfig, vendor: Option<&str>) -> Result<()> {
        match vendor {
            Some(name) if config.vendor(name).is_none() => {
                Err(suggestions::unknown_vendor(name, config))
            }
            _ => Ok(()),
        }
    }
}

/// Exit status after a second Ctrl-C (128 + SIGINT).
const INTERRUPTED: i32 = 130;

/// Cancellation token tripped by Ctrl-C, and by `--timeout` if given.
///
/// The first interrupt cancels outstanding git work so temporary clones are
/// removed on the way out. A second one exits at once.
pub fn cancel_token(timeout_secs: Option<u64>) -> CancelToken {
    let token = match timeout_secs {
        Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    };
    let interrupted = token.clone();
    let installed = ctrlc::set_handler(move || {
        if interrupted.interrupt() {
            eprintln!("Interrupted; cleaning up (press Ctrl-C again to exit now)");
        } else {
            std::process::exit(INTERRUPTED);
        }
    });
    if let Err(e) = installed {
        log::warn!("cannot install Ctrl-C handler: {}", e);
    }
    token
}

/// The system git binary, wired to `cancel`.
pub fn system_git(verbose: bool, cancel: &CancelToken) -> Arc<dyn GitCapability> {
    Arc::new(SystemGit::new(verbose, cancel.clone()))
}
