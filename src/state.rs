//! # Persisted State
//!
//! Loading and saving of the vendor configuration and lock. The core engine
//! never touches these files directly: commands load both once through a
//! [`StateStore`] before any work starts, pass them into the engine by
//! reference, and save the lock back only after all computation completes.
//!
//! ## Layout
//!
//! Everything lives under `.git-vendor/` in the project root:
//!
//! - `vendor.yml`: the declarative configuration
//! - `vendor.lock`: resolved commits
//! - `.cache/`: the sync cache (see [`crate::cache`])
//! - `licenses/`: cached license texts

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{self, VendorConfig};
use crate::error::{Error, Result};
use crate::lock::{self, VendorLock};

/// Directory holding all git-vendor state inside a project.
pub const STATE_DIR: &str = ".git-vendor";
/// Configuration file name.
pub const CONFIG_FILE: &str = "vendor.yml";
/// Lock file name.
pub const LOCK_FILE: &str = "vendor.lock";
/// Cache directory name.
pub const CACHE_DIR: &str = ".cache";
/// License cache directory name.
pub const LICENSES_DIR: &str = "licenses";

/// Load/save of configuration and lock.
pub trait StateStore: Send + Sync {
    fn load_config(&self) -> Result<VendorConfig>;
    fn save_config(&self, config: &VendorConfig) -> Result<()>;
    fn load_lock(&self) -> Result<VendorLock>;
    fn save_lock(&self, lock: &VendorLock) -> Result<()>;
}

/// Paths of a project using git-vendor.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.state_dir().join(CONFIG_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.state_dir().join(CACHE_DIR)
    }

    /// Project-relative path of a vendor's cached license text.
    pub fn license_rel_path(&self, vendor: &str) -> String {
        format!(
            "{}/{}/{}.txt",
            STATE_DIR,
            LICENSES_DIR,
            crate::path::encode_path_component(vendor)
        )
    }

    /// Project-relative path of the lock file, for staging.
    pub fn lock_rel_path(&self) -> String {
        format!("{}/{}", STATE_DIR, LOCK_FILE)
    }
}

/// [`StateStore`] backed by YAML files in the project's `.git-vendor/`.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    layout: ProjectLayout,
}

impl FileStateStore {
    pub fn new(layout: ProjectLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves a truncated file behind.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn load_config(&self) -> Result<VendorConfig> {
        let path = self.layout.config_path();
        if !path.exists() {
            return Err(Error::Config {
                message: format!("configuration not found: {}", path.display()),
                hint: Some(format!(
                    "Create {}/{} or pass --root to point at your project",
                    STATE_DIR, CONFIG_FILE
                )),
            });
        }
        config::from_file(&path)
    }

    fn save_config(&self, config: &VendorConfig) -> Result<()> {
        self.write(&self.layout.config_path(), &config::to_yaml(config)?)
    }

    fn load_lock(&self) -> Result<VendorLock> {
        lock::from_file(&self.layout.lock_path())
    }

    fn save_lock(&self, lock: &VendorLock) -> Result<()> {
        log::debug!("writing lock with {} entries", lock.vendors.len());
        self.write(&self.layout.lock_path(), &lock::to_yaml(lock)?)
    }
}
