//! Resolved lock state stored in `.git-vendor/vendor.lock`

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::VendorConfig;
use crate::error::{Error, Result};

/// Resolved commits for every (vendor, ref) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorLock {
    #[serde(default)]
    pub vendors: Vec<LockDetails>,
}

/// The pinned state of one vendor ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDetails {
    pub name: String,
    pub r#ref: String,
    /// Full commit SHA the ref resolved to.
    pub commit_hash: String,
    /// Project-relative path of the cached license text, empty if none.
    #[serde(default)]
    pub license_path: String,
    pub updated: DateTime<Utc>,
}

impl LockDetails {
    pub fn new(name: &str, r#ref: &str, commit_hash: &str) -> Self {
        Self {
            name: name.to_string(),
            r#ref: r#ref.to_string(),
            commit_hash: commit_hash.to_string(),
            license_path: String::new(),
            updated: Utc::now(),
        }
    }

    /// Abbreviated commit hash for display.
    pub fn short_hash(&self) -> &str {
        short_hash(&self.commit_hash)
    }
}

/// First seven characters of a hash, or the whole thing if shorter.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}

impl VendorLock {
    /// Look up the lock entry for a vendor ref.
    pub fn get(&self, name: &str, r#ref: &str) -> Option<&LockDetails> {
        self.vendors
            .iter()
            .find(|d| d.name == name && d.r#ref == r#ref)
    }

    /// Insert or replace the entry for `details.name`/`details.ref`.
    pub fn upsert(&mut self, details: LockDetails) {
        match self
            .vendors
            .iter_mut()
            .find(|d| d.name == details.name && d.r#ref == details.r#ref)
        {
            Some(existing) => *existing = details,
            None => self.vendors.push(details),
        }
    }

    /// Point a vendor ref at its cached license text. Unknown refs are ignored.
    pub fn set_license_path(&mut self, name: &str, r#ref: &str, path: &str) {
        if let Some(details) = self
            .vendors
            .iter_mut()
            .find(|d| d.name == name && d.r#ref == r#ref)
        {
            details.license_path = path.to_string();
        }
    }

    /// Drop entries for vendors or refs no longer in the config and order the
    /// rest like the config.
    pub fn retain_configured(&mut self, config: &VendorConfig) {
        let mut ordered = Vec::with_capacity(self.vendors.len());
        for vendor in &config.vendors {
            for spec in &vendor.specs {
                if let Some(details) = self.get(&vendor.name, &spec.r#ref) {
                    ordered.push(details.clone());
                }
            }
        }
        self.vendors = ordered;
    }
}

/// Parse lock YAML.
pub fn parse(yaml: &str) -> Result<VendorLock> {
    if yaml.trim().is_empty() {
        return Ok(VendorLock::default());
    }
    serde_yaml::from_str(yaml).map_err(|e| Error::Config {
        message: format!("invalid lock file: {}", e),
        hint: Some("Run 'git-vendor update' to regenerate the lock".to_string()),
    })
}

/// Read a lock file; a missing file is an empty lock.
pub fn from_file(path: &Path) -> Result<VendorLock> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(VendorLock::default()),
        Err(e) => Err(e.into()),
    }
}

/// Serialize a lock to YAML.
pub fn to_yaml(lock: &VendorLock) -> Result<String> {
    Ok(serde_yaml::to_string(lock)?)
}
