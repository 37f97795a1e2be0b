//! # Sync Cache
//!
//! [`CacheStore`] remembers, per destination path, which commit a vendored
//! path was last materialized from and the checksum it had when written. The
//! sync engine consults it before cloning so unchanged vendors cost nothing.
//!
//! ## Keys and hits
//!
//! Records are keyed by (vendor, ref, destination) and carry the commit hash
//! they were written for. A lookup only hits when the stored commit equals the
//! commit asked for; the caller additionally compares the stored checksum with
//! the live one on disk (see [`crate::sync`]). Records are never patched across
//! a commit change: [`CacheStore::invalidate`] drops them and the next
//! [`CacheStore::record`] writes fresh ones.
//!
//! ## Concurrency
//!
//! Workers for different vendors share one store. The key map sits behind an
//! `RwLock` that is only write-locked to add or remove keys; each record has
//! its own `Mutex`, so updates to different destinations never contend.
//!
//! ## Persistence
//!
//! One JSON file per (vendor, ref) under `.git-vendor/.cache/`. Only groups
//! touched during the run are rewritten. Unreadable files are logged and
//! ignored, which makes every path they covered a miss.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path::encode_path_component;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct DestKey {
    vendor: String,
    r#ref: String,
    destination: String,
}

/// What was written to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub commit: String,
    pub source: String,
    pub checksum: String,
}

/// A cache record with its key, for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub vendor: String,
    pub r#ref: String,
    pub destination: String,
    #[serde(flatten)]
    pub record: CacheRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    vendor: String,
    r#ref: String,
    #[serde(default)]
    entries: BTreeMap<String, CacheRecord>,
}

/// Shared, per-destination synchronized sync cache.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: RwLock<HashMap<DestKey, Arc<Mutex<CacheRecord>>>>,
    touched: Mutex<BTreeSet<(String, String)>>,
    dir: Option<PathBuf>,
}

impl CacheStore {
    /// A store that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load every cache file under `dir`. A missing directory is an empty cache.
    pub fn load(dir: &Path) -> Self {
        let mut entries = HashMap::new();
        for path in cache_files(dir) {
            match read_cache_file(&path) {
                Ok(file) => {
                    for (destination, record) in file.entries {
                        let key = DestKey {
                            vendor: file.vendor.clone(),
                            r#ref: file.r#ref.clone(),
                            destination,
                        };
                        entries.insert(key, Arc::new(Mutex::new(record)));
                    }
                }
                Err(e) => log::warn!("ignoring cache file {}: {}", path.display(), e),
            }
        }
        log::debug!("loaded {} cache entries from {}", entries.len(), dir.display());
        Self {
            entries: RwLock::new(entries),
            touched: Mutex::new(BTreeSet::new()),
            dir: Some(dir.to_path_buf()),
        }
    }

    fn key(vendor: &str, r#ref: &str, destination: &str) -> DestKey {
        DestKey {
            vendor: vendor.to_string(),
            r#ref: r#ref.to_string(),
            destination: destination.to_string(),
        }
    }

    fn touch(&self, vendor: &str, r#ref: &str) {
        if let Ok(mut touched) = self.touched.lock() {
            touched.insert((vendor.to_string(), r#ref.to_string()));
        }
    }

    /// Stored checksum for `destination` if it was written from `commit`.
    ///
    /// A poisoned entry counts as a miss.
    pub fn lookup(&self, vendor: &str, r#ref: &str, commit: &str, destination: &str) -> Option<String> {
        let slot = {
            let entries = self.entries.read().ok()?;
            entries.get(&Self::key(vendor, r#ref, destination))?.clone()
        };
        let record = slot.lock().ok()?;
        (record.commit == commit).then(|| record.checksum.clone())
    }

    /// Record what was just written to `destination`.
    pub fn record(
        &self,
        vendor: &str,
        r#ref: &str,
        commit: &str,
        destination: &str,
        source: &str,
        checksum: &str,
    ) -> Result<()> {
        let key = Self::key(vendor, r#ref, destination);
        let record = CacheRecord {
            commit: commit.to_string(),
            source: source.to_string(),
            checksum: checksum.to_string(),
        };

        let existing = self
            .entries
            .read()
            .map_err(|_| poisoned("cache map"))?
            .get(&key)
            .cloned();
        match existing {
            Some(slot) => *slot.lock().map_err(|_| poisoned("cache entry"))? = record,
            None => {
                let mut entries = self.entries.write().map_err(|_| poisoned("cache map"))?;
                let slot = entries
                    .entry(key)
                    .or_insert_with(|| Arc::new(Mutex::new(record.clone())));
                *slot.lock().map_err(|_| poisoned("cache entry"))? = record;
            }
        }
        self.touch(vendor, r#ref);
        Ok(())
    }

    /// Drop every record of `vendor`@`ref` not written from `current_commit`.
    ///
    /// Returns how many records were removed. Other vendors and refs are
    /// never affected.
    pub fn invalidate(&self, vendor: &str, r#ref: &str, current_commit: &str) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|key, slot| {
            if key.vendor != vendor || key.r#ref != r#ref {
                return true;
            }
            // A poisoned record is as good as stale.
            slot.lock()
                .map(|record| record.commit == current_commit)
                .unwrap_or(false)
        });
        let removed = before - entries.len();
        drop(entries);
        if removed > 0 {
            log::debug!("invalidated {} cache entries for {}@{}", removed, vendor, r#ref);
            self.touch(vendor, r#ref);
        }
        removed
    }

    /// Snapshot of all records, sorted by vendor, ref and destination.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let Ok(entries) = self.entries.read() else {
            return Vec::new();
        };
        let mut list: Vec<CacheEntry> = entries
            .iter()
            .filter_map(|(key, slot)| {
                let record = slot.lock().ok()?.clone();
                Some(CacheEntry {
                    vendor: key.vendor.clone(),
                    r#ref: key.r#ref.clone(),
                    destination: key.destination.clone(),
                    record,
                })
            })
            .collect();
        list.sort_by(|a, b| {
            (&a.vendor, &a.r#ref, &a.destination).cmp(&(&b.vendor, &b.r#ref, &b.destination))
        });
        list
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write back every (vendor, ref) group touched since load.
    ///
    /// A no-op for in-memory stores.
    pub fn persist(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let touched: Vec<(String, String)> = {
            let mut touched = self.touched.lock().map_err(|_| poisoned("cache journal"))?;
            std::mem::take(&mut *touched).into_iter().collect()
        };
        if touched.is_empty() {
            return Ok(());
        }

        let mut groups: BTreeMap<(String, String), BTreeMap<String, CacheRecord>> = touched
            .into_iter()
            .map(|group| (group, BTreeMap::new()))
            .collect();
        for entry in self.entries() {
            if let Some(group) = groups.get_mut(&(entry.vendor, entry.r#ref)) {
                group.insert(entry.destination, entry.record);
            }
        }

        fs::create_dir_all(dir).map_err(|e| Error::Cache {
            message: format!("cannot create {}: {}", dir.display(), e),
        })?;
        for ((vendor, r#ref), entries) in groups {
            let path = dir.join(cache_file_name(&vendor, &r#ref));
            if entries.is_empty() {
                if path.exists() {
                    fs::remove_file(&path)?;
                }
                continue;
            }
            let file = CacheFile {
                vendor,
                r#ref,
                entries,
            };
            let json = serde_json::to_string_pretty(&file)?;
            fs::write(&path, json).map_err(|e| Error::Cache {
                message: format!("cannot write {}: {}", path.display(), e),
            })?;
        }
        Ok(())
    }
}

fn poisoned(context: &str) -> Error {
    Error::LockPoisoned {
        context: context.to_string(),
    }
}

/// File name for the cache group of `vendor`@`ref`.
pub fn cache_file_name(vendor: &str, r#ref: &str) -> String {
    format!(
        "{}@{}.json",
        encode_path_component(vendor),
        encode_path_component(r#ref)
    )
}

fn cache_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files
}

fn read_cache_file(path: &Path) -> Result<CacheFile> {
    let content = fs::read_to_string(path).map_err(|e| Error::Cache {
        message: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| Error::Cache {
        message: format!("corrupt cache file: {}", e),
    })
}

/// Delete cache files under `dir`, all of them or only those of `vendor`.
///
/// Corrupt files are removed by an unfiltered clean and kept otherwise.
/// Returns the number of files removed.
pub fn clean(dir: &Path, vendor: Option<&str>) -> Result<usize> {
    let mut removed = 0;
    for path in cache_files(dir) {
        let matches = match vendor {
            None => true,
            Some(name) => read_cache_file(&path)
                .map(|file| file.vendor == name)
                .unwrap_or(false),
        };
        if matches {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
