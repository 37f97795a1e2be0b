//! # Sync Engine
//!
//! Turns a configuration plus a lock into files on disk.
//!
//! ## Per ref
//!
//! For every (vendor, ref) the engine:
//!
//! 1. Checks each mapping against the [`CacheStore`]. A mapping is a hit when
//!    the cache holds a record for the locked commit, the destination exists,
//!    and the destination's live checksum equals the recorded one. If every
//!    mapping hits, nothing is cloned.
//! 2. Otherwise clones into a temporary directory (partial, shallow, no
//!    checkout) and checks out the *locked commit*, never the ref name, so a
//!    moved branch cannot change what gets synced. A checkout that reports a
//!    missing object deepens the fetch and retries.
//! 3. Copies only the mappings that missed, records their checksums, and
//!    caches the vendor's license file.
//!
//! Dry runs take the same decisions but never clone, copy or record.
//!
//! ## Many vendors
//!
//! [`SyncEngine::sync_all`] first runs the conflict gate to completion, then
//! syncs vendors on a bounded rayon pool. A vendor's failure is captured in
//! its result and never stops the others.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use serde::Serialize;

use crate::cache::CacheStore;
use crate::cancel::CancelToken;
use crate::config::{RefSpec, VendorConfig, VendorSpec};
use crate::conflict;
use crate::error::{Error, Result};
use crate::filesystem::FileCapability;
use crate::git::{CloneOptions, GitCapability, ORIGIN};
use crate::license::{self, LicenseCapability};
use crate::lock::{LockDetails, VendorLock};
use crate::path::{join_destination, validate_destination, validate_source};
use crate::state::ProjectLayout;

/// Default number of vendors synced at once.
pub const DEFAULT_JOBS: usize = 4;

/// Options threaded through a sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Ignore the cache and copy every mapping.
    pub force: bool,
    /// Ignore the cache and do not record new entries.
    pub no_cache: bool,
    /// Decide and report, but change nothing.
    pub dry_run: bool,
    /// Only vendors carrying this group label.
    pub group: Option<String>,
    /// Only this vendor.
    pub vendor: Option<String>,
    pub verbose: bool,
    pub jobs: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            force: false,
            no_cache: false,
            dry_run: false,
            group: None,
            vendor: None,
            verbose: false,
            jobs: DEFAULT_JOBS,
        }
    }
}

impl SyncOptions {
    fn use_cache(&self) -> bool {
        !self.force && !self.no_cache
    }
}

/// What happened to one mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MappingAction {
    Copied,
    UpToDate,
    WouldCopy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingOutcome {
    pub source: String,
    /// Normalized, project-relative destination.
    pub destination: String,
    pub action: MappingAction,
    /// Checksum of the destination, when known.
    pub checksum: Option<String>,
    /// Checksum of each file at the destination, keyed relative to it. Empty
    /// for planned copies.
    pub files: BTreeMap<String, String>,
}

impl MappingOutcome {
    /// Per-file checksums keyed by project-relative path.
    pub fn project_files(&self) -> impl Iterator<Item = (String, &String)> + '_ {
        self.files
            .iter()
            .map(|(relative, checksum)| (join_destination(&self.destination, relative), checksum))
    }
}

/// Overall status of one ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefStatus {
    /// At least one mapping was copied.
    Synced,
    /// Every mapping was a cache hit; nothing was cloned.
    UpToDate,
    /// Dry run: at least one mapping would be copied.
    WouldSync,
    Failed,
}

/// Result of syncing one (vendor, ref).
#[derive(Debug)]
pub struct RefSyncResult {
    pub vendor: String,
    pub r#ref: String,
    pub url: String,
    /// Locked commit used, when there was one.
    pub commit: Option<String>,
    pub mappings: Vec<MappingOutcome>,
    /// Whether a clone happened.
    pub cloned: bool,
    /// SPDX id, known only after a fresh checkout.
    pub license: Option<String>,
    /// Project-relative path of the cached license text, when written.
    pub license_path: Option<String>,
    pub error: Option<Error>,
}

impl RefSyncResult {
    fn new(vendor: &VendorSpec, spec: &RefSpec) -> Self {
        Self {
            vendor: vendor.name.clone(),
            r#ref: spec.r#ref.clone(),
            url: vendor.url.clone(),
            commit: None,
            mappings: Vec::new(),
            cloned: false,
            license: None,
            license_path: None,
            error: None,
        }
    }

    pub fn status(&self) -> RefStatus {
        if self.error.is_some() {
            RefStatus::Failed
        } else if self
            .mappings
            .iter()
            .any(|m| m.action == MappingAction::WouldCopy)
        {
            RefStatus::WouldSync
        } else if self.mappings.iter().any(|m| m.action == MappingAction::Copied) {
            RefStatus::Synced
        } else {
            RefStatus::UpToDate
        }
    }

    /// Destinations written by this run.
    pub fn written_paths(&self) -> impl Iterator<Item = &str> {
        self.mappings
            .iter()
            .filter(|m| m.action == MappingAction::Copied)
            .map(|m| m.destination.as_str())
    }
}

/// Results of a multi-vendor run, in configuration order.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub results: Vec<RefSyncResult>,
}

impl SyncReport {
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.error.is_some())
    }

    pub fn failures(&self) -> impl Iterator<Item = &RefSyncResult> {
        self.results.iter().filter(|r| r.error.is_some())
    }

    pub fn count(&self, status: RefStatus) -> usize {
        self.results.iter().filter(|r| r.status() == status).count()
    }

    /// Every project-relative path written, including cached license texts.
    pub fn written_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .results
            .iter()
            .flat_map(|r| {
                r.written_paths()
                    .map(str::to_string)
                    .chain(r.license_path.clone())
            })
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}

/// Select the (vendor, ref) pairs a run applies to.
///
/// Fails with a configuration error when `--vendor` names an unknown vendor.
pub fn select_targets<'a>(
    config: &'a VendorConfig,
    vendor: Option<&str>,
    group: Option<&str>,
) -> Result<Vec<(&'a VendorSpec, &'a RefSpec)>> {
    if let Some(name) = vendor {
        if config.vendor(name).is_none() {
            return Err(Error::Config {
                message: format!("unknown vendor '{}'", name),
                hint: Some("Run 'git-vendor validate' to list configured vendors".to_string()),
            });
        }
    }
    Ok(config
        .vendors
        .iter()
        .filter(|v| vendor.map_or(true, |name| v.name == name))
        .filter(|v| group.map_or(true, |g| v.in_group(g)))
        .flat_map(|v| v.specs.iter().map(move |spec| (v, spec)))
        .collect())
}

/// Build the rayon pool used for per-vendor work.
pub(crate) fn worker_pool(jobs: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .thread_name(|i| format!("git-vendor-{}", i))
        .build()
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
}

/// Per-vendor synchronization over pluggable git, file and license
/// capabilities.
pub struct SyncEngine {
    git: Arc<dyn GitCapability>,
    files: Arc<dyn FileCapability>,
    license: Arc<dyn LicenseCapability>,
    cache: Arc<CacheStore>,
    layout: ProjectLayout,
    cancel: CancelToken,
}

impl SyncEngine {
    pub fn new(
        git: Arc<dyn GitCapability>,
        files: Arc<dyn FileCapability>,
        license: Arc<dyn LicenseCapability>,
        cache: Arc<CacheStore>,
        layout: ProjectLayout,
        cancel: CancelToken,
    ) -> Self {
        Self {
            git,
            files,
            license,
            cache,
            layout,
            cancel,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Sync every selected vendor in parallel.
    ///
    /// Conflict validation runs first and is fatal. After that, failures are
    /// per ref and land in the report. `on_done` is called as each ref
    /// finishes, from worker threads.
    pub fn sync_all(
        &self,
        config: &VendorConfig,
        lock: &VendorLock,
        options: &SyncOptions,
        on_done: &(dyn Fn(&RefSyncResult) + Sync),
    ) -> Result<SyncReport> {
        conflict::validate(config)?;

        let targets = select_targets(config, options.vendor.as_deref(), options.group.as_deref())?;
        // One unit of work per vendor; a vendor's refs run in order.
        let mut by_vendor: Vec<(&VendorSpec, Vec<(usize, &RefSpec)>)> = Vec::new();
        for (index, (vendor, spec)) in targets.iter().enumerate() {
            match by_vendor.last_mut() {
                Some((last, specs)) if last.name == vendor.name => specs.push((index, *spec)),
                _ => by_vendor.push((*vendor, vec![(index, *spec)])),
            }
        }

        let results: Mutex<Vec<(usize, RefSyncResult)>> = Mutex::new(Vec::new());
        let pool = worker_pool(options.jobs)?;
        pool.install(|| {
            by_vendor.par_iter().for_each(|(vendor, specs)| {
                for (index, spec) in specs {
                    let result = self.sync_ref(vendor, spec, lock.get(&vendor.name, &spec.r#ref), options);
                    on_done(&result);
                    if let Ok(mut results) = results.lock() {
                        results.push((*index, result));
                    }
                }
            });
        });

        let mut results = results.into_inner().map_err(|_| Error::LockPoisoned {
            context: "sync results".to_string(),
        })?;
        results.sort_by_key(|(index, _)| *index);
        Ok(SyncReport {
            results: results.into_iter().map(|(_, r)| r).collect(),
        })
    }

    /// Sync one ref of one vendor. Never fails; errors land in the result.
    pub fn sync_ref(
        &self,
        vendor: &VendorSpec,
        spec: &RefSpec,
        locked: Option<&LockDetails>,
        options: &SyncOptions,
    ) -> RefSyncResult {
        let mut result = RefSyncResult::new(vendor, spec);
        match self.try_sync_ref(vendor, spec, locked, options, &mut result) {
            Ok(()) => log::info!(
                "{}@{}: {:?}",
                result.vendor,
                result.r#ref,
                result.status()
            ),
            Err(e) => {
                log::info!("{}@{} failed: {}", result.vendor, result.r#ref, e);
                result.error = Some(e);
            }
        }
        result
    }

    fn try_sync_ref(
        &self,
        vendor: &VendorSpec,
        spec: &RefSpec,
        locked: Option<&LockDetails>,
        options: &SyncOptions,
        result: &mut RefSyncResult,
    ) -> Result<()> {
        self.cancel.check()?;
        let locked = locked.ok_or_else(|| Error::NotLocked {
            vendor: vendor.name.clone(),
            r#ref: spec.r#ref.clone(),
        })?;
        let commit = locked.commit_hash.as_str();
        result.commit = Some(commit.to_string());

        // Both ends of every mapping are re-checked here, right before any
        // file operation.
        let mut plan = Vec::with_capacity(spec.mapping.len());
        for mapping in &spec.mapping {
            let destination = spec.destination(mapping).ok_or_else(|| {
                Error::config(format!(
                    "mapping '{}' of {}@{} has no destination",
                    mapping.from, vendor.name, spec.r#ref
                ))
            })?;
            validate_source(&vendor.name, &mapping.from)?;
            plan.push((
                mapping.from.clone(),
                validate_destination(&vendor.name, &destination)?,
            ));
        }

        if !options.dry_run {
            self.cache.invalidate(&vendor.name, &spec.r#ref, commit);
        }

        let mut misses = Vec::new();
        for (source, destination) in plan {
            let hit = if options.use_cache() {
                self.cache_hit(&vendor.name, &spec.r#ref, commit, &destination)
            } else {
                None
            };
            match hit {
                Some((checksum, files)) => result.mappings.push(MappingOutcome {
                    source,
                    destination,
                    action: MappingAction::UpToDate,
                    checksum: Some(checksum),
                    files,
                }),
                None => misses.push((source, destination)),
            }
        }

        if misses.is_empty() {
            log::debug!("{}@{}: all mappings cached", vendor.name, spec.r#ref);
            return Ok(());
        }

        if options.dry_run {
            result
                .mappings
                .extend(misses.into_iter().map(|(source, destination)| MappingOutcome {
                    source,
                    destination,
                    action: MappingAction::WouldCopy,
                    checksum: None,
                    files: BTreeMap::new(),
                }));
            return Ok(());
        }

        // Dropping the guard removes the clone on every exit path.
        let temp = self.files.temp_dir("git-vendor-")?;
        let checkout = temp.path().join("repo");
        self.git.clone_repo(
            &vendor.url,
            &checkout,
            &CloneOptions {
                filter: Some("blob:none".to_string()),
                no_checkout: true,
                depth: Some(1),
                branch: None,
            },
        )?;
        result.cloned = true;
        self.checkout_locked(&checkout, commit)?;

        for (source, destination) in misses {
            self.cancel.check()?;
            let outcome = self.copy_mapping(vendor, spec, commit, &checkout, source, destination, options)?;
            result.mappings.push(outcome);
        }

        result.license = Some(
            self.license
                .spdx_id(&vendor.url, &vendor.license, Some(&checkout)),
        );
        if let Some(license_file) = license::find_license_file(&checkout) {
            let rel = self.layout.license_rel_path(&vendor.name);
            self.files
                .copy(&license_file, &self.layout.root().join(&rel))?;
            result.license_path = Some(rel);
        }
        Ok(())
    }

    /// Stored checksum and per-file checksums when `destination` is a
    /// verified cache hit.
    fn cache_hit(
        &self,
        vendor: &str,
        r#ref: &str,
        commit: &str,
        destination: &str,
    ) -> Option<(String, BTreeMap<String, String>)> {
        let stored = self.cache.lookup(vendor, r#ref, commit, destination)?;
        let path = self.layout.root().join(destination);
        if !self.files.exists(&path) {
            log::debug!("cache miss for {}: destination missing", destination);
            return None;
        }
        match self.files.checksum(&path) {
            Ok(live) if live == stored => match self.files.file_checksums(&path) {
                Ok(files) => Some((stored, files)),
                Err(e) => {
                    log::debug!("cache miss for {}: {}", destination, e);
                    None
                }
            },
            Ok(_) => {
                log::debug!("cache miss for {}: modified since last sync", destination);
                None
            }
            Err(e) => {
                log::debug!("cache miss for {}: {}", destination, e);
                None
            }
        }
    }

    /// Check out `commit`, deepening the clone if it is not present yet.
    fn checkout_locked(&self, checkout: &Path, commit: &str) -> Result<()> {
        match self.git.checkout(checkout, commit) {
            Err(e) if e.is_missing_object() => {
                log::debug!("{} not in shallow clone, fetching it", commit);
            }
            other => return other,
        }

        self.cancel.check()?;
        let fetched = self
            .git
            .fetch(checkout, ORIGIN, commit, Some(1))
            .and_then(|()| self.git.checkout(checkout, commit));
        match fetched {
            Ok(()) => return Ok(()),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => log::debug!("direct fetch of {} failed ({}), fetching all", commit, e),
        }

        self.cancel.check()?;
        self.git.fetch_all(checkout, ORIGIN)?;
        self.git.checkout(checkout, commit)
    }

    #[allow(clippy::too_many_arguments)]
    fn copy_mapping(
        &self,
        vendor: &VendorSpec,
        spec: &RefSpec,
        commit: &str,
        checkout: &Path,
        source: String,
        destination: String,
        options: &SyncOptions,
    ) -> Result<MappingOutcome> {
        let source_path = checkout.join(validate_source(&vendor.name, &source)?);
        if !self.files.exists(&source_path) {
            return Err(self.missing_source(checkout, commit, &vendor.name, &spec.r#ref, &source));
        }

        let dest_path = self.layout.root().join(&destination);
        let copied = self.files.copy(&source_path, &dest_path)?;
        log::debug!("copied {} file(s) into {}", copied.len(), destination);
        let checksum = self.files.checksum(&dest_path)?;
        let files = self.files.file_checksums(&dest_path)?;

        if !options.no_cache {
            self.cache.record(
                &vendor.name,
                &spec.r#ref,
                commit,
                &destination,
                &source,
                &checksum,
            )?;
        }
        Ok(MappingOutcome {
            source,
            destination,
            action: MappingAction::Copied,
            checksum: Some(checksum),
            files,
        })
    }

    fn missing_source(&self, checkout: &Path, commit: &str, vendor: &str, r#ref: &str, source: &str) -> Error {
        let parent = source
            .trim_matches('/')
            .rsplit_once('/')
            .map(|(parent, _)| parent)
            .unwrap_or("");
        let available = self
            .git
            .list_tree(checkout, commit, parent)
            .map(|entries| entries.join(", "))
            .unwrap_or_default();
        Error::Filesystem {
            message: format!(
                "source path '{}' not found in {}@{} ({}); entries under '{}': {}",
                source,
                vendor,
                r#ref,
                crate::lock::short_hash(commit),
                if parent.is_empty() { "/" } else { parent },
                if available.is_empty() { "none" } else { &available },
            ),
        }
    }
}
