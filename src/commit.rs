//! # Vendor Commits
//!
//! One run produces at most one commit covering every vendor it touched.
//! The commit carries two kinds of metadata:
//!
//! - **Trailers**, the human-readable summary: one `Vendor-Name`,
//!   `Vendor-Ref`, `Vendor-Commit` triple per vendor ref, in input order. The
//!   triples are positional; readers must consume them in groups of three.
//! - **A note** under [`NOTES_REF`], the machine-readable record: URLs,
//!   license ids, every vendored file with its checksum, who synced and when.
//!
//! Note attachment is best effort. A failure is logged and the commit stands.
//!
//! Only the paths handed to [`CommitService::commit`] are staged, but files
//! the user had already staged are not excluded and end up in the commit too.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::config::VendorConfig;
use crate::error::Result;
use crate::filesystem::FileCapability;
use crate::git::{GitCapability, Trailer};
use crate::lock::{short_hash, LockDetails, VendorLock};
use crate::path::join_destination;
use crate::sync::SyncReport;

/// Notes namespace holding vendor notes.
pub const NOTES_REF: &str = "refs/notes/vendor";

pub const TRAILER_NAME: &str = "Vendor-Name";
pub const TRAILER_REF: &str = "Vendor-Ref";
pub const TRAILER_COMMIT: &str = "Vendor-Commit";

/// One vendor ref as recorded in a commit, before flattening to trailers.
#[derive(Debug, Clone, PartialEq, Eq)]
struct VendorTrailer<'a> {
    name: &'a str,
    r#ref: &'a str,
    commit: &'a str,
}

impl<'a> From<&'a LockDetails> for VendorTrailer<'a> {
    fn from(details: &'a LockDetails) -> Self {
        Self {
            name: &details.name,
            r#ref: &details.r#ref,
            commit: &details.commit_hash,
        }
    }
}

impl VendorTrailer<'_> {
    fn flatten(&self) -> [Trailer; 3] {
        [
            Trailer::new(TRAILER_NAME, self.name),
            Trailer::new(TRAILER_REF, self.r#ref),
            Trailer::new(TRAILER_COMMIT, self.commit),
        ]
    }
}

/// Trailer triples for `lock_details`, in input order.
pub fn build_trailers(lock_details: &[LockDetails]) -> Vec<Trailer> {
    lock_details
        .iter()
        .map(VendorTrailer::from)
        .flat_map(|t| t.flatten())
        .collect()
}

/// Read trailer triples back as (name, ref, commit).
///
/// Incomplete trailing groups are dropped.
pub fn parse_trailers(trailers: &[Trailer]) -> Vec<(String, String, String)> {
    trailers
        .chunks_exact(3)
        .filter_map(|group| match group {
            [name, r, commit]
                if name.key == TRAILER_NAME
                    && r.key == TRAILER_REF
                    && commit.key == TRAILER_COMMIT =>
            {
                Some((name.value.clone(), r.value.clone(), commit.value.clone()))
            }
            _ => None,
        })
        .collect()
}

/// The note attached to a vendor commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorNote {
    pub synced_by: String,
    pub timestamp: DateTime<Utc>,
    /// Keyed by vendor name.
    pub vendors: BTreeMap<String, NoteVendor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteVendor {
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub license: String,
    pub refs: Vec<NoteRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRef {
    pub r#ref: String,
    pub commit: String,
    pub updated: DateTime<Utc>,
    /// Project-relative file path to checksum, one entry per vendored file.
    pub paths: BTreeMap<String, String>,
}

/// Data for the note that the lock does not carry.
#[derive(Debug, Clone, Default)]
pub struct NoteMetadata {
    urls: BTreeMap<String, String>,
    licenses: BTreeMap<String, String>,
    paths: BTreeMap<(String, String), BTreeMap<String, String>>,
}

impl NoteMetadata {
    /// URLs and declared licenses from the configuration.
    pub fn from_config(config: &VendorConfig) -> Self {
        let mut metadata = Self::default();
        for vendor in &config.vendors {
            metadata.urls.insert(vendor.name.clone(), vendor.url.clone());
            if !vendor.license.is_empty() {
                metadata
                    .licenses
                    .insert(vendor.name.clone(), vendor.license.clone());
            }
        }
        metadata
    }

    /// Checksums and detected licenses from a finished sync.
    pub fn add_sync_report(&mut self, report: &SyncReport) {
        for result in report.results.iter().filter(|r| r.error.is_none()) {
            if let Some(license) = &result.license {
                self.licenses
                    .entry(result.vendor.clone())
                    .or_insert_with(|| license.clone());
            }
            let paths = self
                .paths
                .entry((result.vendor.clone(), result.r#ref.clone()))
                .or_default();
            for mapping in &result.mappings {
                for (path, checksum) in mapping.project_files() {
                    paths.insert(path, checksum.clone());
                }
            }
        }
    }

    /// File checksums for cached destinations of the locked commits.
    ///
    /// A destination is only reported when it still matches its cached
    /// checksum under `root`; edited or missing destinations are left out.
    pub fn add_cache(
        &mut self,
        cache: &CacheStore,
        lock: &VendorLock,
        files: &dyn FileCapability,
        root: &Path,
    ) {
        for entry in cache.entries() {
            let locked = lock
                .get(&entry.vendor, &entry.r#ref)
                .is_some_and(|d| d.commit_hash == entry.record.commit);
            if !locked {
                continue;
            }
            let path = root.join(&entry.destination);
            let checksums = match files.checksum(&path) {
                Ok(live) if live == entry.record.checksum => files.file_checksums(&path),
                Ok(_) => {
                    log::debug!(
                        "{} changed since it was cached; left out of note",
                        entry.destination
                    );
                    continue;
                }
                Err(e) => Err(e),
            };
            let checksums = match checksums {
                Ok(checksums) => checksums,
                Err(e) => {
                    log::debug!("cannot checksum {}: {}", entry.destination, e);
                    continue;
                }
            };
            let paths = self.paths.entry((entry.vendor, entry.r#ref)).or_default();
            for (relative, checksum) in checksums {
                paths
                    .entry(join_destination(&entry.destination, &relative))
                    .or_insert(checksum);
            }
        }
    }
}

/// Build the note for `lock_details`.
pub fn build_note(lock_details: &[LockDetails], metadata: &NoteMetadata, synced_by: &str) -> VendorNote {
    let mut vendors: BTreeMap<String, NoteVendor> = BTreeMap::new();
    for details in lock_details {
        let vendor = vendors.entry(details.name.clone()).or_insert_with(|| NoteVendor {
            url: metadata.urls.get(&details.name).cloned().unwrap_or_default(),
            license: metadata
                .licenses
                .get(&details.name)
                .cloned()
                .unwrap_or_default(),
            refs: Vec::new(),
        });
        vendor.refs.push(NoteRef {
            r#ref: details.r#ref.clone(),
            commit: details.commit_hash.clone(),
            updated: details.updated,
            paths: metadata
                .paths
                .get(&(details.name.clone(), details.r#ref.clone()))
                .cloned()
                .unwrap_or_default(),
        });
    }
    VendorNote {
        synced_by: synced_by.to_string(),
        timestamp: Utc::now(),
        vendors,
    }
}

/// Subject line for a vendor commit.
pub fn commit_subject(lock_details: &[LockDetails]) -> String {
    match lock_details {
        [single] => format!(
            "chore(vendor): sync {}@{} ({})",
            single.name,
            single.r#ref,
            single.short_hash()
        ),
        many => {
            let mut names: Vec<&str> = many.iter().map(|d| d.name.as_str()).collect();
            names.dedup();
            format!(
                "chore(vendor): sync {} refs ({})",
                many.len(),
                names.join(", ")
            )
        }
    }
}

/// Creates vendor commits and notes in the project repository.
pub struct CommitService {
    git: Arc<dyn GitCapability>,
    repo_dir: PathBuf,
}

impl CommitService {
    pub fn new(git: Arc<dyn GitCapability>, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            git,
            repo_dir: repo_dir.into(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Display identity of the committer.
    pub fn identity(&self) -> String {
        self.git.current_user_identity(&self.repo_dir)
    }

    /// Stage `staged_paths`, commit, then attach `note`.
    ///
    /// Returns the new commit hash, read only after the commit exists. A note
    /// failure is logged and does not fail the commit.
    pub fn commit(
        &self,
        staged_paths: &[String],
        subject: &str,
        trailers: &[Trailer],
        note: &VendorNote,
    ) -> Result<String> {
        self.git
            .commit(&self.repo_dir, staged_paths, subject, trailers)?;
        let hash = self.git.head_hash(&self.repo_dir)?;

        let attached = serde_json::to_string_pretty(note)
            .map_err(Into::into)
            .and_then(|body| self.git.attach_note(&self.repo_dir, NOTES_REF, &hash, &body));
        if let Err(e) = attached {
            log::warn!(
                "created commit {} but could not attach vendor note: {}",
                short_hash(&hash),
                e
            );
        }
        Ok(hash)
    }

    /// One commit for every ref in `lock_details`.
    pub fn commit_vendors(
        &self,
        lock_details: &[LockDetails],
        metadata: &NoteMetadata,
        staged_paths: &[String],
    ) -> Result<String> {
        let note = build_note(lock_details, metadata, &self.identity());
        self.commit(
            staged_paths,
            &commit_subject(lock_details),
            &build_trailers(lock_details),
            &note,
        )
    }

    /// Attach a vendor note to an existing commit without creating one.
    ///
    /// Returns the full hash `commit` resolved to.
    pub fn annotate(&self, commit: &str, lock_details: &[LockDetails], metadata: &NoteMetadata) -> Result<String> {
        let hash = self.git.rev_parse(&self.repo_dir, commit)?;
        let note = build_note(lock_details, metadata, &self.identity());
        let body = serde_json::to_string_pretty(&note)?;
        self.git
            .attach_note(&self.repo_dir, NOTES_REF, &hash, &body)?;
        Ok(hash)
    }
}
