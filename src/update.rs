//! # Update Checking
//!
//! For every tracked ref, compares the locked commit with the remote tip and
//! describes the delta: the commits in between and a representative tag for
//! the new tip.
//!
//! The same resolution backs two modes. `check-updates` only reports.
//! `update` feeds the report into [`apply_updates`], which rewrites the
//! affected lock entries; persisting them is left to the caller's
//! [`crate::state::StateStore`].
//!
//! ## Tag selection
//!
//! Of the tags pointing at the new tip, the first one that parses as
//! `vMAJOR.MINOR.PATCH[-pre][+build]` wins. Without one, the first tag the
//! remote lists is used, and with no tags at all the tag is empty.

use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use semver::Version;
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::config::VendorConfig;
use crate::error::{Error, Result};
use crate::filesystem::FileCapability;
use crate::git::{CommitInfo, GitCapability, ORIGIN};
use crate::lock::{LockDetails, VendorLock};
use crate::sync::{select_targets, worker_pool};

/// Default cap on the commits listed per ref.
pub const DEFAULT_MAX_COMMITS: usize = 50;

/// The remote state of one ref relative to its lock entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefResolution {
    /// Current tip of the ref on the remote.
    pub new_hash: String,
    /// Commits after the locked one up to the tip, newest first.
    pub commits: Vec<CommitInfo>,
    /// Representative tag of the tip, empty if it has none.
    pub tag: String,
    /// False when the locked commit is no longer reachable from the remote,
    /// so `commits` could not be computed.
    pub history_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStatus {
    Current,
    UpdateAvailable,
    /// Configured but never locked.
    NotLocked,
    Failed,
}

/// Outcome for one (vendor, ref).
#[derive(Debug)]
pub struct RefUpdate {
    pub vendor: String,
    pub r#ref: String,
    pub url: String,
    pub current_hash: Option<String>,
    pub resolution: Option<RefResolution>,
    pub error: Option<Error>,
}

impl RefUpdate {
    pub fn status(&self) -> UpdateStatus {
        match (&self.error, &self.resolution, &self.current_hash) {
            (Some(_), _, _) | (None, None, _) => UpdateStatus::Failed,
            (None, Some(_), None) => UpdateStatus::NotLocked,
            (None, Some(res), Some(current)) if res.new_hash == *current => UpdateStatus::Current,
            _ => UpdateStatus::UpdateAvailable,
        }
    }
}

/// Aggregated outcomes, in configuration order.
#[derive(Debug, Default)]
pub struct UpdateReport {
    pub refs: Vec<RefUpdate>,
}

impl UpdateReport {
    pub fn has_failures(&self) -> bool {
        self.refs.iter().any(|r| r.error.is_some())
    }

    /// True only when every ref resolved and matches its lock entry.
    pub fn all_current(&self) -> bool {
        self.refs.iter().all(|r| r.status() == UpdateStatus::Current)
    }

    /// Refs whose lock entry would change.
    pub fn pending(&self) -> impl Iterator<Item = &RefUpdate> {
        self.refs.iter().filter(|r| {
            matches!(
                r.status(),
                UpdateStatus::UpdateAvailable | UpdateStatus::NotLocked
            )
        })
    }
}

/// Write every pending resolution into `lock` and return the new entries.
///
/// Entries keep their license path; refs that are current or failed are left
/// untouched.
pub fn apply_updates(report: &UpdateReport, lock: &mut VendorLock) -> Vec<LockDetails> {
    let mut updated = Vec::new();
    for pending in report.pending() {
        let Some(resolution) = &pending.resolution else {
            continue;
        };
        let mut details = LockDetails::new(&pending.vendor, &pending.r#ref, &resolution.new_hash);
        if let Some(previous) = lock.get(&pending.vendor, &pending.r#ref) {
            details.license_path = previous.license_path.clone();
        }
        lock.upsert(details.clone());
        updated.push(details);
    }
    updated
}

/// Whether `tag` is a `v`-prefixed semantic version.
pub fn is_semver_tag(tag: &str) -> bool {
    tag.strip_prefix('v')
        .is_some_and(|version| Version::parse(version).is_ok())
}

/// Pick the representative tag from the remote's tag list.
pub fn select_tag(tags: &[String]) -> String {
    tags.iter()
        .find(|tag| is_semver_tag(tag))
        .or_else(|| tags.first())
        .cloned()
        .unwrap_or_default()
}

/// Resolves refs against their remotes.
pub struct UpdateChecker {
    git: Arc<dyn GitCapability>,
    files: Arc<dyn FileCapability>,
    cancel: CancelToken,
    max_commits: usize,
}

impl UpdateChecker {
    pub fn new(
        git: Arc<dyn GitCapability>,
        files: Arc<dyn FileCapability>,
        cancel: CancelToken,
        max_commits: usize,
    ) -> Self {
        Self {
            git,
            files,
            cancel,
            max_commits: max_commits.max(1),
        }
    }

    /// Resolve `ref` of the repository at `url` against `current_hash`.
    pub fn resolve_ref(&self, url: &str, r#ref: &str, current_hash: Option<&str>) -> Result<RefResolution> {
        self.cancel.check()?;
        let temp = self.files.temp_dir("git-vendor-update-")?;
        let dir = temp.path();
        self.git.init(dir)?;
        self.git.add_remote(dir, ORIGIN, url)?;
        self.git.fetch(dir, ORIGIN, r#ref, Some(1))?;
        let new_hash = self.git.rev_parse(dir, "FETCH_HEAD")?;

        let Some(current) = current_hash.filter(|current| *current != new_hash) else {
            return Ok(RefResolution {
                new_hash,
                commits: Vec::new(),
                tag: String::new(),
                history_complete: true,
            });
        };

        let (commits, history_complete) = self.commit_range(dir, r#ref, current, &new_hash)?;
        let tag = match self.git.tags_at(dir, ORIGIN, &new_hash) {
            Ok(tags) => select_tag(&tags),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                log::warn!("could not list tags of {}: {}", url, e);
                String::new()
            }
        };

        Ok(RefResolution {
            new_hash,
            commits,
            tag,
            history_complete,
        })
    }

    /// Commits in `old..new`, deepening the fetch as needed.
    fn commit_range(
        &self,
        dir: &std::path::Path,
        r#ref: &str,
        old: &str,
        new: &str,
    ) -> Result<(Vec<CommitInfo>, bool)> {
        let range = format!("{}..{}", old, new);
        let depth = u32::try_from(self.max_commits + 1).unwrap_or(u32::MAX);
        self.git.fetch(dir, ORIGIN, r#ref, Some(depth))?;
        match self.git.commit_log(dir, &range, self.max_commits) {
            Err(e) if e.is_missing_object() => {
                log::debug!("{} not within depth {}, fetching full history", old, depth);
            }
            other => return other.map(|commits| (commits, true)),
        }

        self.cancel.check()?;
        self.git.fetch_all(dir, ORIGIN)?;
        match self.git.commit_log(dir, &range, self.max_commits) {
            Ok(commits) => Ok((commits, true)),
            Err(e) if e.is_missing_object() => {
                log::warn!(
                    "locked commit {} is no longer reachable from {}; history unavailable",
                    crate::lock::short_hash(old),
                    r#ref
                );
                Ok((Vec::new(), false))
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve every selected ref in parallel. Never mutates `lock`.
    pub fn check_all(
        &self,
        config: &VendorConfig,
        lock: &VendorLock,
        vendor: Option<&str>,
        group: Option<&str>,
        jobs: usize,
    ) -> Result<UpdateReport> {
        let targets = select_targets(config, vendor, group)?;
        let results: Mutex<Vec<(usize, RefUpdate)>> = Mutex::new(Vec::new());

        let pool = worker_pool(jobs)?;
        pool.install(|| {
            targets
                .par_iter()
                .enumerate()
                .for_each(|(index, (vendor, spec))| {
                    let current_hash = lock
                        .get(&vendor.name, &spec.r#ref)
                        .map(|d| d.commit_hash.clone());
                    let mut outcome = RefUpdate {
                        vendor: vendor.name.clone(),
                        r#ref: spec.r#ref.clone(),
                        url: vendor.url.clone(),
                        current_hash,
                        resolution: None,
                        error: None,
                    };
                    match self.resolve_ref(&vendor.url, &spec.r#ref, outcome.current_hash.as_deref()) {
                        Ok(resolution) => outcome.resolution = Some(resolution),
                        Err(e) => {
                            log::info!("{}@{}: {}", vendor.name, spec.r#ref, e);
                            outcome.error = Some(e);
                        }
                    }
                    if let Ok(mut results) = results.lock() {
                        results.push((index, outcome));
                    }
                });
        });

        let mut results = results.into_inner().map_err(|_| Error::LockPoisoned {
            context: "update results".to_string(),
        })?;
        results.sort_by_key(|(index, _)| *index);
        Ok(UpdateReport {
            refs: results.into_iter().map(|(_, r)| r).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::LocalFs;
    use crate::testing::FakeGit;

    const URL: &str = "https://example.com/lib.git";

    fn checker(git: &Arc<FakeGit>, max_commits: usize) -> UpdateChecker {
        UpdateChecker::new(git.clone(), Arc::new(LocalFs), CancelToken::new(), max_commits)
    }

    fn history(git: &FakeGit, hashes: &[&str]) {
        for hash in hashes {
            git.add_commit(URL, hash, &[("f", hash)]);
        }
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_select_tag_prefers_semver() {
        assert_eq!(select_tag(&tags(&["release-2025", "v1.2.3"])), "v1.2.3");
        assert_eq!(select_tag(&tags(&["release-2025", "beta"])), "release-2025");
        assert_eq!(select_tag(&tags(&["beta", "release-2025"])), "beta");
        assert_eq!(select_tag(&[]), "");
    }

    #[test]
    fn test_is_semver_tag() {
        assert!(is_semver_tag("v1.2.3"));
        assert!(is_semver_tag("v1.0.0-rc.1+build.5"));
        assert!(!is_semver_tag("1.2.3"));
        assert!(!is_semver_tag("v1.2"));
        assert!(!is_semver_tag("version-1"));
    }

    #[test]
    fn test_unchanged_ref_is_current() {
        let git = Arc::new(FakeGit::new());
        history(&git, &["c1", "c2"]);
        let resolution = checker(&git, 10).resolve_ref(URL, "main", Some("c2")).unwrap();
        assert_eq!(resolution.new_hash, "c2");
        assert!(resolution.commits.is_empty());
        assert_eq!(resolution.tag, "");
        assert_eq!(git.count("fetch-all"), 0);
    }

    #[test]
    fn test_changed_ref_lists_commits_newest_first() {
        let git = Arc::new(FakeGit::new());
        history(&git, &["c1", "c2", "c3", "c4"]);
        git.add_tag(URL, "release-2025", "c4");
        git.add_tag(URL, "v1.2.3", "c4");

        let resolution = checker(&git, 10).resolve_ref(URL, "main", Some("c1")).unwrap();
        assert_eq!(resolution.new_hash, "c4");
        let hashes: Vec<_> = resolution.commits.iter().map(|c| c.hash.as_str()).collect();
        assert_eq!(hashes, vec!["c4", "c3", "c2"]);
        assert_eq!(resolution.tag, "v1.2.3");
        assert!(resolution.history_complete);
    }

    #[test]
    fn test_commit_list_is_capped() {
        let git = Arc::new(FakeGit::new());
        history(&git, &["c1", "c2", "c3", "c4", "c5"]);
        let resolution = checker(&git, 2).resolve_ref(URL, "main", Some("c1")).unwrap();
        let hashes: Vec<_> = resolution.commits.iter().map(|c| c.hash.as_str()).collect();
        assert_eq!(hashes, vec!["c5", "c4"]);
    }

    #[test]
    fn test_locked_commit_beyond_fetch_depth_fetches_full_history() {
        let git = Arc::new(FakeGit::new());
        history(&git, &["c1", "c2", "c3", "c4", "c5", "c6"]);
        let resolution = checker(&git, 2).resolve_ref(URL, "main", Some("c1")).unwrap();
        let hashes: Vec<_> = resolution.commits.iter().map(|c| c.hash.as_str()).collect();
        assert_eq!(hashes, vec!["c6", "c5"]);
        assert!(resolution.history_complete);
        assert_eq!(git.count("fetch-all"), 1);
    }

    #[test]
    fn test_locked_commit_within_fetch_depth_skips_full_fetch() {
        let git = Arc::new(FakeGit::new());
        history(&git, &["c1", "c2", "c3", "c4"]);
        let resolution = checker(&git, 2).resolve_ref(URL, "main", Some("c2")).unwrap();
        assert_eq!(resolution.commits.len(), 2);
        assert_eq!(git.count("fetch-all"), 0);
    }

    #[test]
    fn test_unreachable_locked_commit_degrades() {
        let git = Arc::new(FakeGit::new());
        history(&git, &["c1", "c2"]);
        let resolution = checker(&git, 10)
            .resolve_ref(URL, "main", Some("force-pushed-away"))
            .unwrap();
        assert_eq!(resolution.new_hash, "c2");
        assert!(resolution.commits.is_empty());
        assert!(!resolution.history_complete);
        assert_eq!(git.count("fetch-all"), 1);
    }

    fn config() -> VendorConfig {
        crate::config::parse(&format!(
            r#"
vendors:
  - name: lib
    url: {URL}
    specs:
      - ref: main
        mapping: [{{ from: f, to: vendor/lib/f }}]
  - name: down
    url: https://example.com/down.git
    specs:
      - ref: main
        mapping: [{{ from: f, to: vendor/down/f }}]
"#
        ))
        .unwrap()
    }

    #[test]
    fn test_check_all_isolates_failures_and_keeps_order() {
        let git = Arc::new(FakeGit::new());
        history(&git, &["c1", "c2"]);
        git.add_commit("https://example.com/down.git", "d1", &[("f", "d")]);
        git.fail_url("https://example.com/down.git");

        let mut lock = VendorLock::default();
        lock.upsert(LockDetails::new("lib", "main", "c1"));
        let before = lock.clone();

        let report = checker(&git, 10)
            .check_all(&config(), &lock, None, None, 4)
            .unwrap();
        assert_eq!(lock, before);
        assert_eq!(report.refs.len(), 2);
        assert_eq!(report.refs[0].vendor, "lib");
        assert_eq!(report.refs[0].status(), UpdateStatus::UpdateAvailable);
        assert_eq!(report.refs[1].status(), UpdateStatus::Failed);
        assert!(report.has_failures());
        assert!(!report.all_current());
    }

    #[test]
    fn test_all_current_only_when_every_ref_matches() {
        let git = Arc::new(FakeGit::new());
        history(&git, &["c1"]);
        git.add_commit("https://example.com/down.git", "d1", &[("f", "d")]);

        let mut lock = VendorLock::default();
        lock.upsert(LockDetails::new("lib", "main", "c1"));
        let report = checker(&git, 10)
            .check_all(&config(), &lock, None, None, 2)
            .unwrap();
        assert_eq!(report.refs[1].status(), UpdateStatus::NotLocked);
        assert!(!report.all_current());

        lock.upsert(LockDetails::new("down", "main", "d1"));
        let report = checker(&git, 10)
            .check_all(&config(), &lock, None, None, 2)
            .unwrap();
        assert!(report.all_current());
        assert_eq!(report.pending().count(), 0);
    }

    #[test]
    fn test_apply_updates_rewrites_pending_only() {
        let git = Arc::new(FakeGit::new());
        history(&git, &["c1", "c2"]);
        git.add_commit("https://example.com/down.git", "d1", &[("f", "d")]);

        let mut lock = VendorLock::default();
        let mut lib = LockDetails::new("lib", "main", "c1");
        lib.license_path = ".git-vendor/licenses/lib.txt".to_string();
        lock.upsert(lib);

        let report = checker(&git, 10)
            .check_all(&config(), &lock, None, None, 2)
            .unwrap();
        let updated = apply_updates(&report, &mut lock);

        assert_eq!(updated.len(), 2);
        let lib = lock.get("lib", "main").unwrap();
        assert_eq!(lib.commit_hash, "c2");
        assert_eq!(lib.license_path, ".git-vendor/licenses/lib.txt");
        assert_eq!(lock.get("down", "main").unwrap().commit_hash, "d1");
    }
}
