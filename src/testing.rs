//! In-crate fakes for engine tests
//!
//! [`FakeGit`] models remotes as linear commit histories whose trees are
//! fixture directories. "Cloning" creates an empty directory, "checkout"
//! copies the commit's fixture tree into it. Every call is recorded so tests
//! can count clones and checkouts.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempDir;

use crate::error::{Error, GitErrorKind, Result};
use crate::filesystem::{FileCapability, LocalFs};
use crate::git::{CloneOptions, CommitInfo, GitCapability, Trailer};

#[derive(Debug, Default)]
struct FakeRemote {
    /// Oldest first.
    commits: Vec<String>,
    branches: HashMap<String, String>,
    tags: Vec<(String, String)>,
}

/// A commit recorded by [`FakeGit::commit`].
#[derive(Debug, Clone)]
pub struct CommitCall {
    pub hash: String,
    pub paths: Vec<String>,
    pub subject: String,
    pub trailers: Vec<Trailer>,
}

#[derive(Debug, Default)]
struct State {
    remotes: HashMap<String, FakeRemote>,
    trees: HashMap<String, PathBuf>,
    /// Working dir -> remote url.
    dirs: HashMap<PathBuf, String>,
    fetch_heads: HashMap<PathBuf, String>,
    heads: HashMap<PathBuf, String>,
    fetched: HashSet<(PathBuf, String)>,
    /// History depth fetched into each working dir; absent means complete.
    depths: HashMap<PathBuf, u32>,
    calls: Vec<String>,
    commits: Vec<CommitCall>,
    notes: Vec<(String, String, String)>,
    failing_urls: HashSet<String>,
    shallow_clones: bool,
    fail_notes: bool,
    fail_commit: bool,
}

/// What `git log A..B` prints when `A` is not in the object database.
fn invalid_range(range: &str) -> Error {
    let stderr = format!("fatal: Invalid revision range {}", range);
    Error::GitCommand {
        command: "log".to_string(),
        kind: GitErrorKind::classify(&stderr),
        stderr,
    }
}

pub struct FakeGit {
    fixtures: TempDir,
    state: Mutex<State>,
}

fn missing(command: &str, what: &str) -> Error {
    Error::GitCommand {
        command: command.to_string(),
        stderr: format!("fatal: reference is not a tree: {}", what),
        kind: GitErrorKind::MissingObject,
    }
}

impl FakeGit {
    pub fn new() -> Self {
        Self {
            fixtures: TempDir::new().unwrap(),
            state: Mutex::new(State::default()),
        }
    }

    /// Append a commit to `url`'s `main` branch with the given files.
    pub fn add_commit(&self, url: &str, hash: &str, files: &[(&str, &str)]) {
        self.add_commit_on(url, "main", hash, files);
    }

    pub fn add_commit_on(&self, url: &str, branch: &str, hash: &str, files: &[(&str, &str)]) {
        let tree = self.fixtures.path().join(hash);
        fs::create_dir_all(&tree).unwrap();
        for (path, content) in files {
            let file = tree.join(path);
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, content).unwrap();
        }
        let mut state = self.state.lock().unwrap();
        state.trees.insert(hash.to_string(), tree);
        let remote = state.remotes.entry(url.to_string()).or_default();
        remote.commits.push(hash.to_string());
        remote.branches.insert(branch.to_string(), hash.to_string());
    }

    pub fn add_tag(&self, url: &str, tag: &str, hash: &str) {
        let mut state = self.state.lock().unwrap();
        let remote = state.remotes.entry(url.to_string()).or_default();
        remote.tags.push((tag.to_string(), hash.to_string()));
    }

    /// Make every operation against `url` fail like an unreachable remote.
    pub fn fail_url(&self, url: &str) {
        self.state.lock().unwrap().failing_urls.insert(url.to_string());
    }

    /// Clones only hold the branch tip until a commit is fetched explicitly.
    pub fn shallow_clones(&self) {
        self.state.lock().unwrap().shallow_clones = true;
    }

    pub fn fail_notes(&self) {
        self.state.lock().unwrap().fail_notes = true;
    }

    pub fn fail_commit(&self) {
        self.state.lock().unwrap().fail_commit = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn commits(&self) -> Vec<CommitCall> {
        self.state.lock().unwrap().commits.clone()
    }

    /// Attached notes as (notes ref, commit, body).
    pub fn notes(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().notes.clone()
    }

    fn unreachable(url: &str) -> Error {
        Error::GitCommand {
            command: format!("clone {}", url),
            stderr: format!("fatal: unable to access '{}': Could not resolve host", url),
            kind: GitErrorKind::Network,
        }
    }
}

impl GitCapability for FakeGit {
    fn init(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        self.state.lock().unwrap().calls.push("init".to_string());
        Ok(())
    }

    fn add_remote(&self, dir: &Path, _name: &str, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("remote {}", url));
        state.dirs.insert(dir.to_path_buf(), url.to_string());
        Ok(())
    }

    fn fetch(&self, dir: &Path, _remote: &str, refspec: &str, depth: Option<u32>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("fetch {} {:?}", refspec, depth));
        let url = state.dirs.get(dir).cloned().unwrap_or_default();
        if state.failing_urls.contains(&url) {
            return Err(Self::unreachable(&url));
        }
        let remote = state.remotes.get(&url).ok_or_else(|| missing("fetch", refspec))?;
        let hash = match remote.branches.get(refspec) {
            Some(hash) => hash.clone(),
            None if remote.commits.iter().any(|c| c == refspec) => refspec.to_string(),
            None => match remote.tags.iter().find(|(t, _)| t == refspec) {
                Some((_, hash)) => hash.clone(),
                None => return Err(missing("fetch", refspec)),
            },
        };
        state.fetched.insert((dir.to_path_buf(), hash.clone()));
        state.fetch_heads.insert(dir.to_path_buf(), hash);
        match depth {
            Some(depth) => state.depths.insert(dir.to_path_buf(), depth),
            None => state.depths.remove(dir),
        };
        Ok(())
    }

    fn fetch_all(&self, dir: &Path, _remote: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("fetch-all".to_string());
        state.depths.remove(dir);
        let url = state.dirs.get(dir).cloned().unwrap_or_default();
        let commits = state
            .remotes
            .get(&url)
            .map(|r| r.commits.clone())
            .unwrap_or_default();
        for commit in commits {
            state.fetched.insert((dir.to_path_buf(), commit));
        }
        Ok(())
    }

    fn checkout(&self, dir: &Path, target: &str) -> Result<()> {
        let tree = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("checkout {}", target));
            let url = state.dirs.get(dir).cloned().unwrap_or_default();
            let remote = state.remotes.get(&url).ok_or_else(|| missing("checkout", target))?;
            if !remote.commits.iter().any(|c| c == target) {
                return Err(missing("checkout", target));
            }
            let is_tip = remote.branches.values().any(|h| h == target);
            let fetched = state.fetched.contains(&(dir.to_path_buf(), target.to_string()));
            if state.shallow_clones && !is_tip && !fetched {
                return Err(missing("checkout", target));
            }
            state.heads.insert(dir.to_path_buf(), target.to_string());
            state.trees[target].clone()
        };
        LocalFs.copy(&tree, dir)?;
        Ok(())
    }

    fn clone_repo(&self, url: &str, dir: &Path, _options: &CloneOptions) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("clone {}", url));
        if state.failing_urls.contains(url) || !state.remotes.contains_key(url) {
            return Err(Error::GitClone {
                url: url.to_string(),
                r#ref: "HEAD".to_string(),
                message: "Could not resolve host".to_string(),
                hint: None,
            });
        }
        fs::create_dir_all(dir)?;
        state.dirs.insert(dir.to_path_buf(), url.to_string());
        Ok(())
    }

    fn list_tree(&self, dir: &Path, _rev: &str, subdir: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(dir.join(subdir))?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    fn rev_parse(&self, dir: &Path, rev: &str) -> Result<String> {
        let state = self.state.lock().unwrap();
        let found = match rev {
            "FETCH_HEAD" => state.fetch_heads.get(dir),
            "HEAD" => state.heads.get(dir),
            _ => None,
        };
        found.cloned().ok_or_else(|| missing("rev-parse", rev))
    }

    fn commit_log(&self, dir: &Path, range: &str, max_count: usize) -> Result<Vec<CommitInfo>> {
        let state = self.state.lock().unwrap();
        let url = state.dirs.get(dir).cloned().unwrap_or_default();
        let remote = state.remotes.get(&url).ok_or_else(|| missing("log", range))?;
        let (from, to) = range.split_once("..").unwrap_or(("", range));
        let end = remote
            .commits
            .iter()
            .position(|c| c == to)
            .ok_or_else(|| missing("log", to))?;
        let shallowest = match state.depths.get(dir) {
            Some(depth) => (end + 1).saturating_sub(*depth as usize),
            None => 0,
        };
        let start = if from.is_empty() {
            shallowest
        } else {
            remote
                .commits
                .iter()
                .position(|c| c == from)
                .filter(|position| *position >= shallowest)
                .ok_or_else(|| invalid_range(range))?
                + 1
        };
        Ok(remote.commits[start.min(end + 1)..=end]
            .iter()
            .rev()
            .take(max_count)
            .map(|hash| CommitInfo {
                hash: hash.clone(),
                short_hash: crate::lock::short_hash(hash).to_string(),
                subject: format!("commit {}", hash),
                author: "Dev".to_string(),
                date: "2025-01-01 00:00:00 +0000".to_string(),
            })
            .collect())
    }

    fn tags_at(&self, dir: &Path, _remote: &str, commit: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let url = state.dirs.get(dir).cloned().unwrap_or_default();
        Ok(state
            .remotes
            .get(&url)
            .map(|r| {
                r.tags
                    .iter()
                    .filter(|(_, hash)| hash == commit)
                    .map(|(tag, _)| tag.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn commit(&self, dir: &Path, paths: &[String], subject: &str, trailers: &[Trailer]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("commit".to_string());
        if state.fail_commit {
            return Err(Error::Commit {
                message: "nothing to commit".to_string(),
            });
        }
        let hash = format!("{:040}", state.commits.len() + 1);
        state.heads.insert(dir.to_path_buf(), hash.clone());
        state.commits.push(CommitCall {
            hash,
            paths: paths.to_vec(),
            subject: subject.to_string(),
            trailers: trailers.to_vec(),
        });
        Ok(())
    }

    fn attach_note(&self, _dir: &Path, notes_ref: &str, commit: &str, body: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("note {}", commit));
        if state.fail_notes {
            return Err(Error::NoteAttachment {
                commit: commit.to_string(),
                message: "notes ref is locked".to_string(),
            });
        }
        state
            .notes
            .push((notes_ref.to_string(), commit.to_string(), body.to_string()));
        Ok(())
    }

    fn current_user_identity(&self, _dir: &Path) -> String {
        "Test User <test@example.com>".to_string()
    }
}
