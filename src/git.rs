//! # Git Capability
//!
//! The engine never runs git directly. It consumes the typed operations of
//! [`GitCapability`]; [`SystemGit`] implements them over the system `git`
//! binary, which automatically handles:
//! - SSH keys from ~/.ssh/
//! - Git credential helpers
//! - Personal access tokens
//! - Any authentication configured in ~/.gitconfig
//!
//! Failures surface as [`Error::GitCommand`] with a [`GitErrorKind`] derived
//! from stderr, so callers can tell a missing object from a network failure.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::{Error, GitErrorKind, Result};

/// Default remote name used for temporary repositories.
pub const ORIGIN: &str = "origin";

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

/// One commit as reported by `git log`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    pub short_hash: String,
    pub subject: String,
    pub author: String,
    /// `YYYY-MM-DD HH:MM:SS ±ZZZZ`, as `git log --pretty=%ai` prints it.
    pub date: String,
}

/// Options for [`GitCapability::clone_repo`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOptions {
    /// Partial clone filter, e.g. `blob:none`.
    pub filter: Option<String>,
    pub no_checkout: bool,
    pub depth: Option<u32>,
    pub branch: Option<String>,
}

/// A commit message trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    pub key: String,
    pub value: String,
}

impl Trailer {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Typed git operations used by the engine.
///
/// `dir` is always the working directory of the repository operated on.
pub trait GitCapability: Send + Sync {
    fn init(&self, dir: &Path) -> Result<()>;

    fn add_remote(&self, dir: &Path, name: &str, url: &str) -> Result<()>;

    /// Fetch one ref or commit from `remote`, optionally shallow.
    fn fetch(&self, dir: &Path, remote: &str, refspec: &str, depth: Option<u32>) -> Result<()>;

    /// Fetch every branch and tag, unshallowing the repository if needed.
    fn fetch_all(&self, dir: &Path, remote: &str) -> Result<()>;

    fn checkout(&self, dir: &Path, target: &str) -> Result<()>;

    fn clone_repo(&self, url: &str, dir: &Path, options: &CloneOptions) -> Result<()>;

    /// Entry names directly under `subdir` at `rev`.
    fn list_tree(&self, dir: &Path, rev: &str, subdir: &str) -> Result<Vec<String>>;

    /// Resolve a revision (`HEAD`, `FETCH_HEAD`, a ref name) to a full hash.
    fn rev_parse(&self, dir: &Path, rev: &str) -> Result<String>;

    fn head_hash(&self, dir: &Path) -> Result<String> {
        self.rev_parse(dir, "HEAD")
    }

    /// Commits in `range`, newest first, at most `max_count`.
    fn commit_log(&self, dir: &Path, range: &str, max_count: usize) -> Result<Vec<CommitInfo>>;

    /// Tags on `remote` pointing at `commit`, in the order the remote lists them.
    fn tags_at(&self, dir: &Path, remote: &str, commit: &str) -> Result<Vec<String>>;

    /// Stage `paths` and commit them with `subject` and `trailers`.
    fn commit(&self, dir: &Path, paths: &[String], subject: &str, trailers: &[Trailer])
        -> Result<()>;

    /// Attach (or replace) a note on `commit` under `notes_ref`.
    fn attach_note(&self, dir: &Path, notes_ref: &str, commit: &str, body: &str) -> Result<()>;

    /// Display string for the configured user, never failing.
    fn current_user_identity(&self, dir: &Path) -> String;
}

/// [`GitCapability`] backed by the system `git` binary.
#[derive(Debug, Clone, Default)]
pub struct SystemGit {
    verbose: bool,
    cancel: CancelToken,
}

impl SystemGit {
    pub fn new(verbose: bool, cancel: CancelToken) -> Self {
        Self { verbose, cancel }
    }

    /// Run git and return trimmed stdout.
    fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<String> {
        self.cancel.check()?;
        let display = args.join(" ");
        if self.verbose {
            log::info!("git {}", display);
        } else {
            log::debug!("git {}", display);
        }

        let mut command = Command::new("git");
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| Error::GitCommand {
            command: display.clone(),
            stderr: format!("failed to run git: {}", e),
            kind: GitErrorKind::Other,
        })?;

        let stdout = drain(&mut child, true);
        let stderr = drain(&mut child, false);

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if self.cancel.is_cancelled() {
                log::debug!("cancelling git {}", display);
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Cancelled);
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            return Err(Error::GitCommand {
                kind: GitErrorKind::classify(&stderr),
                command: display,
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    fn config_value(&self, dir: &Path, key: &str) -> Option<String> {
        self.run(Some(dir), &["config", "--get", key])
            .ok()
            .filter(|v| !v.is_empty())
    }
}

/// Read a child pipe to completion on a helper thread so a chatty git never
/// blocks on a full pipe while we poll for exit.
fn drain(child: &mut Child, stdout: bool) -> thread::JoinHandle<Vec<u8>> {
    let pipe: Option<Box<dyn Read + Send>> = if stdout {
        child.stdout.take().map(|p| Box::new(p) as Box<dyn Read + Send>)
    } else {
        child.stderr.take().map(|p| Box::new(p) as Box<dyn Read + Send>)
    };
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

impl GitCapability for SystemGit {
    fn init(&self, dir: &Path) -> Result<()> {
        self.run(Some(dir), &["init", "-q"]).map(|_| ())
    }

    fn add_remote(&self, dir: &Path, name: &str, url: &str) -> Result<()> {
        self.run(Some(dir), &["remote", "add", name, url]).map(|_| ())
    }

    fn fetch(&self, dir: &Path, remote: &str, refspec: &str, depth: Option<u32>) -> Result<()> {
        let depth_arg = depth.map(|d| format!("--depth={}", d));
        let mut args = vec!["fetch", "-q", "--no-tags"];
        if let Some(depth_arg) = depth_arg.as_deref() {
            args.push(depth_arg);
        }
        args.extend([remote, refspec]);
        self.run(Some(dir), &args).map(|_| ())
    }

    fn fetch_all(&self, dir: &Path, remote: &str) -> Result<()> {
        let shallow = self.run(Some(dir), &["rev-parse", "--is-shallow-repository"])?;
        let mut args = vec!["fetch", "-q", "--tags"];
        if shallow == "true" {
            args.push("--unshallow");
        }
        let refspec = format!("+refs/heads/*:refs/remotes/{}/*", remote);
        args.extend([remote, refspec.as_str()]);
        self.run(Some(dir), &args).map(|_| ())
    }

    fn checkout(&self, dir: &Path, target: &str) -> Result<()> {
        self.run(
            Some(dir),
            &["-c", "advice.detachedHead=false", "checkout", "-q", "--force", target],
        )
        .map(|_| ())
    }

    fn clone_repo(&self, url: &str, dir: &Path, options: &CloneOptions) -> Result<()> {
        let mut args: Vec<String> = vec!["clone".into(), "-q".into()];
        if let Some(filter) = &options.filter {
            args.push(format!("--filter={}", filter));
        }
        if options.no_checkout {
            args.push("--no-checkout".into());
        }
        if let Some(depth) = options.depth {
            args.push(format!("--depth={}", depth));
        }
        if let Some(branch) = &options.branch {
            args.push("--branch".into());
            args.push(branch.clone());
        }
        args.push(url.to_string());
        args.push(dir.to_string_lossy().into_owned());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(None, &arg_refs).map(|_| ()).map_err(|e| match e {
            Error::GitCommand { stderr, kind, .. } => Error::GitClone {
                url: url.to_string(),
                r#ref: options.branch.clone().unwrap_or_else(|| "HEAD".to_string()),
                hint: clone_hint(kind),
                message: stderr,
            },
            other => other,
        })
    }

    fn list_tree(&self, dir: &Path, rev: &str, subdir: &str) -> Result<Vec<String>> {
        let subdir = subdir.trim_matches('/');
        let pathspec = if subdir.is_empty() {
            String::new()
        } else {
            format!("{}/", subdir)
        };
        let mut args = vec!["ls-tree", "--name-only", rev];
        if !pathspec.is_empty() {
            args.extend(["--", pathspec.as_str()]);
        }
        let output = self.run(Some(dir), &args)?;
        Ok(output
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.rsplit('/').next().unwrap_or(l).to_string())
            .collect())
    }

    fn rev_parse(&self, dir: &Path, rev: &str) -> Result<String> {
        self.run(Some(dir), &["rev-parse", "--verify", &format!("{}^{{commit}}", rev)])
    }

    fn commit_log(&self, dir: &Path, range: &str, max_count: usize) -> Result<Vec<CommitInfo>> {
        let max = format!("--max-count={}", max_count);
        let format = format!(
            "--pretty=format:%H{f}%h{f}%s{f}%an{f}%ai{r}",
            f = FIELD_SEP,
            r = RECORD_SEP
        );
        let output = self.run(Some(dir), &["log", &max, &format, range, "--"])?;
        Ok(parse_log(&output))
    }

    fn tags_at(&self, dir: &Path, remote: &str, commit: &str) -> Result<Vec<String>> {
        let output = self.run(Some(dir), &["ls-remote", "--tags", remote])?;
        Ok(parse_tags_at(&output, commit))
    }

    fn commit(
        &self,
        dir: &Path,
        paths: &[String],
        subject: &str,
        trailers: &[Trailer],
    ) -> Result<()> {
        let mut add_args = vec!["add", "-A", "--"];
        add_args.extend(paths.iter().map(String::as_str));
        self.run(Some(dir), &add_args)?;

        let body = format_trailers(trailers);
        let mut commit_args = vec!["commit", "-q", "-m", subject];
        if !body.is_empty() {
            commit_args.extend(["-m", body.as_str()]);
        }
        self.run(Some(dir), &commit_args)
            .map(|_| ())
            .map_err(|e| Error::Commit {
                message: e.to_string(),
            })
    }

    fn attach_note(&self, dir: &Path, notes_ref: &str, commit: &str, body: &str) -> Result<()> {
        let ref_arg = format!("--ref={}", notes_ref);
        self.run(Some(dir), &["notes", &ref_arg, "add", "-f", "-m", body, commit])
            .map(|_| ())
            .map_err(|e| Error::NoteAttachment {
                commit: commit.to_string(),
                message: e.to_string(),
            })
    }

    fn current_user_identity(&self, dir: &Path) -> String {
        identity_from(
            self.config_value(dir, "user.name"),
            self.config_value(dir, "user.email"),
        )
    }
}

fn clone_hint(kind: GitErrorKind) -> Option<String> {
    match kind {
        GitErrorKind::Authentication => Some(
            "Make sure you have access to the repository: an SSH key in ssh-agent, \
             configured git credentials, or a personal access token"
                .to_string(),
        ),
        GitErrorKind::Network => Some("Check the URL and your network connection".to_string()),
        _ => None,
    }
}

/// Render trailers as `Key: value` lines.
pub fn format_trailers(trailers: &[Trailer]) -> String {
    trailers
        .iter()
        .map(|t| format!("{}: {}", t.key, t.value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build a display identity from whatever of name/email is configured.
pub fn identity_from(name: Option<String>, email: Option<String>) -> String {
    match (name, email) {
        (Some(name), Some(email)) => format!("{} <{}>", name, email),
        (Some(name), None) => name,
        (None, Some(email)) => format!("<{}>", email),
        (None, None) => "unknown".to_string(),
    }
}

fn parse_log(output: &str) -> Vec<CommitInfo> {
    output
        .split(RECORD_SEP)
        .map(str::trim)
        .filter(|record| !record.is_empty())
        .filter_map(|record| {
            let fields: Vec<&str> = record.split(FIELD_SEP).collect();
            match fields.as_slice() {
                [hash, short_hash, subject, author, date] => Some(CommitInfo {
                    hash: hash.to_string(),
                    short_hash: short_hash.to_string(),
                    subject: subject.to_string(),
                    author: author.to_string(),
                    date: date.to_string(),
                }),
                _ => {
                    log::warn!("skipping malformed git log record: {:?}", record);
                    None
                }
            }
        })
        .collect()
}

/// Tags from `git ls-remote --tags` output that point at `commit`.
///
/// Annotated tags appear twice, once as the tag object and once peeled
/// (`refs/tags/x^{}`) to the commit; either form matching counts once.
fn parse_tags_at(output: &str, commit: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for line in output.lines() {
        let Some((hash, reference)) = line.split_once('\t') else {
            continue;
        };
        if hash.trim() != commit {
            continue;
        }
        let Some(tag) = reference.strip_prefix("refs/tags/") else {
            continue;
        };
        let tag = tag.strip_suffix("^{}").unwrap_or(tag).to_string();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}
