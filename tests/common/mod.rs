//! Shared test utilities for integration and E2E tests.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_config(configs::TWO_VENDORS);
//!     fixture.command().arg("validate").assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::configs;
    #[allow(unused_imports)]
    pub use super::{git, SourceRepo};
    pub use super::TestFixture;
}

/// Common configuration YAML snippets for testing.
#[allow(dead_code)]
pub mod configs {
    /// Two vendors writing to separate destinations.
    pub const TWO_VENDORS: &str = r#"
vendors:
  - name: alpha
    url: https://example.invalid/alpha.git
    license: MIT
    groups: [core]
    specs:
      - ref: main
        mapping:
          - from: src
            to: vendor/alpha
  - name: beta
    url: https://example.invalid/beta.git
    specs:
      - ref: v1
        default_target: vendor/beta
        mapping:
          - from: lib/beta.rs
"#;

    /// Two vendors claiming the same destination.
    pub const CONFLICTING: &str = r#"
vendors:
  - name: alpha
    url: https://example.invalid/alpha.git
    specs:
      - ref: main
        mapping:
          - from: src
            to: vendor/shared
  - name: beta
    url: https://example.invalid/beta.git
    specs:
      - ref: main
        mapping:
          - from: lib
            to: vendor/shared/
"#;

    /// A destination escaping the project root.
    pub const UNSAFE_PATH: &str = r#"
vendors:
  - name: alpha
    url: https://example.invalid/alpha.git
    specs:
      - ref: main
        mapping:
          - from: src
            to: ../outside
"#;

    /// The same vendor name twice.
    pub const DUPLICATE_NAMES: &str = r#"
vendors:
  - name: alpha
    url: https://example.invalid/a.git
    specs: [{ ref: main, mapping: [{ from: a, to: vendor/a }] }]
  - name: alpha
    url: https://example.invalid/b.git
    specs: [{ ref: main, mapping: [{ from: b, to: vendor/b }] }]
"#;

    /// Invalid YAML for error testing.
    pub const INVALID_YAML: &str = "vendors: [ name: : :";

    /// Lock pinning both refs of [`TWO_VENDORS`].
    pub const TWO_VENDORS_LOCK: &str = r#"
vendors:
  - name: alpha
    ref: main
    commit_hash: 1111111111111111111111111111111111111111
    updated: 2026-01-01T00:00:00Z
  - name: beta
    ref: v1
    commit_hash: 2222222222222222222222222222222222222222
    updated: 2026-01-01T00:00:00Z
"#;
}

/// A temporary project directory with optional `.git-vendor/` state.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Write `.git-vendor/vendor.yml` with the given content.
    pub fn with_config(self, content: &str) -> Self {
        self.temp_dir
            .child(".git-vendor/vendor.yml")
            .write_str(content)
            .expect("Failed to write config file");
        self
    }

    /// Write `.git-vendor/vendor.lock` with the given content.
    pub fn with_lock(self, content: &str) -> Self {
        self.temp_dir
            .child(".git-vendor/vendor.lock")
            .write_str(content)
            .expect("Failed to write lock file");
        self
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join(".git-vendor/vendor.yml")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.path().join(".git-vendor/vendor.lock")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.path().join(".git-vendor/.cache")
    }

    /// Create a child path in the temp directory.
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// Read a project file to a string.
    pub fn read(&self, path: &str) -> String {
        std::fs::read_to_string(self.path().join(path)).expect("Failed to read file")
    }

    /// Turn the project into a git repository with a first commit.
    pub fn init_git(self) -> Self {
        git(self.path(), &["init", "-q", "-b", "main"]);
        configure_identity(self.path());
        self.temp_dir
            .child("README.md")
            .write_str("project\n")
            .expect("Failed to write README");
        git(self.path(), &["add", "-A"]);
        git(self.path(), &["commit", "-q", "-m", "initial"]);
        self
    }

    /// Create a command configured to run in this fixture's directory with
    /// plain output.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("git-vendor");
        cmd.current_dir(self.path())
            .env_remove("GIT_VENDOR_ROOT")
            .env_remove("GIT_VENDOR_JOBS")
            .env("NO_COLOR", "1");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Run git in `dir`, panicking on failure, and return trimmed stdout.
#[allow(dead_code)]
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn configure_identity(dir: &Path) {
    git(dir, &["config", "user.name", "Test User"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

/// A local upstream repository served over `file://`.
#[allow(dead_code)]
pub struct SourceRepo {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl SourceRepo {
    pub fn new() -> Self {
        let temp_dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        git(temp_dir.path(), &["init", "-q", "-b", "main"]);
        configure_identity(temp_dir.path());
        // Needed for partial clones and fetching locked commits by hash.
        git(temp_dir.path(), &["config", "uploadpack.allowFilter", "true"]);
        git(temp_dir.path(), &["config", "uploadpack.allowAnySHA1InWant", "true"]);
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.path().display())
    }

    /// Write `files` and commit them on the current branch. Returns the new
    /// commit hash.
    pub fn commit(&self, message: &str, files: &[(&str, &str)]) -> String {
        for (path, content) in files {
            self.temp_dir
                .child(path)
                .write_str(content)
                .expect("Failed to write source file");
        }
        git(self.path(), &["add", "-A"]);
        git(self.path(), &["commit", "-q", "-m", message]);
        self.head()
    }

    pub fn tag(&self, name: &str) {
        git(self.path(), &["tag", name]);
    }

    pub fn head(&self) -> String {
        git(self.path(), &["rev-parse", "HEAD"])
    }
}

impl Default for SourceRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_with_config() {
        let fixture = TestFixture::new().with_config(configs::TWO_VENDORS);
        assert!(fixture.config_path().exists());
    }

    #[test]
    fn test_configs_are_valid_yaml() {
        let configs = [
            configs::TWO_VENDORS,
            configs::CONFLICTING,
            configs::UNSAFE_PATH,
            configs::DUPLICATE_NAMES,
            configs::TWO_VENDORS_LOCK,
        ];

        for config in configs {
            serde_yaml::from_str::<serde_yaml::Value>(config).expect("Config should be valid YAML");
        }
    }

    #[test]
    fn test_invalid_yaml_is_actually_invalid() {
        let result = serde_yaml::from_str::<serde_yaml::Value>(configs::INVALID_YAML);
        assert!(result.is_err(), "INVALID_YAML should not parse");
    }
}
