//! Local file operations: subtree copy, checksums and scoped temp directories

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Prefix for all checksums produced by this module
const PREFIX: &str = "sha256:";

/// File operations consumed by the sync engine.
pub trait FileCapability: Send + Sync {
    /// Replace `dest` with a copy of `src` (a file or a directory tree).
    ///
    /// Only `dest` itself is touched; siblings are left alone. `.git`
    /// directories inside `src` are never copied. Returns the copied files as
    /// paths relative to `dest` (a single empty path when `src` is a file).
    fn copy(&self, src: &Path, dest: &Path) -> Result<Vec<PathBuf>>;

    /// SHA-256 of a file, or of a whole directory tree.
    fn checksum(&self, path: &Path) -> Result<String>;

    /// SHA-256 of every file at `path`, keyed by path relative to `path`.
    /// A plain file yields one entry under the empty key.
    fn file_checksums(&self, path: &Path) -> Result<BTreeMap<String, String>>;

    fn exists(&self, path: &Path) -> bool;

    /// A temporary directory removed when the guard drops, on every exit path.
    fn temp_dir(&self, prefix: &str) -> Result<TempDir>;
}

/// [`FileCapability`] over the host filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalFs;

impl FileCapability for LocalFs {
    fn copy(&self, src: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
        let meta = fs::symlink_metadata(src).map_err(|e| Error::Filesystem {
            message: format!("Source path '{}' not found: {}", src.display(), e),
        })?;

        remove_existing(dest)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Filesystem {
                message: format!("Failed to create directory '{}': {}", parent.display(), e),
            })?;
        }

        if !meta.is_dir() {
            copy_entry(src, dest, &meta)?;
            return Ok(vec![PathBuf::new()]);
        }

        let mut copied = Vec::new();
        let walker = WalkDir::new(src)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");
        for entry in walker {
            let entry = entry.map_err(|e| Error::Filesystem {
                message: format!("Failed to walk '{}': {}", src.display(), e),
            })?;
            let relative = entry
                .path()
                .strip_prefix(src)
                .map_err(|e| Error::Filesystem {
                    message: e.to_string(),
                })?
                .to_path_buf();
            let target = dest.join(&relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            let meta = entry.path().symlink_metadata()?;
            copy_entry(entry.path(), &target, &meta)?;
            copied.push(relative);
        }
        Ok(copied)
    }

    fn checksum(&self, path: &Path) -> Result<String> {
        let meta = fs::metadata(path).map_err(|e| Error::Filesystem {
            message: format!("Cannot checksum '{}': {}", path.display(), e),
        })?;
        if meta.is_dir() {
            compute_tree_checksum(path)
        } else {
            Ok(compute_file_checksum(path)?)
        }
    }

    fn file_checksums(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        let meta = fs::metadata(path).map_err(|e| Error::Filesystem {
            message: format!("Cannot checksum '{}': {}", path.display(), e),
        })?;
        if meta.is_dir() {
            compute_file_checksums(path)
        } else {
            Ok(BTreeMap::from([(String::new(), compute_file_checksum(path)?)]))
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.symlink_metadata().is_ok()
    }

    fn temp_dir(&self, prefix: &str) -> Result<TempDir> {
        Ok(tempfile::Builder::new().prefix(prefix).tempdir()?)
    }
}

fn remove_existing(dest: &Path) -> Result<()> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(dest)?,
        Ok(_) => fs::remove_file(dest)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn copy_entry(src: &Path, dest: &Path, meta: &fs::Metadata) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if meta.file_type().is_symlink() {
        #[cfg(unix)]
        {
            let target = fs::read_link(src)?;
            std::os::unix::fs::symlink(target, dest)?;
            return Ok(());
        }
        #[cfg(not(unix))]
        {
            log::warn!("skipping symlink {}", src.display());
            return Ok(());
        }
    }
    // fs::copy carries the permission bits over, so executables stay executable.
    fs::copy(src, dest).map_err(|e| Error::Filesystem {
        message: format!(
            "Failed to copy '{}' to '{}': {}",
            src.display(),
            dest.display(),
            e
        ),
    })?;
    Ok(())
}

/// Compute the SHA-256 checksum of a file's contents.
///
/// Returns a string in the canonical format `"sha256:<hex>"`.
pub fn compute_file_checksum(path: &Path) -> io::Result<String> {
    let content = fs::read(path)?;
    Ok(compute_bytes_checksum(&content))
}

/// Compute the SHA-256 checksum of in-memory content.
pub fn compute_bytes_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// Checksum of every file in a directory tree, keyed by `/`-separated path
/// relative to `root`. Symlinks are hashed by their target text and `.git`
/// directories are skipped.
pub fn compute_file_checksums(root: &Path) -> Result<BTreeMap<String, String>> {
    let mut checksums = BTreeMap::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    for entry in walker {
        let entry = entry.map_err(|e| Error::Filesystem {
            message: format!("Failed to walk '{}': {}", root.display(), e),
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| Error::Filesystem {
                message: e.to_string(),
            })?
            .to_string_lossy()
            .replace('\\', "/");
        let content_hash = if entry.file_type().is_symlink() {
            compute_bytes_checksum(fs::read_link(entry.path())?.to_string_lossy().as_bytes())
        } else {
            compute_file_checksum(entry.path())?
        };
        checksums.insert(relative, content_hash);
    }
    Ok(checksums)
}

/// Checksum of a directory tree.
///
/// Hashes every file's relative path and content checksum in sorted order, so
/// the result changes on any add, remove, rename or content edit and is
/// stable across platforms and walk orders.
pub fn compute_tree_checksum(root: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    for (relative, content_hash) in compute_file_checksums(root)? {
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update(content_hash.as_bytes());
        hasher.update([b'\n']);
    }
    Ok(format!("{}{:x}", PREFIX, hasher.finalize()))
}
