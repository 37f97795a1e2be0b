//! Path utilities for vendored destinations

use std::path::{Component, Path};

use crate::error::{Error, Result};

/// Normalize a destination path to its canonical textual form.
///
/// Backslashes become forward slashes, `.` segments and empty segments are
/// dropped, and leading/trailing separators are removed. No filesystem access
/// happens here; two destinations are the same destination exactly when their
/// normalized forms are byte-identical.
pub fn normalize_destination(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Check that a destination stays inside the project root.
///
/// Rejects absolute paths (including Windows drive and UNC forms, whichever
/// platform we run on), any `..` segment, and paths that normalize to nothing.
/// Returns the normalized destination on success.
pub fn validate_destination(vendor: &str, path: &str) -> Result<String> {
    confine(path, "project root").map_err(|reason| Error::UnsafePath {
        vendor: vendor.to_string(),
        path: path.to_string(),
        reason,
    })
}

/// Check that a mapping source stays inside the checked-out tree.
///
/// Same rules as [`validate_destination`], applied to the `from` side of a
/// mapping. Returns the normalized source on success.
pub fn validate_source(vendor: &str, path: &str) -> Result<String> {
    confine(path, "repository root").map_err(|reason| Error::UnsafePath {
        vendor: vendor.to_string(),
        path: path.to_string(),
        reason: format!("source {}", reason),
    })
}

fn confine(path: &str, root: &str) -> std::result::Result<String, String> {
    let unified = path.replace('\\', "/");
    if unified.starts_with('/') || has_drive_prefix(&unified) || Path::new(path).is_absolute() {
        return Err("absolute paths are not allowed".to_string());
    }
    if unified.split('/').any(|segment| segment == "..") {
        return Err("parent directory segments ('..') are not allowed".to_string());
    }
    if Path::new(path)
        .components()
        .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    {
        return Err("absolute paths are not allowed".to_string());
    }

    let normalized = normalize_destination(path);
    if normalized.is_empty() {
        return Err(format!("path resolves to the {}", root));
    }
    Ok(normalized)
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Encode an arbitrary string to be a single filesystem-safe path component
///
/// Used to derive cache file names from vendor names and refs, which may
/// contain slashes (`feature/x`) or other characters that are unsafe in file
/// names. ASCII letters, digits, `.`, `-` and `_` pass through; every other
/// byte becomes `%XX`, so distinct inputs always give distinct outputs.
pub fn encode_path_component(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'-' | b'_' => {
                encoded.push(char::from(byte))
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// Project-relative path of `relative` under `destination`. An empty
/// `relative` names the destination itself.
pub fn join_destination(destination: &str, relative: &str) -> String {
    if relative.is_empty() {
        destination.to_string()
    } else {
        format!("{}/{}", destination, relative)
    }
}

/// Last path segment of a source path inside the remote tree.
pub fn source_basename(source: &str) -> Option<&str> {
    source
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
}
