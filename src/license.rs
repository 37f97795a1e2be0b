//! License identification and the per-vendor license cache
//!
//! License data is metadata only: it fills [`crate::lock::LockDetails`] and the
//! vendor note, and never influences what gets synced.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Identifier reported when no license can be determined.
pub const UNKNOWN: &str = "unknown";

/// License file names checked at the root of a checkout, in priority order.
pub const LICENSE_FILES: [&str; 4] = ["LICENSE", "LICENSE.md", "LICENSE.txt", "COPYING"];

/// Resolves the SPDX identifier of a vendored repository.
pub trait LicenseCapability: Send + Sync {
    /// SPDX id for the repository at `url`, or [`UNKNOWN`].
    ///
    /// `declared` is the license from the vendor config; `checkout` is a
    /// working tree of the repository when one is at hand.
    fn spdx_id(&self, url: &str, declared: &str, checkout: Option<&Path>) -> String;
}

/// Offline [`LicenseCapability`]: trusts the declared id, else reads the
/// license file header.
#[derive(Debug, Clone, Default)]
pub struct LocalLicense;

impl LicenseCapability for LocalLicense {
    fn spdx_id(&self, url: &str, declared: &str, checkout: Option<&Path>) -> String {
        let declared = declared.trim();
        if !declared.is_empty() {
            return declared.to_string();
        }
        let detected = checkout
            .and_then(find_license_file)
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|text| detect_spdx(&text));
        match detected {
            Some(id) => id.to_string(),
            None => {
                log::debug!("no license detected for {}", url);
                UNKNOWN.to_string()
            }
        }
    }
}

/// First license file present at the root of `checkout`.
pub fn find_license_file(checkout: &Path) -> Option<PathBuf> {
    LICENSE_FILES
        .iter()
        .map(|name| checkout.join(name))
        .find(|path| path.is_file())
}

fn patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            ("Apache-2.0", r"(?i)apache license,?\s+version 2\.0"),
            ("MPL-2.0", r"(?i)mozilla public license,?\s+version 2\.0"),
            ("GPL-3.0", r"(?i)gnu general public license\s+version 3"),
            (
                "BSD-3-Clause",
                r"(?is)redistribution and use in source and binary forms.*neither the name",
            ),
            (
                "MIT",
                r"(?i)(^|\n)\s*mit license|permission is hereby granted, free of charge",
            ),
        ]
        .into_iter()
        .filter_map(|(id, pattern)| Regex::new(pattern).ok().map(|re| (id, re)))
        .collect()
    })
}

/// Detect an SPDX id from license text.
pub fn detect_spdx(text: &str) -> Option<&'static str> {
    patterns()
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(id, _)| *id)
}
