//! # Vendor Configuration
//!
//! This module defines the declarative configuration stored in
//! `.git-vendor/vendor.yml` and the logic for parsing and validating it.
//!
//! ## Key Components
//!
//! - **`VendorConfig`**: the ordered list of vendors. Order is significant: it
//!   is the order vendors appear in commit trailers and reports.
//! - **`VendorSpec`**: one remote repository, with its license, group labels
//!   and the refs it tracks.
//! - **`RefSpec`**: one tracked ref with its path mappings. A vendor may track
//!   several refs at once; each is materialized independently.
//! - **`PathMapping`**: a `from` path inside the remote tree and a `to` path
//!   relative to the project root.
//!
//! ## Validation
//!
//! `parse` performs structural validation only: unique vendor names, a
//! non-empty URL, at least one ref per vendor and one mapping per ref, a
//! resolvable destination for every mapping, and a `from` path that stays
//! inside the checked-out tree. Destination *safety* and
//! cross-vendor collisions are checked separately by [`crate::conflict`],
//! which every command runs before touching the filesystem.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path::{normalize_destination, source_basename};

/// The full vendor configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorConfig {
    #[serde(default)]
    pub vendors: Vec<VendorSpec>,
}

/// A named remote dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorSpec {
    /// Unique, case-sensitive vendor name.
    pub name: String,
    /// Git URL of the remote repository.
    pub url: String,
    /// SPDX license identifier, empty when unknown.
    #[serde(default)]
    pub license: String,
    /// Group labels used by `--group` filtering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    /// Refs tracked for this vendor.
    #[serde(default)]
    pub specs: Vec<RefSpec>,
}

/// One tracked ref of a vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefSpec {
    /// Branch, tag or commit to track.
    pub r#ref: String,
    /// Directory used for mappings that leave `to` empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_target: Option<String>,
    #[serde(default)]
    pub mapping: Vec<PathMapping>,
}

/// A source path inside the remote tree and where it lands locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    pub from: String,
    #[serde(default)]
    pub to: String,
}

impl VendorConfig {
    /// Find a vendor by exact name.
    pub fn vendor(&self, name: &str) -> Option<&VendorSpec> {
        self.vendors.iter().find(|v| v.name == name)
    }

    /// Number of (vendor, ref) pairs across the configuration.
    pub fn ref_count(&self) -> usize {
        self.vendors.iter().map(|v| v.specs.len()).sum()
    }

    /// Check the structural invariants of the configuration.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for vendor in &self.vendors {
            if vendor.name.trim().is_empty() {
                return Err(Error::Config {
                    message: "vendor with an empty name".to_string(),
                    hint: Some("Every vendor needs a unique 'name:'".to_string()),
                });
            }
            if !names.insert(vendor.name.as_str()) {
                return Err(Error::Config {
                    message: format!("duplicate vendor name '{}'", vendor.name),
                    hint: Some("Vendor names must be unique (case-sensitive)".to_string()),
                });
            }
            if vendor.url.trim().is_empty() {
                return Err(Error::Config {
                    message: format!("vendor '{}' has no url", vendor.name),
                    hint: Some("Add 'url:' to the vendor entry".to_string()),
                });
            }
            if vendor.specs.is_empty() {
                return Err(Error::Config {
                    message: format!("vendor '{}' tracks no refs", vendor.name),
                    hint: Some("Add at least one entry under 'specs:'".to_string()),
                });
            }
            let mut refs = HashSet::new();
            for spec in &vendor.specs {
                if spec.r#ref.trim().is_empty() {
                    return Err(Error::config(format!(
                        "vendor '{}' has a spec with an empty ref",
                        vendor.name
                    )));
                }
                if !refs.insert(spec.r#ref.as_str()) {
                    return Err(Error::config(format!(
                        "vendor '{}' tracks ref '{}' twice",
                        vendor.name, spec.r#ref
                    )));
                }
                if spec.mapping.is_empty() {
                    return Err(Error::Config {
                        message: format!(
                            "vendor '{}' ref '{}' has no path mappings",
                            vendor.name, spec.r#ref
                        ),
                        hint: Some("Add 'mapping:' entries with 'from:' and 'to:'".to_string()),
                    });
                }
                for mapping in &spec.mapping {
                    crate::path::validate_source(&vendor.name, &mapping.from)?;
                    spec.destination(mapping).ok_or_else(|| Error::Config {
                        message: format!(
                            "vendor '{}' mapping '{}' has no destination",
                            vendor.name, mapping.from
                        ),
                        hint: Some("Set 'to:' or a 'default_target:' on the spec".to_string()),
                    })?;
                }
            }
        }
        Ok(())
    }
}

impl VendorSpec {
    /// Whether this vendor carries the given group label.
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    /// Find the spec tracking `ref_name`.
    pub fn spec(&self, ref_name: &str) -> Option<&RefSpec> {
        self.specs.iter().find(|s| s.r#ref == ref_name)
    }
}

impl RefSpec {
    /// Resolve the destination of a mapping, before safety validation.
    ///
    /// An explicit `to` wins. Otherwise the mapping lands in
    /// `default_target/<basename of from>`.
    pub fn destination(&self, mapping: &PathMapping) -> Option<String> {
        if !mapping.to.trim().is_empty() {
            return Some(mapping.to.clone());
        }
        let target = self.default_target.as_deref()?;
        let base = source_basename(&mapping.from)?;
        Some(normalize_destination(&format!("{}/{}", target, base)))
    }
}

/// Parse and validate configuration YAML.
pub fn parse(yaml: &str) -> Result<VendorConfig> {
    let config: VendorConfig = serde_yaml::from_str(yaml).map_err(|e| Error::Config {
        message: e.to_string(),
        hint: Some("Check the YAML syntax of vendor.yml".to_string()),
    })?;
    config.validate()?;
    Ok(config)
}

/// Read and parse a configuration file.
pub fn from_file(path: &Path) -> Result<VendorConfig> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

/// Serialize a configuration to YAML.
pub fn to_yaml(config: &VendorConfig) -> Result<String> {
    Ok(serde_yaml::to_string(config)?)
}
