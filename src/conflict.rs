//! # Destination Conflict Validation
//!
//! Static analysis over the declared path mappings, run to completion before
//! any clone or copy. Vendors are later synchronized in parallel, and the
//! engine relies on their destinations being disjoint; this module is the
//! gate that guarantees it.
//!
//! Two destinations conflict when their normalized forms are identical. A
//! directory and a file inside it are *not* reported; only exact matches are.
//! Every destination is also re-checked against the traversal-safety rules in
//! [`crate::path::validate_destination`], independently of config parsing.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::VendorConfig;
use crate::error::{Error, Result};
use crate::path::validate_destination;

/// One mapping's claim on a destination path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DestinationClaim {
    pub vendor: String,
    pub r#ref: String,
    pub source: String,
    /// Destination as declared (or derived from the default target).
    pub destination: String,
}

impl DestinationClaim {
    pub fn new(vendor: &str, r#ref: &str, source: &str, destination: &str) -> Self {
        Self {
            vendor: vendor.to_string(),
            r#ref: r#ref.to_string(),
            source: source.to_string(),
            destination: destination.to_string(),
        }
    }
}

/// A destination claimed by more than one mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Normalized destination path.
    pub destination: String,
    /// Every claim on it, sorted by vendor, ref and source.
    pub claims: Vec<DestinationClaim>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let owners = self
            .claims
            .iter()
            .map(|c| format!("{}:{}", c.vendor, c.source))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{} <- {}", self.destination, owners)
    }
}

/// Expand a configuration into every (vendor, destination) claim.
///
/// Mappings with no resolvable destination are skipped here; config
/// validation reports them.
pub fn expand_claims(config: &VendorConfig) -> Vec<DestinationClaim> {
    let mut claims = Vec::new();
    for vendor in &config.vendors {
        for spec in &vendor.specs {
            for mapping in &spec.mapping {
                if let Some(destination) = spec.destination(mapping) {
                    claims.push(DestinationClaim::new(
                        &vendor.name,
                        &spec.r#ref,
                        &mapping.from,
                        &destination,
                    ));
                }
            }
        }
    }
    claims
}

/// Find every destination claimed more than once.
///
/// Fails fast with [`Error::UnsafePath`] on the first destination that is
/// absolute or contains `..`. The result does not depend on input order.
pub fn find_conflicts(claims: &[DestinationClaim]) -> Result<Vec<Conflict>> {
    let mut by_destination: BTreeMap<String, Vec<DestinationClaim>> = BTreeMap::new();
    for claim in claims {
        let normalized = validate_destination(&claim.vendor, &claim.destination)?;
        by_destination
            .entry(normalized)
            .or_default()
            .push(claim.clone());
    }

    Ok(by_destination
        .into_iter()
        .filter(|(_, claims)| claims.len() > 1)
        .map(|(destination, mut claims)| {
            claims.sort();
            Conflict {
                destination,
                claims,
            }
        })
        .collect())
}

/// Validate a configuration: no unsafe paths and no collisions.
pub fn validate(config: &VendorConfig) -> Result<()> {
    let conflicts = find_conflicts(&expand_claims(config))?;
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(Error::Conflict { conflicts })
    }
}
