//! Rebuild-and-diff verification
//!
//! The tree is rescanned with the same rules used to build the manifest and
//! every path is classified as added, removed or changed. Nothing is ever
//! rewritten: drift is reported, not repaired.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::manifest::{BuildOptions, Manifest, ManifestError};

/// Result of verifying an artifact tree against a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Present in the tree, absent from the manifest
    pub added: Vec<String>,

    /// Present in the manifest, absent from the tree
    pub removed: Vec<String>,

    /// Present in both with different digests
    pub changed: Vec<String>,

    /// Manifest digest as written in the manifest
    pub expected_manifest_sha256: String,

    /// Manifest digest of the fresh scan
    pub actual_manifest_sha256: String,

    /// Whether the manifest's stated digest matches its own records
    pub manifest_self_consistent: bool,
}

impl VerifyReport {
    /// Compare a fresh scan against an expected manifest
    pub fn compare(expected: &Manifest, actual: &Manifest) -> Self {
        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut changed = Vec::new();

        for (path, record) in &actual.records {
            match expected.records.get(path) {
                None => added.push(path.clone()),
                Some(prev) if prev.sha256 != record.sha256 => changed.push(path.clone()),
                Some(_) => {}
            }
        }
        for path in expected.records.keys() {
            if !actual.records.contains_key(path) {
                removed.push(path.clone());
            }
        }

        Self {
            added,
            removed,
            changed,
            expected_manifest_sha256: expected.manifest_sha256.clone(),
            actual_manifest_sha256: actual.manifest_sha256.clone(),
            manifest_self_consistent: expected.is_self_consistent(),
        }
    }

    /// True when the tree matches the manifest exactly
    pub fn is_match(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
            && self.manifest_self_consistent
    }

    /// Number of drifted paths across all three lists
    pub fn drift_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_match() {
            return write!(f, "match: manifest sha256:{}", self.actual_manifest_sha256);
        }
        writeln!(f, "mismatch: {} path(s) drifted", self.drift_count())?;
        if !self.manifest_self_consistent {
            writeln!(f, "  manifest digest does not match its own records")?;
        }
        for path in &self.added {
            writeln!(f, "  added    {}", path)?;
        }
        for path in &self.removed {
            writeln!(f, "  removed  {}", path)?;
        }
        for path in &self.changed {
            writeln!(f, "  changed  {}", path)?;
        }
        Ok(())
    }
}

/// Rescan `root` and compare it with `expected`
pub fn verify_tree(
    root: &Path,
    expected: &Manifest,
    options: &BuildOptions,
) -> Result<VerifyReport, ManifestError> {
    let actual = Manifest::build(root, options)?;
    Ok(VerifyReport::compare(expected, &actual))
}
