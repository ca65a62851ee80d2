//! Exclusion rules for manifest scans
//!
//! Patterns are matched against the `/`-separated path relative to the
//! artifact root.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Errors for exclusion rules
#[derive(Debug, thiserror::Error)]
pub enum ExcludeError {
    #[error("Glob pattern error: {0}")]
    GlobError(#[from] globset::Error),
}

/// Exclusion rules for filtering artifact paths
#[derive(Debug, Clone)]
pub struct ExcludeRules {
    patterns: Vec<String>,
    glob_set: GlobSet,
}

impl Default for ExcludeRules {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            glob_set: GlobSet::empty(),
        }
    }
}

impl ExcludeRules {
    /// Create rules from a list of glob patterns
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ExcludeError> {
        Self::default().with_patterns(patterns)
    }

    /// Add additional patterns, keeping the existing ones
    pub fn with_patterns<S: AsRef<str>>(self, patterns: &[S]) -> Result<Self, ExcludeError> {
        let mut all = self.patterns;
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if !pattern.is_empty() && !all.iter().any(|p| p == pattern) {
                all.push(pattern.to_string());
            }
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in &all {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            patterns: all,
            glob_set: builder.build()?,
        })
    }

    /// Patterns in insertion order
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Check if a relative path should be excluded
    pub fn is_excluded(&self, rel_path: &str) -> bool {
        self.glob_set.is_match(Path::new(rel_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_rules_exclude_nothing() {
        let rules = ExcludeRules::default();
        assert!(!rules.is_excluded("data/stsb.json"));
        assert!(!rules.is_excluded("MANIFEST.sha256"));
    }

    #[test]
    fn test_exact_name_pattern() {
        let rules = ExcludeRules::new(&["MANIFEST.sha256"]).unwrap();
        assert!(rules.is_excluded("MANIFEST.sha256"));
        assert!(!rules.is_excluded("data/MANIFEST.sha256.bak"));
    }

    #[test]
    fn test_recursive_pattern() {
        let rules = ExcludeRules::new(&["**/.DS_Store", "tmp/**"]).unwrap();
        assert!(rules.is_excluded("assets/.DS_Store"));
        assert!(rules.is_excluded("tmp/scratch.bin"));
        assert!(!rules.is_excluded("assets/figure.svg"));
    }

    #[test]
    fn test_with_patterns_keeps_existing_and_dedups() {
        let rules = ExcludeRules::new(&["*.log"])
            .unwrap()
            .with_patterns(&["*.log", "cache/**", "  "])
            .unwrap();
        assert_eq!(rules.patterns(), &["*.log".to_string(), "cache/**".to_string()]);
        assert!(rules.is_excluded("run.log"));
        assert!(rules.is_excluded("cache/a"));
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        assert!(ExcludeRules::new(&["[unclosed"]).is_err());
    }
}
