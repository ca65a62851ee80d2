//! Capability-unavailable response matcher
//!
//! The quantized-compression endpoint reports a missing codebook as a
//! non-success response. Only responses matching this signature count as a
//! soft-fail; anything else from that endpoint is a protocol failure.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Matcher configuration as it appears in `repro.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// HTTP statuses that may carry the signature
    pub statuses: Vec<u16>,

    /// Regex the response body must match; `None` matches any body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_pattern: Option<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            statuses: vec![404, 409, 422, 503],
            body_pattern: Some(r"(?i)codebook".to_string()),
        }
    }
}

/// Compiled matcher
#[derive(Debug, Clone)]
pub struct CapabilityMatcher {
    statuses: Vec<u16>,
    body_pattern: Option<Regex>,
}

impl CapabilityMatcher {
    pub fn new(config: &MatcherConfig) -> Result<Self, regex_lite::Error> {
        let body_pattern = config.body_pattern.as_deref().map(Regex::new).transpose()?;
        Ok(Self {
            statuses: config.statuses.clone(),
            body_pattern,
        })
    }

    /// Whether a response is the documented "capability unavailable" signature
    pub fn matches(&self, status: u16, body: &[u8]) -> bool {
        if !self.statuses.contains(&status) {
            return false;
        }
        match &self.body_pattern {
            Some(re) => re.is_match(&String::from_utf8_lossy(body)),
            None => true,
        }
    }
}

impl Default for CapabilityMatcher {
    fn default() -> Self {
        Self {
            statuses: MatcherConfig::default().statuses,
            body_pattern: Regex::new(r"(?i)codebook").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_codebook_errors() {
        let m = CapabilityMatcher::default();
        assert!(m.matches(503, br#"{"error":"Codebook not loaded for model"}"#));
        assert!(m.matches(404, b"codebook unavailable"));
    }

    #[test]
    fn test_default_rejects_other_failures() {
        let m = CapabilityMatcher::default();
        assert!(!m.matches(500, b"codebook unavailable"));
        assert!(!m.matches(503, b"upstream overloaded"));
        assert!(!m.matches(200, b"codebook"));
    }

    #[test]
    fn test_status_only_matcher() {
        let m = CapabilityMatcher::new(&MatcherConfig {
            statuses: vec![501],
            body_pattern: None,
        })
        .unwrap();
        assert!(m.matches(501, b""));
        assert!(!m.matches(503, b""));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = CapabilityMatcher::new(&MatcherConfig {
            statuses: vec![503],
            body_pattern: Some("(".to_string()),
        });
        assert!(result.is_err());
    }
}
