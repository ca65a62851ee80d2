//! Built-in defaults (layer 1) and the typed configuration they seed

use serde::{Deserialize, Serialize};

use crate::verifier::{MatcherConfig, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_DATA_URL, DEFAULT_SAMPLE};
use repro_manifest::DEFAULT_MANIFEST_NAME;

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 20;

/// `[verifier]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifierSection {
    pub base_url: String,
    pub data_url: String,
    pub sample: usize,
    pub timeout_s: u64,
    /// Run the optional quantized-compression check
    pub quantized_check: bool,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub capability_unavailable: MatcherConfig,
}

impl Default for VerifierSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            data_url: DEFAULT_DATA_URL.to_string(),
            sample: DEFAULT_SAMPLE,
            timeout_s: DEFAULT_TIMEOUT_SECONDS,
            quantized_check: false,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            capability_unavailable: MatcherConfig::default(),
        }
    }
}

/// `[manifest]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestSection {
    pub file_name: String,
    pub exclude: Vec<String>,
    pub require: Vec<String>,
}

impl Default for ManifestSection {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_MANIFEST_NAME.to_string(),
            exclude: Vec::new(),
            require: Vec::new(),
        }
    }
}

/// Fully merged, typed configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReproConfig {
    pub verifier: VerifierSection,
    pub manifest: ManifestSection,
}

/// Built-in default values
#[derive(Debug, Clone, Default)]
pub struct BuiltinDefaults {
    config: ReproConfig,
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "verifier": {
                "base_url": self.config.verifier.base_url,
                "data_url": self.config.verifier.data_url,
                "sample": self.config.verifier.sample,
                "timeout_s": self.config.verifier.timeout_s,
                "quantized_check": self.config.verifier.quantized_check,
                "api_key_env": self.config.verifier.api_key_env,
                "capability_unavailable": {
                    "statuses": self.config.verifier.capability_unavailable.statuses,
                    "body_pattern": self.config.verifier.capability_unavailable.body_pattern,
                }
            },
            "manifest": {
                "file_name": self.config.manifest.file_name,
                "exclude": self.config.manifest.exclude,
                "require": self.config.manifest.require,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReproConfig::default();
        assert_eq!(config.verifier.base_url, "https://api.aqea.ai");
        assert_eq!(config.verifier.sample, 8);
        assert_eq!(config.verifier.timeout_s, 20);
        assert!(!config.verifier.quantized_check);
        assert_eq!(config.verifier.api_key_env, "AQEA_API_KEY");
        assert_eq!(config.manifest.file_name, "MANIFEST.sha256");
    }

    #[test]
    fn test_to_value_deserializes_back() {
        let value = BuiltinDefaults::default().to_value();
        assert_eq!(value["verifier"]["capability_unavailable"]["statuses"][0], 404);
        let config: ReproConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config, ReproConfig::default());
    }
}
