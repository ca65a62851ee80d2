//! Effective configuration with provenance
//!
//! Records the merged configuration plus where each layer came from and the
//! SHA-256 of every config file that contributed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::defaults::{BuiltinDefaults, ReproConfig};
use super::merge::merge_layers;
use crate::exit::ExitCode;
use crate::verifier::{CapabilityMatcher, VerifierOptions};
use repro_manifest::{BuildOptions, ExcludeRules};

/// Schema version for effective_config
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "repro/effective_config@1";

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "repro.toml";

/// Keys that would carry a secret; the credential only comes from the environment
const SECRET_KEYS: &[&str] = &["api_key", "token", "secret", "password", "credential"];

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Effective configuration with full provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_version: u32,
    pub schema_id: String,
    pub created_at: DateTime<Utc>,
    pub config: ReproConfig,
    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {reason}")]
    IoError { path: String, reason: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("{path}: key '{key}' looks like a secret; supply the API key through the environment instead")]
    SecretInFile { path: String, key: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ConfigError::IoError { .. } => ExitCode::Io,
            _ => ExitCode::Usage,
        }
    }
}

impl EffectiveConfig {
    /// Build from builtin defaults, an optional config file and CLI overrides
    pub fn build(config_path: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = config_path {
            let (value, digest) = load_toml_file(path)?;
            if let Some(key) = find_secret_key(&value, "") {
                return Err(ConfigError::SecretInFile {
                    path: path.display().to_string(),
                    key,
                });
            }
            debug!(path = %path.display(), %digest, "loaded config file");
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.display().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let config: ReproConfig =
            serde_json::from_value(merged).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        validate(&config)?;

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config,
            sources,
        })
    }

    /// Resolve the config file: an explicit path must exist, the default is optional
    pub fn discover(explicit: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::build(Some(path), cli_overrides),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                let path = default.is_file().then_some(default);
                Self::build(path, cli_overrides)
            }
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Verifier options derived from the `[verifier]` section
    pub fn verifier_options(&self) -> Result<VerifierOptions, ConfigError> {
        let v = &self.config.verifier;
        let matcher = CapabilityMatcher::new(&v.capability_unavailable).map_err(|e| {
            ConfigError::ValidationError(format!("verifier.capability_unavailable.body_pattern: {}", e))
        })?;
        Ok(VerifierOptions {
            base_url: v.base_url.clone(),
            data_url: v.data_url.clone(),
            sample: v.sample,
            quantized_check: v.quantized_check,
            matcher,
            api_key_env: v.api_key_env.clone(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.verifier.timeout_s)
    }

    /// Manifest scan options derived from the `[manifest]` section
    pub fn manifest_options(&self) -> Result<BuildOptions, ConfigError> {
        let m = &self.config.manifest;
        let mut patterns = vec![m.file_name.clone()];
        patterns.extend(m.exclude.iter().cloned());
        let exclude = ExcludeRules::new(&patterns)
            .map_err(|e| ConfigError::ValidationError(format!("manifest.exclude: {}", e)))?;
        Ok(BuildOptions {
            exclude,
            required: m.require.clone(),
        })
    }
}

/// CLI override layer for the `[manifest]` section
///
/// `manifest build` and `manifest verify` must scan with the same rules, so
/// both subcommands derive their overrides here.
pub fn manifest_overrides(require: &[String], exclude: &[String]) -> Value {
    let mut manifest = serde_json::Map::new();
    if !require.is_empty() {
        manifest.insert("require".into(), require.into());
    }
    if !exclude.is_empty() {
        manifest.insert("exclude".into(), exclude.into());
    }
    serde_json::json!({ "manifest": manifest })
}

/// Load and parse a TOML file, returning the value and digest
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::IoError {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let digest = hex::encode(Sha256::digest(&bytes));

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::ParseError(format!("{}: invalid UTF-8: {}", path.display(), e)))?;
    let toml_value: toml::Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

    Ok((toml_to_json(toml_value), digest))
}

/// Convert a TOML value to JSON
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// First key path whose name looks like a secret
fn find_secret_key(value: &Value, path: &str) -> Option<String> {
    let map = value.as_object()?;
    for (key, val) in map {
        let current = if path.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", path, key)
        };
        // `api_key_env` names a variable, it does not hold a secret
        let lower = key.to_lowercase();
        if lower != "api_key_env" && SECRET_KEYS.iter().any(|s| lower.contains(s)) {
            return Some(current);
        }
        if let Some(found) = find_secret_key(val, &current) {
            return Some(found);
        }
    }
    None
}

fn validate(config: &ReproConfig) -> Result<(), ConfigError> {
    let v = &config.verifier;
    for (name, url) in [("base_url", &v.base_url), ("data_url", &v.data_url)] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "verifier.{} must be an http(s) URL, got {:?}",
                name, url
            )));
        }
    }
    if v.sample == 0 || v.sample > 1024 {
        return Err(ConfigError::ValidationError(
            "verifier.sample must be in [1, 1024]".to_string(),
        ));
    }
    if v.timeout_s == 0 || v.timeout_s > 600 {
        return Err(ConfigError::ValidationError(
            "verifier.timeout_s must be in (0, 600]".to_string(),
        ));
    }
    if v.api_key_env.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "verifier.api_key_env must name an environment variable".to_string(),
        ));
    }
    if v.capability_unavailable.statuses.is_empty() {
        return Err(ConfigError::ValidationError(
            "verifier.capability_unavailable.statuses must not be empty".to_string(),
        ));
    }
    let name = config.manifest.file_name.as_str();
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return Err(ConfigError::ValidationError(
            "manifest.file_name must be a plain file name".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(contents: &str) -> NamedTempFile {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(contents.as_bytes()).unwrap();
        temp
    }

    #[test]
    fn test_build_with_defaults_only() {
        let config = EffectiveConfig::build(None, None).unwrap();
        assert_eq!(config.schema_id, SCHEMA_ID);
        assert_eq!(config.config, ReproConfig::default());
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);
    }

    #[test]
    fn test_file_then_cli_precedence() {
        let file = toml_file(
            "[verifier]\nsample = 16\nbase_url = \"https://staging.example\"\n\n[manifest]\nexclude = [\"*.tmp\"]\n",
        );
        let cli = serde_json::json!({"verifier": {"sample": 4}});
        let config = EffectiveConfig::build(Some(file.path()), Some(cli)).unwrap();

        assert_eq!(config.config.verifier.sample, 4);
        assert_eq!(config.config.verifier.base_url, "https://staging.example");
        assert_eq!(config.config.verifier.timeout_s, 20);
        assert_eq!(config.config.manifest.exclude, vec!["*.tmp".to_string()]);

        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources[1].origin, ConfigOrigin::File);
        assert_eq!(config.sources[1].digest.as_ref().map(String::len), Some(64));
    }

    #[test]
    fn test_secret_key_in_file_is_rejected() {
        let file = toml_file("[verifier]\napi_key = \"sk-live-123\"\n");
        let err = EffectiveConfig::build(Some(file.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::SecretInFile { ref key, .. } if key == "verifier.api_key"));
        assert!(!err.to_string().contains("sk-live-123"));
    }

    #[test]
    fn test_api_key_env_is_allowed() {
        let file = toml_file("[verifier]\napi_key_env = \"MY_KEY\"\n");
        let config = EffectiveConfig::build(Some(file.path()), None).unwrap();
        assert_eq!(config.verifier_options().unwrap().api_key_env, "MY_KEY");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let file = toml_file("[verifier]\nsampel = 3\n");
        let err = EffectiveConfig::build(Some(file.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
        assert_eq!(err.exit_code(), ExitCode::Usage);
    }

    #[test]
    fn test_validation() {
        let bad = [
            serde_json::json!({"verifier": {"sample": 0}}),
            serde_json::json!({"verifier": {"timeout_s": 0}}),
            serde_json::json!({"verifier": {"base_url": "ftp://x"}}),
            serde_json::json!({"manifest": {"file_name": "a/b"}}),
        ];
        for cli in bad {
            let err = EffectiveConfig::build(None, Some(cli.clone())).unwrap_err();
            assert!(matches!(err, ConfigError::ValidationError(_)), "{}", cli);
        }
    }

    #[test]
    fn test_missing_explicit_file_is_io_error() {
        let err = EffectiveConfig::discover(Some(Path::new("/nonexistent/repro.toml")), None).unwrap_err();
        assert_eq!(err.exit_code(), ExitCode::Io);
    }

    #[test]
    fn test_bad_matcher_regex() {
        let cli = serde_json::json!({"verifier": {"capability_unavailable": {"body_pattern": "("}}});
        let config = EffectiveConfig::build(None, Some(cli)).unwrap();
        assert!(config.verifier_options().is_err());
    }

    #[test]
    fn test_manifest_options_exclude_manifest_name() {
        let cli = serde_json::json!({"manifest": {"exclude": ["*.log"], "require": ["data/a.bin"]}});
        let config = EffectiveConfig::build(None, Some(cli)).unwrap();
        let options = config.manifest_options().unwrap();
        assert!(options.exclude.is_excluded("MANIFEST.sha256"));
        assert!(options.exclude.is_excluded("run.log"));
        assert_eq!(options.required, vec!["data/a.bin".to_string()]);
    }
}
