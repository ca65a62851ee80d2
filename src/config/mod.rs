//! Layered configuration
//!
//! 1. Built-in defaults
//! 2. Config file (`--config` or `./repro.toml`)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::{BuiltinDefaults, ManifestSection, ReproConfig, VerifierSection, DEFAULT_TIMEOUT_SECONDS};
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, manifest_overrides, DEFAULT_CONFIG_FILE, SCHEMA_ID, SCHEMA_VERSION};
pub use merge::{deep_merge, merge_layers};

