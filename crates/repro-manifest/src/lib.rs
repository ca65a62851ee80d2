//! Checksum manifests for reproducibility packages
//!
//! Builds a deterministic, order-independent SHA-256 manifest over an
//! artifact tree and verifies a tree against a previously written manifest.
//! The text form is stable byte-for-byte across platforms:
//!
//! ```text
//! sha256:<hex>  <relative/path>
//! ...
//! manifest sha256:<hex>
//! ```

mod exclude;
mod manifest;
mod verify;

pub use exclude::{ExcludeError, ExcludeRules};
pub use manifest::{
    digest_file, ArtifactRecord, BuildOptions, Manifest, ManifestError, DEFAULT_MANIFEST_NAME,
    DIGEST_ALGORITHM, MANIFEST_LINE_PREFIX,
};
pub use verify::{verify_tree, VerifyReport};
