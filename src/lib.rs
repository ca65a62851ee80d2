//! Reproducibility verification for the compression API technical report
//!
//! - [`verifier`]: smoke-tests the remote API's public and authenticated
//!   surface with real dataset vectors
//! - [`figures`]: turns benchmark records into canonical series and
//!   byte-stable SVG figures
//! - [`package`]: assembles the published dataset package
//!
//! Checksum manifests live in the `repro-manifest` crate, re-exported here
//! as [`manifest`].

pub mod config;
pub mod exit;
pub mod figures;
pub mod logging;
pub mod package;
pub mod verifier;

pub use repro_manifest as manifest;

pub use config::{ConfigError, EffectiveConfig, ReproConfig};
pub use exit::ExitCode;
pub use figures::{ExtractionReport, FigureError, FigureExtractor, FigurePlan, FigureSeries};
pub use package::{package_dataset, PackageError, PackageOptions, PackageSummary};
pub use verifier::{
    ApiVerifier, Credential, HttpTransport, MockTransport, VerificationOutcome, VerificationReport, VerifierOptions,
};
