//! Dataset packaging
//!
//! Copies an expected list of dataset files and a dataset card into a fresh
//! package directory and seals it with a checksum manifest:
//!
//! ```text
//! <out>/README.md
//! <out>/data/<file>...
//! <out>/MANIFEST.sha256
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use repro_manifest::{BuildOptions, Manifest, ManifestError, DEFAULT_MANIFEST_NAME};

use crate::exit::ExitCode;

/// Pair files published with the report
pub const DEFAULT_DATASET_FILES: &[&str] = &[
    "stsb_intfloat_e5_large_v2_1024d_pairs.json",
    "sts12_e5large_1024d_pairs.json",
    "sts13_e5large_1024d_pairs.json",
    "sts14_e5large_1024d_pairs.json",
    "sts15_e5large_1024d_pairs.json",
    "sts16_e5large_1024d_pairs.json",
];

/// Card file name inside the package
pub const CARD_FILE: &str = "README.md";

/// Data directory inside the package
pub const DATA_DIR: &str = "data";

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("missing required input(s): {}", .0.join(", "))]
    MissingInputs(Vec<String>),

    #[error("invalid dataset file name {0:?}: must be a plain file name")]
    InvalidName(String),

    #[error("output directory {0} is not empty")]
    OutputNotEmpty(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

impl PackageError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            PackageError::MissingInputs(_) | PackageError::InvalidName(_) | PackageError::OutputNotEmpty(_) => {
                ExitCode::Usage
            }
            PackageError::Io { .. } | PackageError::Manifest(_) => ExitCode::Io,
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> PackageError + '_ {
    move |source| PackageError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// What to package
#[derive(Debug, Clone)]
pub struct PackageOptions {
    pub source_dir: PathBuf,
    pub card: PathBuf,
    pub out_dir: PathBuf,
    pub files: Vec<String>,
}

impl PackageOptions {
    /// Options with the default dataset file list
    pub fn new(source_dir: impl Into<PathBuf>, card: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            card: card.into(),
            out_dir: out_dir.into(),
            files: DEFAULT_DATASET_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        if !files.is_empty() {
            self.files = files;
        }
        self
    }
}

/// What was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSummary {
    pub out_dir: String,
    pub files: usize,
    pub total_bytes: u64,
    pub manifest_path: String,
    pub manifest_sha256: String,
}

impl PackageSummary {
    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("Packaged {} file(s) to: {}", self.files, self.out_dir),
            format!("Total size: {:.1} MB", self.total_bytes as f64 / 1024.0 / 1024.0),
            format!("Manifest: {} (sha256:{})", self.manifest_path, self.manifest_sha256),
        ]
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Build the package; nothing is written unless every input exists
pub fn package_dataset(options: &PackageOptions) -> Result<PackageSummary, PackageError> {
    if let Some(bad) = options.files.iter().find(|n| !is_plain_name(n)) {
        return Err(PackageError::InvalidName(bad.clone()));
    }

    let mut missing: Vec<String> = options
        .files
        .iter()
        .filter(|name| !options.source_dir.join(name).is_file())
        .cloned()
        .collect();
    if !options.card.is_file() {
        missing.push(options.card.display().to_string());
    }
    if !missing.is_empty() {
        return Err(PackageError::MissingInputs(missing));
    }

    let out = &options.out_dir;
    if out.exists() {
        let mut entries = fs::read_dir(out).map_err(io_err(out))?;
        if entries.next().is_some() {
            return Err(PackageError::OutputNotEmpty(out.display().to_string()));
        }
    }
    let data_dir = out.join(DATA_DIR);
    fs::create_dir_all(&data_dir).map_err(io_err(&data_dir))?;

    let card_dst = out.join(CARD_FILE);
    fs::copy(&options.card, &card_dst).map_err(io_err(&card_dst))?;

    let mut total_bytes = 0;
    for name in &options.files {
        let src = options.source_dir.join(name);
        let dst = data_dir.join(name);
        total_bytes += fs::copy(&src, &dst).map_err(io_err(&src))?;
    }

    let build = BuildOptions::excluding_manifest(DEFAULT_MANIFEST_NAME).map_err(ManifestError::from)?;
    let manifest = Manifest::build(out, &build)?;
    let manifest_path = out.join(DEFAULT_MANIFEST_NAME);
    manifest.write_to_file(&manifest_path)?;

    info!(
        out = %out.display(),
        files = options.files.len(),
        total_bytes,
        manifest = %manifest.manifest_sha256,
        "dataset packaged"
    );

    Ok(PackageSummary {
        out_dir: out.display().to_string(),
        files: options.files.len(),
        total_bytes,
        manifest_path: manifest_path.display().to_string(),
        manifest_sha256: manifest.manifest_sha256,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(files: &[&str]) -> (TempDir, PackageOptions) {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("training/data");
        fs::create_dir_all(&src).unwrap();
        for name in files {
            fs::write(src.join(name), format!("{{\"name\": \"{}\"}}", name)).unwrap();
        }
        let card = temp.path().join("card.md");
        fs::write(&card, "# Dataset card\n").unwrap();
        let options = PackageOptions::new(src, card, temp.path().join("pkg"))
            .with_files(files.iter().map(|s| s.to_string()).collect());
        (temp, options)
    }

    #[test]
    fn test_package_writes_layout_and_manifest() {
        let (_temp, options) = setup(&["a.json", "b.json"]);
        let summary = package_dataset(&options).unwrap();
        assert_eq!(summary.files, 2);

        let out = &options.out_dir;
        assert_eq!(fs::read_to_string(out.join("README.md")).unwrap(), "# Dataset card\n");
        assert!(out.join("data/a.json").is_file());

        let manifest = Manifest::from_file(&out.join(DEFAULT_MANIFEST_NAME)).unwrap();
        let paths: Vec<_> = manifest.records.keys().cloned().collect();
        assert_eq!(paths, vec!["README.md", "data/a.json", "data/b.json"]);
        assert_eq!(manifest.manifest_sha256, summary.manifest_sha256);
    }

    #[test]
    fn test_missing_inputs_listed_and_nothing_written() {
        let (_temp, mut options) = setup(&["a.json"]);
        options.files = vec!["a.json".into(), "x.json".into(), "y.json".into()];
        let err = package_dataset(&options).unwrap_err();
        match &err {
            PackageError::MissingInputs(names) => assert_eq!(names, &vec!["x.json".to_string(), "y.json".to_string()]),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(err.exit_code(), ExitCode::Usage);
        assert!(!options.out_dir.exists());
    }

    #[test]
    fn test_missing_card_is_reported() {
        let (_temp, mut options) = setup(&["a.json"]);
        options.card = options.card.with_file_name("nope.md");
        assert!(matches!(package_dataset(&options), Err(PackageError::MissingInputs(ref n)) if n.len() == 1));
    }

    #[test]
    fn test_refuses_non_empty_output() {
        let (_temp, options) = setup(&["a.json"]);
        fs::create_dir_all(&options.out_dir).unwrap();
        fs::write(options.out_dir.join("stale.txt"), "old").unwrap();
        assert!(matches!(package_dataset(&options), Err(PackageError::OutputNotEmpty(_))));
    }

    #[test]
    fn test_rejects_path_like_names() {
        let (_temp, options) = setup(&["a.json"]);
        let options = options.with_files(vec!["../secrets.json".into()]);
        assert!(matches!(package_dataset(&options), Err(PackageError::InvalidName(_))));
    }

    #[test]
    fn test_default_file_list() {
        let options = PackageOptions::new("s", "c", "o");
        assert_eq!(options.files.len(), 6);
        assert_eq!(options.files[0], "stsb_intfloat_e5_large_v2_1024d_pairs.json");
    }
}
