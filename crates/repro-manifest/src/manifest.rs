//! Manifest construction and the canonical text format

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::exclude::{ExcludeError, ExcludeRules};

/// Digest algorithm tag written in front of every hex digest
pub const DIGEST_ALGORITHM: &str = "sha256";

/// Prefix of the trailing manifest-level digest line
pub const MANIFEST_LINE_PREFIX: &str = "manifest ";

/// Default manifest file name inside an artifact root
pub const DEFAULT_MANIFEST_NAME: &str = "MANIFEST.sha256";

/// One regular file under the artifact root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// `/`-separated path relative to the artifact root
    pub path: String,

    /// Byte length; unknown for records parsed from the text form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Lowercase hex SHA-256 of the file bytes
    pub sha256: String,
}

impl ArtifactRecord {
    /// Canonical line for this record (without trailing newline)
    pub fn canonical_line(&self) -> String {
        format!("{}:{}  {}", DIGEST_ALGORITHM, self.sha256, self.path)
    }
}

/// Ordered-by-path record set plus the manifest-level digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Records keyed by path; `BTreeMap<String, _>` orders byte-wise
    pub records: BTreeMap<String, ArtifactRecord>,

    /// SHA-256 of the canonical serialization of `records`, as stated.
    /// Equal to the recomputed value for built manifests; may differ for
    /// a parsed manifest that was edited by hand.
    pub manifest_sha256: String,
}

/// Options for a manifest scan
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Paths excluded from the scan
    pub exclude: ExcludeRules,

    /// Relative paths that must be present
    pub required: Vec<String>,
}

impl BuildOptions {
    /// Options that skip a manifest written into the artifact root itself
    pub fn excluding_manifest(name: &str) -> Result<Self, ExcludeError> {
        Ok(Self {
            exclude: ExcludeRules::new(&[name])?,
            required: Vec::new(),
        })
    }
}

/// Errors for manifest operations
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Walk error: {0}")]
    WalkError(#[from] walkdir::Error),

    #[error("Artifact root is not a directory: {0}")]
    NotADirectory(String),

    #[error("Path is not within artifact root: {0}")]
    PathNotInRoot(String),

    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    #[error("Path cannot be represented in a manifest line: {0:?}")]
    InvalidPath(String),

    #[error("Required artifact missing: {0}")]
    MissingRequired(String),

    #[error("Exclusion rules: {0}")]
    Exclude(#[from] ExcludeError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Manifest parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Stream a file through SHA-256, returning (hex digest, byte length)
pub fn digest_file(path: &Path) -> io::Result<(String, u64)> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut hasher = Sha256::new();
    let len = io::copy(&mut reader, &mut hasher)?;
    Ok((hex::encode(hasher.finalize()), len))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Convert a relative path to its `/`-separated manifest form
fn manifest_path(rel: &Path) -> Result<String, ManifestError> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| ManifestError::NonUtf8Path(rel.display().to_string()))?;
                parts.push(part);
            }
            _ => return Err(ManifestError::PathNotInRoot(rel.display().to_string())),
        }
    }
    let joined = parts.join("/");
    if joined.contains('\n') || joined.contains('\r') || joined.contains('\\') {
        return Err(ManifestError::InvalidPath(joined));
    }
    Ok(joined)
}

fn is_hex_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl Manifest {
    /// Scan `root` and build a manifest
    ///
    /// Only regular files are recorded. Symbolic links are never followed
    /// or recorded. Files are digested in parallel; the result is merged
    /// into byte-wise path order before anything is serialized. Any
    /// unreadable file fails the whole build.
    pub fn build(root: &Path, options: &BuildOptions) -> Result<Self, ManifestError> {
        if !root.is_dir() {
            return Err(ManifestError::NotADirectory(root.display().to_string()));
        }

        let mut files: Vec<(String, PathBuf)> = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(false)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|_| ManifestError::PathNotInRoot(entry.path().display().to_string()))?;
            let rel_str = manifest_path(rel)?;
            if options.exclude.is_excluded(&rel_str) {
                debug!(path = %rel_str, "excluded from manifest");
                continue;
            }
            files.push((rel_str, entry.into_path()));
        }

        let digested: Vec<ArtifactRecord> = files
            .par_iter()
            .map(|(rel, full)| {
                let (sha256, size) = digest_file(full).map_err(|source| ManifestError::Unreadable {
                    path: rel.clone(),
                    source,
                })?;
                Ok(ArtifactRecord {
                    path: rel.clone(),
                    size: Some(size),
                    sha256,
                })
            })
            .collect::<Result<_, ManifestError>>()?;

        let records: BTreeMap<String, ArtifactRecord> = digested
            .into_iter()
            .map(|record| (record.path.clone(), record))
            .collect();

        for required in &options.required {
            if !records.contains_key(required.as_str()) {
                return Err(ManifestError::MissingRequired(required.clone()));
            }
        }

        debug!(root = %root.display(), files = records.len(), "manifest built");
        Ok(Self::from_records(records))
    }

    /// Create a manifest from records, computing its digest
    pub fn from_records(records: BTreeMap<String, ArtifactRecord>) -> Self {
        let manifest_sha256 = sha256_hex(&Self::canonical_records(&records));
        Self {
            records,
            manifest_sha256,
        }
    }

    /// Canonical serialization of the records: one line per record, each
    /// terminated by `\n`, in path order. Empty for an empty tree.
    fn canonical_records(records: &BTreeMap<String, ArtifactRecord>) -> Vec<u8> {
        let mut out = String::new();
        for record in records.values() {
            out.push_str(&record.canonical_line());
            out.push('\n');
        }
        out.into_bytes()
    }

    /// Recompute the manifest-level digest from the records
    pub fn recompute_digest(&self) -> String {
        sha256_hex(&Self::canonical_records(&self.records))
    }

    /// Whether the stated manifest digest matches the records
    pub fn is_self_consistent(&self) -> bool {
        self.recompute_digest() == self.manifest_sha256
    }

    /// Render the canonical text form
    pub fn to_text(&self) -> String {
        let mut out = String::from_utf8_lossy(&Self::canonical_records(&self.records)).into_owned();
        out.push_str(MANIFEST_LINE_PREFIX);
        out.push_str(DIGEST_ALGORITHM);
        out.push(':');
        out.push_str(&self.manifest_sha256);
        out.push('\n');
        out
    }

    /// Parse the canonical text form
    ///
    /// Records must appear in strictly increasing byte-wise path order and
    /// the last line must carry the manifest digest. The stated digest is
    /// kept as-is; use [`Manifest::is_self_consistent`] to check it.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut records = BTreeMap::new();
        let mut stated: Option<String> = None;
        let mut last_path: Option<String> = None;

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let parse_err = |reason: &str| ManifestError::Parse {
                line: line_no,
                reason: reason.to_string(),
            };

            if stated.is_some() {
                if line.is_empty() {
                    continue;
                }
                return Err(parse_err("content after manifest digest line"));
            }

            if let Some(rest) = line.strip_prefix(MANIFEST_LINE_PREFIX) {
                let digest = rest
                    .strip_prefix(DIGEST_ALGORITHM)
                    .and_then(|r| r.strip_prefix(':'))
                    .ok_or_else(|| parse_err("unsupported digest algorithm"))?;
                if !is_hex_digest(digest) {
                    return Err(parse_err("malformed manifest digest"));
                }
                stated = Some(digest.to_string());
                continue;
            }

            let (digest_part, path) = line
                .split_once("  ")
                .ok_or_else(|| parse_err("expected '<algorithm>:<hex>  <path>'"))?;
            let sha256 = digest_part
                .strip_prefix(DIGEST_ALGORITHM)
                .and_then(|r| r.strip_prefix(':'))
                .ok_or_else(|| parse_err("unsupported digest algorithm"))?;
            if !is_hex_digest(sha256) {
                return Err(parse_err("malformed file digest"));
            }
            if path.is_empty() {
                return Err(parse_err("empty path"));
            }
            if let Some(prev) = &last_path {
                if path.as_bytes() <= prev.as_bytes() {
                    return Err(parse_err("records not in canonical path order"));
                }
            }
            last_path = Some(path.to_string());
            records.insert(
                path.to_string(),
                ArtifactRecord {
                    path: path.to_string(),
                    size: None,
                    sha256: sha256.to_string(),
                },
            );
        }

        let manifest_sha256 = stated.ok_or_else(|| ManifestError::Parse {
            line: text.lines().count(),
            reason: "missing manifest digest line".to_string(),
        })?;

        Ok(Self {
            records,
            manifest_sha256,
        })
    }

    /// Write the canonical text form
    pub fn write_to_file(&self, path: &Path) -> Result<(), ManifestError> {
        fs::write(path, self.to_text())?;
        Ok(())
    }

    /// Load the canonical text form
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Serialize to pretty JSON (includes byte lengths)
    pub fn to_json(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Look up a record by relative path
    pub fn get(&self, path: &str) -> Option<&ArtifactRecord> {
        self.records.get(path)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the manifest covers no files
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total size of all records with a known size
    pub fn total_size(&self) -> u64 {
        self.records.values().filter_map(|r| r.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn create_test_artifact_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("figures_data.json"), r#"{"rows":[]}"#).unwrap();
        fs::write(dir.path().join("README.md"), "# Report\n").unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/sts12.json"), "[[0.1,0.2]]").unwrap();
        dir
    }

    #[test]
    fn test_build_records_regular_files_sorted() {
        let dir = create_test_artifact_dir();
        let manifest = Manifest::build(dir.path(), &BuildOptions::default()).unwrap();

        let paths: Vec<_> = manifest.records.keys().cloned().collect();
        assert_eq!(paths, vec!["README.md", "data/sts12.json", "figures_data.json"]);
        assert!(manifest.is_self_consistent());
    }

    #[test]
    fn test_record_size_and_digest() {
        let dir = create_test_artifact_dir();
        let manifest = Manifest::build(dir.path(), &BuildOptions::default()).unwrap();

        let readme = manifest.get("README.md").unwrap();
        assert_eq!(readme.size, Some(9));
        assert_eq!(readme.sha256, sha256_hex(b"# Report\n"));
    }

    #[test]
    fn test_empty_directory_digest_is_empty_serialization() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::build(dir.path(), &BuildOptions::default()).unwrap();

        assert!(manifest.is_empty());
        assert_eq!(manifest.manifest_sha256, EMPTY_SHA256);
        assert_eq!(manifest.to_text(), format!("manifest sha256:{}\n", EMPTY_SHA256));
    }

    #[test]
    fn test_text_form_layout() {
        let dir = create_test_artifact_dir();
        let manifest = Manifest::build(dir.path(), &BuildOptions::default()).unwrap();
        let text = manifest.to_text();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("sha256:"));
        assert!(lines[0].ends_with("  README.md"));
        assert!(lines[3].starts_with("manifest sha256:"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_parse_round_trip_keeps_digest() {
        let dir = create_test_artifact_dir();
        let manifest = Manifest::build(dir.path(), &BuildOptions::default()).unwrap();
        let parsed = Manifest::parse(&manifest.to_text()).unwrap();

        assert_eq!(parsed.manifest_sha256, manifest.manifest_sha256);
        assert_eq!(parsed.len(), 3);
        assert!(parsed.get("README.md").unwrap().size.is_none());
        assert_eq!(parsed.to_text(), manifest.to_text());
    }

    #[test]
    fn test_parse_rejects_unsorted_records() {
        let a = "0".repeat(64);
        let text = format!("sha256:{a}  b.txt\nsha256:{a}  a.txt\nmanifest sha256:{a}\n");
        let err = Manifest::parse(&text).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_parse_rejects_missing_digest_line() {
        let a = "0".repeat(64);
        let err = Manifest::parse(&format!("sha256:{a}  a.txt\n")).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn test_parse_rejects_other_algorithms() {
        let a = "0".repeat(64);
        let err = Manifest::parse(&format!("md5:{a}  a.txt\nmanifest sha256:{a}\n")).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_hand_edited_digest_is_inconsistent() {
        let dir = create_test_artifact_dir();
        let manifest = Manifest::build(dir.path(), &BuildOptions::default()).unwrap();
        let text = manifest
            .to_text()
            .replace(&manifest.manifest_sha256, &"0".repeat(64));

        let parsed = Manifest::parse(&text).unwrap();
        assert!(!parsed.is_self_consistent());
    }

    #[test]
    fn test_excluded_manifest_name() {
        let dir = create_test_artifact_dir();
        fs::write(dir.path().join(DEFAULT_MANIFEST_NAME), "stale").unwrap();

        let options = BuildOptions::excluding_manifest(DEFAULT_MANIFEST_NAME).unwrap();
        let manifest = Manifest::build(dir.path(), &options).unwrap();
        assert!(manifest.get(DEFAULT_MANIFEST_NAME).is_none());
    }

    #[test]
    fn test_missing_required_path_is_error() {
        let dir = create_test_artifact_dir();
        let options = BuildOptions {
            required: vec!["assets/figures_data.json".to_string()],
            ..BuildOptions::default()
        };
        let err = Manifest::build(dir.path(), &options).unwrap_err();
        assert!(matches!(err, ManifestError::MissingRequired(p) if p == "assets/figures_data.json"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_recorded() {
        let dir = create_test_artifact_dir();
        std::os::unix::fs::symlink(dir.path().join("README.md"), dir.path().join("link.md")).unwrap();

        let manifest = Manifest::build(dir.path(), &BuildOptions::default()).unwrap();
        assert!(manifest.get("link.md").is_none());
        assert_eq!(manifest.len(), 3);
    }

    #[test]
    fn test_not_a_directory() {
        let dir = create_test_artifact_dir();
        let err = Manifest::build(&dir.path().join("README.md"), &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, ManifestError::NotADirectory(_)));
    }

    #[test]
    fn test_json_includes_sizes() {
        let dir = create_test_artifact_dir();
        let manifest = Manifest::build(dir.path(), &BuildOptions::default()).unwrap();
        let json = manifest.to_json().unwrap();
        assert!(json.contains("\"size\": 9"));
        assert!(json.contains("\"manifest_sha256\""));
    }
}
