//! Dataset packaging end to end: package, then verify the sealed tree

mod fixtures;

use fixtures::*;
use repro_verify::manifest::{verify_tree, BuildOptions, Manifest, DEFAULT_MANIFEST_NAME};
use repro_verify::package::{package_dataset, PackageOptions, DEFAULT_DATASET_FILES};
use std::fs;
use tempfile::TempDir;

fn sources(dir: &TempDir) -> PackageOptions {
    let src = dir.path().join("training/data");
    for name in DEFAULT_DATASET_FILES {
        write_tree(&src, &[(*name, format!("[{{\"pair\": \"{}\"}}]", name).as_bytes())]);
    }
    write_tree(dir.path(), &[("DATASET_CARD.md", b"# STS pairs\n")]);
    PackageOptions::new(src, dir.path().join("DATASET_CARD.md"), dir.path().join("pkg"))
}

fn manifest_len(options: &PackageOptions) -> usize {
    Manifest::from_file(&options.out_dir.join(DEFAULT_MANIFEST_NAME)).unwrap().len()
}

#[test]
fn test_packaged_tree_verifies_clean() {
    let dir = TempDir::new().unwrap();
    let options = sources(&dir);

    let summary = package_dataset(&options).unwrap();
    assert_eq!(summary.files, DEFAULT_DATASET_FILES.len());
    assert_eq!(manifest_len(&options), DEFAULT_DATASET_FILES.len() + 1);

    let manifest = Manifest::from_file(&options.out_dir.join(DEFAULT_MANIFEST_NAME)).unwrap();
    assert!(manifest.get("README.md").is_some());
    let report = verify_tree(
        &options.out_dir,
        &manifest,
        &BuildOptions::excluding_manifest(DEFAULT_MANIFEST_NAME).unwrap(),
    )
    .unwrap();
    assert!(report.is_match(), "{}", report);
}

#[test]
fn test_edit_after_packaging_is_detected() {
    let dir = TempDir::new().unwrap();
    let options = sources(&dir);
    package_dataset(&options).unwrap();

    let first = format!("data/{}", DEFAULT_DATASET_FILES[0]);
    fs::write(options.out_dir.join(&first), "[]").unwrap();

    let manifest = Manifest::from_file(&options.out_dir.join(DEFAULT_MANIFEST_NAME)).unwrap();
    let report = verify_tree(
        &options.out_dir,
        &manifest,
        &BuildOptions::excluding_manifest(DEFAULT_MANIFEST_NAME).unwrap(),
    )
    .unwrap();
    assert_eq!(report.changed, vec![first]);
}

#[test]
fn test_second_run_into_same_output_is_refused() {
    let dir = TempDir::new().unwrap();
    let options = sources(&dir);
    package_dataset(&options).unwrap();
    let err = package_dataset(&options).unwrap_err();
    assert_eq!(err.exit_code(), repro_verify::ExitCode::Usage);
}
