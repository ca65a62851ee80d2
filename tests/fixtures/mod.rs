//! Shared fixtures for integration tests
//!
//! - a scripted API (health, models, AQED export, auth, compression)
//! - small artifact trees on disk

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use repro_verify::verifier::{encode_aqed, Method, MockReply, MockTransport, VerifierOptions};
use serde_json::json;

pub const BASE_URL: &str = "http://api.test";
pub const DATA_URL: &str = "http://data.test/api/export/text-demo?file=embeddings_original";
pub const DATA_PATH: &str = "/api/export/text-demo";
pub const API_KEY: &str = "sk-test-4f1c2a9e";
pub const DIM: usize = 16;
pub const MODEL_ID: &str = "e5-large-test";

/// Deterministic, non-degenerate vectors
pub fn real_vectors(n: usize, dim: usize) -> Vec<Vec<f32>> {
    (0..n)
        .map(|i| {
            (0..dim)
                .map(|j| (((i * 31 + j * 7) % 97) as f32 - 48.0) / 50.0)
                .collect()
        })
        .collect()
}

pub fn options() -> VerifierOptions {
    VerifierOptions {
        base_url: BASE_URL.to_string(),
        data_url: DATA_URL.to_string(),
        sample: 4,
        ..VerifierOptions::default()
    }
}

pub fn options_with_pq() -> VerifierOptions {
    VerifierOptions {
        quantized_check: true,
        ..options()
    }
}

pub fn models_reply(dim: usize) -> MockReply {
    MockReply::Json(
        200,
        json!({"models": [
            {"id": "mini-test", "input_dim": 384},
            {"id": MODEL_ID, "input_dim": dim}
        ]}),
    )
}

pub fn batch_reply(rows: usize, out_dim: usize) -> MockReply {
    let compressed: Vec<Vec<f32>> = (0..rows).map(|i| vec![0.25 + i as f32; out_dim]).collect();
    MockReply::Json(
        200,
        json!({
            "compressed": compressed,
            "metadata": {"compressionRatio": 29.3, "originalDim": DIM, "compressedDim": out_dim}
        }),
    )
}

/// An API where every step passes
pub fn healthy_api() -> MockTransport {
    api_with_data(encode_aqed(&real_vectors(32, DIM)))
}

/// Healthy API serving the given dataset bytes
pub fn api_with_data(data: Vec<u8>) -> MockTransport {
    MockTransport::new()
        .with_api_key(API_KEY)
        .route(Method::Get, "/health", MockReply::Json(200, json!({"status": "ok"})))
        .route(Method::Get, "/api/v1/models", models_reply(DIM))
        .route(Method::Get, DATA_PATH, MockReply::Bytes(data))
        .route(
            Method::Get,
            "/api/v1/auth/verify",
            MockReply::Json(200, json!({"valid": true, "quota_used": 12, "quota_limit": 1000})),
        )
        .route(Method::Post, "/api/v1/compress/batch", batch_reply(4, 2))
        .route(
            Method::Post,
            "/api/v1/compress-pq",
            MockReply::Json(
                200,
                json!({"codes": [3, 1, 4, 1], "metadata": {"expectedQuality": 0.95, "compressionRatio": 117.0}}),
            ),
        )
}

/// Write files (relative path, contents) under `root`
pub fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (rel, contents) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }
}

/// A typical report artifact tree
pub fn artifact_tree(root: &Path) {
    write_tree(
        root,
        &[
            ("benchmark/results.json", br#"{"rows":[{"name":"Original","x":1,"q":81.0}]}"#),
            ("docs/FINAL_BENCHMARK_TRUTH.md", b"# Truth\n"),
            ("data/stsb_pairs.json", b"[[0.1, 0.2], [0.3, 0.4]]"),
            ("data/nested/deep/sts12.json", b"[]"),
        ],
    );
}
