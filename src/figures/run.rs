//! Plan execution: one outcome per figure plus `figures_data.json`

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use repro_manifest::Manifest;

use super::extract::{extract_series, FigureSeries};
use super::plan::{FigurePlan, FigureSpec};
use super::svg::render;
use super::FigureError;
use crate::exit::ExitCode;

/// Canonical data file written next to the figures
pub const FIGURES_DATA_FILE: &str = "figures_data.json";

/// Schema identifier of `figures_data.json`
pub const FIGURES_DATA_SCHEMA_ID: &str = "repro/figures_data@1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FigureStatus {
    Ok,
    Failed,
}

/// Result for one figure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureOutcome {
    pub id: String,
    pub status: FigureStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub svg_path: Option<String>,
    pub points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FigureOutcome {
    pub fn progress_line(&self) -> String {
        match self.status {
            FigureStatus::Ok => format!(
                "OK    {}  {} point(s)  {}",
                self.id,
                self.points,
                self.svg_path.as_deref().unwrap_or("")
            ),
            FigureStatus::Failed => format!("FAIL  {}  {}", self.id, self.error.as_deref().unwrap_or("")),
        }
    }
}

/// Result of a whole plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub outcomes: Vec<FigureOutcome>,
    pub data_path: String,
}

impl ExtractionReport {
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == FigureStatus::Failed)
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::Success
        } else {
            ExitCode::VerificationFailed
        }
    }
}

/// A rendered figure and the provenance of its data
#[derive(Debug, Clone)]
pub struct RenderedFigure {
    pub series: FigureSeries,
    pub svg: String,
    /// SHA-256 of the source file bytes
    pub source_sha256: String,
}

/// Extracts series and renders figures for a plan over an artifact root
pub struct FigureExtractor<'a> {
    root: &'a Path,
    manifest: Option<&'a Manifest>,
}

impl<'a> FigureExtractor<'a> {
    pub fn new(root: &'a Path) -> Self {
        Self { root, manifest: None }
    }

    /// Only accept sources recorded with matching digests in `manifest`
    pub fn with_manifest(mut self, manifest: &'a Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Build one figure without writing anything
    pub fn build(&self, spec: &FigureSpec) -> Result<RenderedFigure, FigureError> {
        let path = self.root.join(&spec.source.path);
        let bytes = fs::read(&path).map_err(|e| FigureError::Io {
            path: spec.source.path.clone(),
            source: e,
        })?;
        let source_sha256 = hex::encode(Sha256::digest(&bytes));

        if let Some(manifest) = self.manifest {
            let record = manifest
                .get(&spec.source.path)
                .ok_or_else(|| FigureError::NotInManifest(spec.source.path.clone()))?;
            if record.sha256 != source_sha256 {
                return Err(FigureError::DigestMismatch {
                    path: spec.source.path.clone(),
                    expected: record.sha256.clone(),
                    actual: source_sha256,
                });
            }
        }

        let text = String::from_utf8(bytes).map_err(|_| FigureError::SourceNotUtf8(spec.source.path.clone()))?;
        let series = extract_series(&spec.id, &spec.source, &text)?;
        let svg = render(spec, &series)?;
        Ok(RenderedFigure {
            series,
            svg,
            source_sha256,
        })
    }

    /// Run every figure, write SVGs and `figures_data.json` into `out_dir`
    ///
    /// A failing figure is recorded and the rest still run. Only a failure
    /// to create `out_dir` or write the data file aborts the run.
    pub fn run(&self, plan: &FigurePlan, out_dir: &Path) -> Result<ExtractionReport, FigureError> {
        fs::create_dir_all(out_dir).map_err(|e| FigureError::Io {
            path: out_dir.display().to_string(),
            source: e,
        })?;

        let mut outcomes = Vec::with_capacity(plan.figures.len());
        let mut data = Vec::new();

        for spec in &plan.figures {
            let result = self.build(spec).and_then(|figure| {
                let svg_path: PathBuf = out_dir.join(spec.svg_file_name());
                fs::write(&svg_path, &figure.svg).map_err(|e| FigureError::Io {
                    path: svg_path.display().to_string(),
                    source: e,
                })?;
                Ok((figure, svg_path))
            });

            match result {
                Ok((figure, svg_path)) => {
                    debug!(figure = %spec.id, points = figure.series.points.len(), "figure written");
                    outcomes.push(FigureOutcome {
                        id: spec.id.clone(),
                        status: FigureStatus::Ok,
                        svg_path: Some(svg_path.display().to_string()),
                        points: figure.series.points.len(),
                        error: None,
                    });
                    data.push(json!({
                        "id": spec.id,
                        "title": spec.title,
                        "kind": spec.kind,
                        "svg": spec.svg_file_name(),
                        "source": {
                            "path": figure.series.source_path,
                            "field": figure.series.source_field,
                            "sha256": figure.source_sha256,
                        },
                        "points": figure.series.points,
                    }));
                }
                Err(err) => {
                    warn!(figure = %spec.id, error = %err, "figure failed");
                    outcomes.push(FigureOutcome {
                        id: spec.id.clone(),
                        status: FigureStatus::Failed,
                        svg_path: None,
                        points: 0,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let document = json!({
            "schema_id": FIGURES_DATA_SCHEMA_ID,
            "figures": data,
        });
        let bytes = serde_json_canonicalizer::to_vec(&document).map_err(|e| FigureError::Jcs(e.to_string()))?;
        let data_path = out_dir.join(FIGURES_DATA_FILE);
        fs::write(&data_path, bytes).map_err(|e| FigureError::Io {
            path: data_path.display().to_string(),
            source: e,
        })?;

        Ok(ExtractionReport {
            outcomes,
            data_path: data_path.display().to_string(),
        })
    }
}
