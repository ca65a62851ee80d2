//! Figure plan (TOML)
//!
//! ```toml
//! [[figure]]
//! id = "intrinsic_29x_models"
//! title = "Intrinsic retention at ~29x"
//! kind = "bar"
//! y_label = "Spearman vs original (%)"
//! y_min = 80.0
//! y_max = 100.0
//! value_suffix = "%"
//!
//! [figure.source]
//! path = "docs/FINAL_BENCHMARK_TRUTH.md"
//! format = "markdown"
//! section_start = 'Verified\s+results'
//! section_end = '^##\s+'
//! x_column = 0
//! y_column = 3
//! y_parser = "percent"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path};

use super::FigureError;

pub const DEFAULT_COLOR: &str = "#10b981";

/// How a figure is drawn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FigureKind {
    /// Points joined in source order over a numeric x axis
    Line,
    /// One bar per point, labelled by category
    #[default]
    Bar,
}

/// Scale of the x axis for line figures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XScale {
    #[default]
    Linear,
    Log10,
}

/// Cell/field value parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueParser {
    /// First decimal number in the text
    Number,
    /// `71.8%` -> 71.8
    Percent,
    /// `117x` or `117×` -> 117.0
    Ratio,
    /// Text used as a category label; x becomes the row index
    Label,
}

/// Where a source file keeps its series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum SourceFormat {
    /// Array of JSON records
    Json {
        /// JSON pointer to the array (`""` for a top-level array)
        #[serde(default)]
        pointer: String,
        /// Pointer to x within each record; absent means the record index
        #[serde(default)]
        x: Option<String>,
        /// Pointer to y within each record
        y: String,
        /// Pointer to a category label within each record
        #[serde(default)]
        label: Option<String>,
    },
    /// First Markdown table inside a heading-delimited section
    Markdown {
        section_start: String,
        #[serde(default = "default_section_end")]
        section_end: String,
        /// Only rows whose first cell matches are kept
        #[serde(default)]
        row_pattern: Option<String>,
        x_column: usize,
        y_column: usize,
    },
}

fn default_section_end() -> String {
    r"^##\s+".to_string()
}

/// Source of one figure's series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Path relative to the artifact root
    pub path: String,

    #[serde(flatten)]
    pub format: SourceFormat,

    #[serde(default)]
    pub x_parser: Option<ValueParser>,

    #[serde(default)]
    pub y_parser: Option<ValueParser>,
}

impl SourceSpec {
    pub fn x_parser(&self) -> ValueParser {
        self.x_parser.unwrap_or(match self.format {
            SourceFormat::Json { .. } => ValueParser::Number,
            SourceFormat::Markdown { .. } => ValueParser::Label,
        })
    }

    pub fn y_parser(&self) -> ValueParser {
        self.y_parser.unwrap_or(ValueParser::Number)
    }
}

/// One figure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FigureSpec {
    /// Output file stem; `[A-Za-z0-9_-]+`
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub kind: FigureKind,
    #[serde(default)]
    pub x_scale: XScale,
    #[serde(default)]
    pub x_label: String,
    #[serde(default)]
    pub y_label: String,
    #[serde(default)]
    pub x_min: Option<f64>,
    #[serde(default)]
    pub x_max: Option<f64>,
    #[serde(default)]
    pub y_min: Option<f64>,
    #[serde(default)]
    pub y_max: Option<f64>,
    #[serde(default = "default_color")]
    pub color: String,
    /// Appended to rendered values, e.g. `%`
    #[serde(default)]
    pub value_suffix: String,
    pub source: SourceSpec,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

impl FigureSpec {
    pub fn subtitle_text(&self) -> String {
        self.subtitle
            .clone()
            .unwrap_or_else(|| format!("Source: {}", self.source.path))
    }

    pub fn svg_file_name(&self) -> String {
        format!("{}.svg", self.id)
    }
}

/// A complete figure plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FigurePlan {
    #[serde(rename = "figure", default)]
    pub figures: Vec<FigureSpec>,
}

impl FigurePlan {
    pub fn parse(text: &str) -> Result<Self, FigureError> {
        let mut plan: FigurePlan = toml::from_str(text).map_err(|e| FigureError::Plan(e.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn from_file(path: &Path) -> Result<Self, FigureError> {
        let text = fs::read_to_string(path).map_err(|e| FigureError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&text)
    }

    /// Checks ids and ranges; rewrites each source path to its manifest form
    fn validate(&mut self) -> Result<(), FigureError> {
        if self.figures.is_empty() {
            return Err(FigureError::Plan("plan declares no [[figure]] entries".to_string()));
        }
        let mut seen = BTreeSet::new();
        for figure in &mut self.figures {
            let valid_id = !figure.id.is_empty()
                && figure
                    .id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid_id {
                return Err(FigureError::Plan(format!("invalid figure id {:?}", figure.id)));
            }
            if !seen.insert(figure.id.clone()) {
                return Err(FigureError::Plan(format!("duplicate figure id {:?}", figure.id)));
            }
            let normalized = normalize_source_path(&figure.source.path).ok_or_else(|| {
                FigureError::Plan(format!(
                    "figure {}: source path {:?} must be relative to the artifact root",
                    figure.id, figure.source.path
                ))
            })?;
            figure.source.path = normalized;
            if let (Some(lo), Some(hi)) = (figure.y_min, figure.y_max) {
                if lo >= hi {
                    return Err(FigureError::Plan(format!("figure {}: y_min must be below y_max", figure.id)));
                }
            }
            if let (Some(lo), Some(hi)) = (figure.x_min, figure.x_max) {
                if lo >= hi {
                    return Err(FigureError::Plan(format!("figure {}: x_min must be below x_max", figure.id)));
                }
            }
        }
        Ok(())
    }
}

/// `/`-joined normal components, the form manifest records use
///
/// `.` segments are dropped. `None` for `..`, absolute or empty paths.
fn normalize_source_path(path: &str) -> Option<String> {
    let mut parts = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
