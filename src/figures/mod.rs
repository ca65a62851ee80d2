//! Figure extraction
//!
//! Reads benchmark records already on disk (JSON arrays or Markdown tables),
//! turns them into numeric series and renders byte-stable SVG figures. A
//! broken figure fails alone; the others are still produced.

mod extract;
mod plan;
mod run;
mod svg;

pub use extract::{extract_series, markdown_table, parse_value, section_between, FigureSeries, SeriesPoint};
pub use plan::{FigureKind, FigurePlan, FigureSpec, SourceFormat, SourceSpec, ValueParser, XScale};
pub use run::{
    ExtractionReport, FigureExtractor, FigureOutcome, FigureStatus, RenderedFigure, FIGURES_DATA_FILE,
    FIGURES_DATA_SCHEMA_ID,
};
pub use svg::render;

use std::io;

/// Figure errors
#[derive(Debug, thiserror::Error)]
pub enum FigureError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid figure plan: {0}")]
    Plan(String),

    #[error("Invalid pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("{path}: no section matches {pattern:?}")]
    SectionNotFound { path: String, pattern: String },

    #[error("{path}: no Markdown table in section {pattern:?}")]
    TableNotFound { path: String, pattern: String },

    #[error("{path}: missing field {field}")]
    MissingField { path: String, field: String },

    #[error("cannot parse {value:?} as {parser:?}")]
    Unparsable { value: String, parser: ValueParser },

    #[error("{path}: invalid JSON: {reason}")]
    SourceJson { path: String, reason: String },

    #[error("{0}: source is not UTF-8")]
    SourceNotUtf8(String),

    #[error("{0}: series is empty")]
    EmptySeries(String),

    #[error("figure {figure}: log10 axis needs positive x, got {x}")]
    NonPositiveLogX { figure: String, x: f64 },

    #[error("{0}: not listed in the manifest")]
    NotInManifest(String),

    #[error("{path}: digest {actual} does not match manifest {expected}")]
    DigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("JCS canonicalization error: {0}")]
    Jcs(String),
}
