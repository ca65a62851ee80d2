//! Series extraction from Markdown tables and JSON records

use regex_lite::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

use super::plan::{SourceFormat, SourceSpec, ValueParser};
use super::FigureError;

/// One plotted point; `label` names bar categories and line markers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Numeric series extracted for one figure, in source order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureSeries {
    pub figure_id: String,
    pub points: Vec<SeriesPoint>,
    /// Artifact path relative to the root
    pub source_path: String,
    /// Where in the source the y values came from
    pub source_field: String,
}

fn pattern(source: &str) -> Result<Regex, FigureError> {
    RegexBuilder::new(source)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .map_err(|e| FigureError::Pattern {
            pattern: source.to_string(),
            reason: e.to_string(),
        })
}

/// Text after the first `start` match up to the next `end` match (or EOF)
pub fn section_between<'t>(text: &'t str, start: &str, end: &str) -> Result<Option<&'t str>, FigureError> {
    let start_re = pattern(start)?;
    let end_re = pattern(end)?;
    let Some(m) = start_re.find(text) else {
        return Ok(None);
    };
    let rest = &text[m.end()..];
    let stop = end_re.find(rest).map_or(rest.len(), |e| e.start());
    Ok(Some(&rest[..stop]))
}

/// First Markdown table in `text`, header row included, separator row dropped
pub fn markdown_table(text: &str) -> Vec<Vec<String>> {
    let lines: Vec<&str> = text.lines().collect();
    let is_separator = |line: &str| {
        let body = line.trim().trim_start_matches('|').trim_start();
        body.starts_with(['-', ':'])
            && line
                .trim()
                .chars()
                .all(|c| matches!(c, '|' | '-' | ':' | ' ' | '\t'))
    };

    let start = lines.iter().enumerate().position(|(i, line)| {
        let t = line.trim();
        t.starts_with('|') && t.matches('|').count() >= 2 && lines.get(i + 1).is_some_and(|next| is_separator(next))
    });
    let Some(start) = start else {
        return Vec::new();
    };

    lines[start..]
        .iter()
        .take_while(|line| line.trim().starts_with('|'))
        .enumerate()
        .filter(|(i, _)| *i != 1)
        .map(|(_, line)| {
            line.trim()
                .trim_matches('|')
                .split('|')
                .map(|cell| cell.trim().to_string())
                .collect()
        })
        .collect()
}

/// Compiled pattern for a numeric parser; `None` for `Label`
fn value_regex(parser: ValueParser) -> Option<&'static Regex> {
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    static PERCENT: OnceLock<Option<Regex>> = OnceLock::new();
    static RATIO: OnceLock<Option<Regex>> = OnceLock::new();

    let (cell, pattern) = match parser {
        ValueParser::Number => (&NUMBER, r"(-?\d+(?:\.\d+)?)"),
        ValueParser::Percent => (&PERCENT, r"(-?\d+(?:\.\d+)?)\s*%"),
        ValueParser::Ratio => (&RATIO, r"(?i)(\d+(?:\.\d+)?)\s*[x×]"),
        ValueParser::Label => return None,
    };
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Parse one cell with a numeric parser
pub fn parse_value(text: &str, parser: ValueParser) -> Result<f64, FigureError> {
    let value = value_regex(parser)
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1)?.as_str().parse::<f64>().ok());
    value.filter(|v| v.is_finite()).ok_or_else(|| FigureError::Unparsable {
        value: text.to_string(),
        parser,
    })
}

fn clean_label(cell: &str) -> String {
    cell.trim().trim_matches('*').trim().to_string()
}

/// Extract a series from already-read source text
pub fn extract_series(figure_id: &str, source: &SourceSpec, text: &str) -> Result<FigureSeries, FigureError> {
    let (points, source_field) = match &source.format {
        SourceFormat::Markdown {
            section_start,
            section_end,
            row_pattern,
            x_column,
            y_column,
        } => extract_markdown(source, text, section_start, section_end, row_pattern.as_deref(), *x_column, *y_column)?,
        SourceFormat::Json { pointer, x, y, label } => {
            let doc: Value = serde_json::from_str(text).map_err(|e| FigureError::SourceJson {
                path: source.path.clone(),
                reason: e.to_string(),
            })?;
            extract_json(source, &doc, pointer, x.as_deref(), y, label.as_deref())?
        }
    };

    if points.is_empty() {
        return Err(FigureError::EmptySeries(source.path.clone()));
    }
    Ok(FigureSeries {
        figure_id: figure_id.to_string(),
        points,
        source_path: source.path.clone(),
        source_field,
    })
}

fn extract_markdown(
    source: &SourceSpec,
    text: &str,
    start: &str,
    end: &str,
    row_pattern: Option<&str>,
    x_column: usize,
    y_column: usize,
) -> Result<(Vec<SeriesPoint>, String), FigureError> {
    let section = section_between(text, start, end)?.ok_or_else(|| FigureError::SectionNotFound {
        path: source.path.clone(),
        pattern: start.to_string(),
    })?;
    let table = markdown_table(section);
    let Some((header, rows)) = table.split_first() else {
        return Err(FigureError::TableNotFound {
            path: source.path.clone(),
            pattern: start.to_string(),
        });
    };
    let filter = row_pattern.map(pattern).transpose()?;

    let column = |row: &[String], index: usize| -> Result<String, FigureError> {
        row.get(index).cloned().ok_or_else(|| FigureError::MissingField {
            path: source.path.clone(),
            field: format!("column {}", index),
        })
    };

    let mut points = Vec::new();
    for row in rows {
        if let Some(re) = &filter {
            if !row.first().is_some_and(|c| re.is_match(c)) {
                continue;
            }
        }
        let x_cell = column(row, x_column)?;
        let y_cell = column(row, y_column)?;
        let (x, label) = match source.x_parser() {
            ValueParser::Label => (points.len() as f64, Some(clean_label(&x_cell))),
            parser => (parse_value(&x_cell, parser)?, None),
        };
        let y = parse_value(&y_cell, source.y_parser())?;
        points.push(SeriesPoint { x, y, label });
    }

    let y_header = header.get(y_column).map_or("", String::as_str);
    Ok((points, format!("/{}/{}", start, y_header)))
}

fn json_number(record: &Value, field: &str, parser: ValueParser, path: &str) -> Result<f64, FigureError> {
    let value = record.pointer(field).ok_or_else(|| FigureError::MissingField {
        path: path.to_string(),
        field: field.to_string(),
    })?;
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).ok_or_else(|| FigureError::Unparsable {
            value: n.to_string(),
            parser,
        }),
        Value::String(s) => parse_value(s, parser),
        other => Err(FigureError::Unparsable {
            value: other.to_string(),
            parser,
        }),
    }
}

fn extract_json(
    source: &SourceSpec,
    doc: &Value,
    pointer: &str,
    x: Option<&str>,
    y: &str,
    label: Option<&str>,
) -> Result<(Vec<SeriesPoint>, String), FigureError> {
    let records = doc
        .pointer(pointer)
        .and_then(Value::as_array)
        .ok_or_else(|| FigureError::MissingField {
            path: source.path.clone(),
            field: if pointer.is_empty() { "/".to_string() } else { pointer.to_string() },
        })?;

    let mut points = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let x = match (x, source.x_parser()) {
            (Some(field), parser) if parser != ValueParser::Label => json_number(record, field, parser, &source.path)?,
            _ => index as f64,
        };
        let y = json_number(record, y, source.y_parser(), &source.path)?;
        let label = match label {
            Some(field) => {
                let value = record.pointer(field).ok_or_else(|| FigureError::MissingField {
                    path: source.path.clone(),
                    field: field.to_string(),
                })?;
                Some(match value {
                    Value::String(s) => clean_label(s),
                    other => other.to_string(),
                })
            }
            None => None,
        };
        points.push(SeriesPoint { x, y, label });
    }
    Ok((points, format!("{}/*{}", pointer, y)))
}
