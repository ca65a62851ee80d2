//! Deterministic SVG rendering
//!
//! Output depends only on the figure spec and series: no timestamps, no ids,
//! every coordinate printed with two decimals and `-0.00` folded to `0.00`.

use std::fmt::Write as _;

use super::extract::FigureSeries;
use super::plan::{FigureKind, FigureSpec, XScale};
use super::FigureError;

const FONT: &str = "Inter, Arial, sans-serif";
const TICKS: usize = 5;

struct Frame {
    width: f64,
    height: f64,
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
}

impl Frame {
    fn plot_width(&self) -> f64 {
        self.width - self.left - self.right
    }

    fn plot_height(&self) -> f64 {
        self.height - self.top - self.bottom
    }

    fn baseline(&self) -> f64 {
        self.height - self.bottom
    }
}

const LINE_FRAME: Frame = Frame {
    width: 720.0,
    height: 420.0,
    left: 70.0,
    right: 30.0,
    top: 55.0,
    bottom: 50.0,
};

const BAR_FRAME: Frame = Frame {
    width: 820.0,
    height: 420.0,
    left: 70.0,
    right: 30.0,
    top: 55.0,
    bottom: 70.0,
};

/// Fixed-precision coordinate
pub fn num(value: f64) -> String {
    let text = format!("{:.2}", value);
    if text == "-0.00" {
        "0.00".to_string()
    } else {
        text
    }
}

/// Value label with one decimal
fn value_text(value: f64, suffix: &str) -> String {
    let text = format!("{:.1}", value);
    let text = if text == "-0.0" { "0.0".to_string() } else { text };
    format!("{}{}", text, suffix)
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Data range widened to be non-empty
fn range(values: impl Iterator<Item = f64>, lo: Option<f64>, hi: Option<f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), v| (a.min(v), b.max(v)));
    let lo = lo.unwrap_or(min);
    let hi = hi.unwrap_or(max);
    if hi > lo {
        (lo, hi)
    } else {
        (lo - 1.0, lo + 1.0)
    }
}

fn text(out: &mut String, x: f64, y: f64, size: u32, fill: &str, anchor: Option<&str>, body: &str) {
    let anchor = anchor.map(|a| format!(" text-anchor=\"{}\"", a)).unwrap_or_default();
    let _ = write!(
        out,
        "<text x=\"{}\" y=\"{}\"{} font-family=\"{}\" font-size=\"{}\" fill=\"{}\">{}</text>",
        num(x),
        num(y),
        anchor,
        FONT,
        size,
        fill,
        escape(body)
    );
}

fn line(out: &mut String, x1: f64, y1: f64, x2: f64, y2: f64, stroke: &str) {
    let _ = write!(
        out,
        "<line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"{}\" stroke-width=\"1\"/>",
        num(x1),
        num(y1),
        num(x2),
        num(y2),
        stroke
    );
}

fn header(out: &mut String, frame: &Frame, spec: &FigureSpec) {
    let _ = write!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\
         <rect width=\"{w}\" height=\"{h}\" fill=\"white\"/>",
        w = frame.width,
        h = frame.height
    );
    text(out, frame.left, 24.0, 16, "#111", None, &spec.title);
    text(out, frame.left, 40.0, 11, "#555", None, &spec.subtitle_text());
}

fn axes(out: &mut String, frame: &Frame, spec: &FigureSpec) {
    let base = frame.baseline();
    line(out, frame.left, base, frame.width - frame.right, base, "#111");
    line(out, frame.left, base, frame.left, frame.top, "#111");
    if !spec.x_label.is_empty() {
        text(out, frame.left, frame.height - 10.0, 11, "#333", None, &spec.x_label);
    }
    if !spec.y_label.is_empty() {
        text(out, 12.0, frame.top - 4.0, 11, "#333", None, &spec.y_label);
    }
}

fn y_grid(out: &mut String, frame: &Frame, y_lo: f64, y_hi: f64, ymap: &dyn Fn(f64) -> f64) {
    for i in 0..TICKS {
        let value = y_lo + (y_hi - y_lo) * i as f64 / (TICKS - 1) as f64;
        let y = ymap(value);
        line(out, frame.left, y, frame.width - frame.right, y, "#e5e7eb");
        text(out, frame.left - 10.0, y + 4.0, 11, "#333", Some("end"), &value_text(value, ""));
    }
}

/// Render a figure to SVG text
pub fn render(spec: &FigureSpec, series: &FigureSeries) -> Result<String, FigureError> {
    if series.points.is_empty() {
        return Err(FigureError::EmptySeries(series.source_path.clone()));
    }
    match spec.kind {
        FigureKind::Line => render_line(spec, series),
        FigureKind::Bar => Ok(render_bar(spec, series)),
    }
}

fn render_line(spec: &FigureSpec, series: &FigureSeries) -> Result<String, FigureError> {
    let frame = &LINE_FRAME;
    let log = spec.x_scale == XScale::Log10;
    if log {
        let bad = series
            .points
            .iter()
            .map(|p| p.x)
            .chain(spec.x_min)
            .chain(spec.x_max)
            .find(|x| *x <= 0.0);
        if let Some(x) = bad {
            return Err(FigureError::NonPositiveLogX {
                figure: spec.id.clone(),
                x,
            });
        }
    }
    let scale = |x: f64| if log { x.log10() } else { x };

    let (x_lo, x_hi) = range(
        series.points.iter().map(|p| scale(p.x)),
        spec.x_min.map(scale),
        spec.x_max.map(scale),
    );
    let (y_lo, y_hi) = range(series.points.iter().map(|p| p.y), spec.y_min, spec.y_max);
    let xmap = |x: f64| frame.left + (scale(x) - x_lo) / (x_hi - x_lo) * frame.plot_width();
    let ymap = |y: f64| frame.top + (y_hi - y) / (y_hi - y_lo) * frame.plot_height();

    let mut out = String::new();
    header(&mut out, frame, spec);
    y_grid(&mut out, frame, y_lo, y_hi, &ymap);

    let x_ticks: Vec<f64> = if log {
        // Decades an f64 can hold, subnormals included
        let e_lo = (x_lo.floor() as i32).max(-324);
        let e_hi = (x_hi.ceil() as i32).min(f64::MAX_10_EXP);
        let mut ticks = Vec::new();
        for e in e_lo..=e_hi {
            for mantissa in [1.0, 3.0] {
                let tick = mantissa * 10f64.powi(e);
                if !tick.is_finite() || tick <= 0.0 {
                    continue;
                }
                let t = tick.log10();
                if t >= x_lo - 1e-9 && t <= x_hi + 1e-9 {
                    ticks.push(tick);
                }
            }
        }
        ticks
    } else {
        (0..TICKS)
            .map(|i| x_lo + (x_hi - x_lo) * i as f64 / (TICKS - 1) as f64)
            .collect()
    };
    for tick in x_ticks {
        let x = xmap(tick);
        line(&mut out, x, frame.top, x, frame.baseline(), "#f3f4f6");
        let label = if log { num(tick) } else { value_text(tick, "") };
        text(&mut out, x, frame.baseline() + 18.0, 11, "#333", Some("middle"), &label);
    }
    axes(&mut out, frame, spec);

    let path: Vec<String> = series
        .points
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{} {} {}", if i == 0 { "M" } else { "L" }, num(xmap(p.x)), num(ymap(p.y))))
        .collect();
    let _ = write!(
        out,
        "<path d=\"{}\" stroke=\"#111\" stroke-width=\"2\" fill=\"none\" stroke-linecap=\"round\"/>",
        path.join(" ")
    );
    for p in &series.points {
        let _ = write!(
            out,
            "<circle cx=\"{}\" cy=\"{}\" r=\"6\" fill=\"{}\"/>",
            num(xmap(p.x)),
            num(ymap(p.y)),
            escape(&spec.color)
        );
    }
    for p in &series.points {
        let value = value_text(p.y, &spec.value_suffix);
        let body = match &p.label {
            Some(label) => format!("{} ({})", label, value),
            None => value,
        };
        text(&mut out, xmap(p.x) + 10.0, ymap(p.y) - 10.0, 12, "#111", None, &body);
    }
    out.push_str("</svg>\n");
    Ok(out)
}

fn render_bar(spec: &FigureSpec, series: &FigureSeries) -> String {
    let frame = &BAR_FRAME;
    let lo_default = series.points.iter().map(|p| p.y).fold(0.0_f64, f64::min);
    let (y_lo, y_hi) = range(
        series.points.iter().map(|p| p.y).chain(std::iter::once(lo_default)),
        spec.y_min,
        spec.y_max,
    );
    let ymap = |y: f64| frame.top + (y_hi - y.clamp(y_lo, y_hi)) / (y_hi - y_lo) * frame.plot_height();

    let n = series.points.len() as f64;
    let gap = 12.0;
    let bar_w = ((frame.plot_width() - gap * (n - 1.0)) / n).max(1.0);

    let mut out = String::new();
    header(&mut out, frame, spec);
    y_grid(&mut out, frame, y_lo, y_hi, &ymap);
    axes(&mut out, frame, spec);

    for (i, p) in series.points.iter().enumerate() {
        let x = frame.left + i as f64 * (bar_w + gap);
        let y = ymap(p.y);
        let height = frame.baseline() - y;
        let _ = write!(
            out,
            "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\"/>",
            num(x),
            num(y),
            num(bar_w),
            num(height),
            escape(&spec.color)
        );
        let center = x + bar_w / 2.0;
        text(&mut out, center, y - 8.0, 11, "#111", Some("middle"), &value_text(p.y, &spec.value_suffix));
        let label = p.label.clone().unwrap_or_else(|| value_text(p.x, ""));
        text(&mut out, center, frame.baseline() + 22.0, 11, "#111", Some("middle"), &label);
    }
    out.push_str("</svg>\n");
    out
}
