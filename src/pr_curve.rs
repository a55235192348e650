//! Precision/recall CSV loader and plotter (exercise 3).
//!
//! Two defects in the buggy path:
//!
//! 1. fields are never really converted: anything that does not parse is coerced to `0.0`, so a
//!    corrupt file still "loads" and plots garbage;
//! 2. the axes are swapped: recall lands on x and precision on y.
//!
//! The fixed path parses every field as `f64` (a bad field is an [`Error::Parse`]), refuses a
//! missing file before reading anything, and plots precision on x, recall on y.
//!
//! Plots are written as SVG files.

use std::fs;
use std::path::{Path, PathBuf};

use plotters::prelude::*;

use crate::{Error, Result};

/// Both axes span this range.
pub const AXIS_RANGE: std::ops::Range<f64> = -0.05..1.05;

const PRECISION: &str = "precision";
const RECALL: &str = "recall";

/// Precision and recall columns, equal length, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrCurve {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
}

impl PrCurve {
    pub fn len(&self) -> usize {
        self.precision.len()
    }

    pub fn is_empty(&self) -> bool {
        self.precision.is_empty()
    }
}

/// Which quantity goes on the x axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// Precision on x, recall on y.
    #[default]
    PrecisionOnX,
    /// Recall on x, precision on y (the swapped defect).
    RecallOnX,
}

impl Orientation {
    /// `(x label, y label)`; always derived from the data placement.
    pub fn labels(self) -> (&'static str, &'static str) {
        match self {
            Orientation::PrecisionOnX => ("Precision", "Recall"),
            Orientation::RecallOnX => ("Recall", "Precision"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlotOptions {
    pub title: String,
    pub orientation: Orientation,
    /// Draw the background grid.
    pub grid: bool,
    /// Image size in pixels.
    pub size: (u32, u32),
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            title: "Precision-Recall Curve".to_string(),
            orientation: Orientation::PrecisionOnX,
            grid: true,
            size: (600, 600),
        }
    }
}

struct Header {
    precision: usize,
    recall: usize,
}

/// Trim whitespace and one pair of surrounding double quotes.
fn unquote(raw: &str) -> &str {
    let raw = raw.trim();
    raw.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .map(str::trim)
        .unwrap_or(raw)
}

fn parse_header(line: &str) -> Result<Header> {
    let names: Vec<&str> = line.split(',').map(unquote).collect();
    let find = |name: &str| names.iter().position(|&n| n == name);
    match (find(PRECISION), find(RECALL)) {
        (Some(precision), Some(recall)) => Ok(Header { precision, recall }),
        _ => Err(Error::Domain(
            "csv header must name `precision` and `recall` columns",
        )),
    }
}

fn field<'a>(fields: &[&'a str], idx: usize) -> &'a str {
    fields.get(idx).copied().map(unquote).unwrap_or("")
}

fn parse_field(raw: &str, line: usize, column: &'static str) -> Result<f64> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(Error::Parse {
            line,
            column,
            value: raw.to_string(),
        }),
    }
}

fn parse_rows(
    text: &str,
    mut value: impl FnMut(&str, usize, &'static str) -> Result<f64>,
) -> Result<PrCurve> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l))
        .filter(|(_, l)| !l.trim().is_empty());

    let Some((_, header)) = lines.next() else {
        return Err(Error::Domain("csv is empty"));
    };
    let header = parse_header(header)?;

    let mut curve = PrCurve::default();
    for (line_no, line) in lines {
        let fields: Vec<&str> = line.split(',').collect();
        curve
            .precision
            .push(value(field(&fields, header.precision), line_no, PRECISION)?);
        curve
            .recall
            .push(value(field(&fields, header.recall), line_no, RECALL)?);
    }
    Ok(curve)
}

/// Parse CSV text with a `precision,recall` header (column order free).
///
/// Every field must be a finite number; blank lines are skipped.
pub fn parse_precision_recall(text: &str) -> Result<PrCurve> {
    parse_rows(text, parse_field)
}

/// Load a precision/recall CSV file.
pub fn load_precision_recall(path: impl AsRef<Path>) -> Result<PrCurve> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    parse_precision_recall(&text)
}

/// Buggy variant: fields that do not parse silently become `0.0`.
pub fn load_precision_recall_lenient(path: impl AsRef<Path>) -> Result<PrCurve> {
    let text = fs::read_to_string(path)?;
    parse_rows(&text, |raw, _, _| Ok(raw.parse().unwrap_or(0.0)))
}

/// Points in chart order for the given orientation.
pub fn chart_points(curve: &PrCurve, orientation: Orientation) -> Vec<(f64, f64)> {
    let pairs = curve.precision.iter().zip(&curve.recall);
    match orientation {
        Orientation::PrecisionOnX => pairs.map(|(&p, &r)| (p, r)).collect(),
        Orientation::RecallOnX => pairs.map(|(&p, &r)| (r, p)).collect(),
    }
}

fn plot_err(e: impl std::fmt::Display) -> Error {
    Error::Plot(e.to_string())
}

/// Render `curve` as a line + marker chart into an SVG file at `out`.
pub fn render(curve: &PrCurve, opts: &PlotOptions, out: impl AsRef<Path>) -> Result<PathBuf> {
    let out = out.as_ref();
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let points = chart_points(curve, opts.orientation);
    let (x_desc, y_desc) = opts.orientation.labels();

    let root = SVGBackend::new(out, opts.size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    {
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(&opts.title, ("sans-serif", 22.0))
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(AXIS_RANGE, AXIS_RANGE)
            .map_err(plot_err)?;

        let mut mesh = chart.configure_mesh();
        mesh.x_desc(x_desc).y_desc(y_desc);
        if !opts.grid {
            mesh.disable_mesh();
        }
        mesh.draw().map_err(plot_err)?;

        chart
            .draw_series(LineSeries::new(points.iter().copied(), &BLUE))
            .map_err(plot_err)?;
        chart
            .draw_series(points.iter().map(|&p| Circle::new(p, 3, BLUE.filled())))
            .map_err(plot_err)?;
    }
    root.present().map_err(plot_err)?;

    Ok(out.to_path_buf())
}

/// Fixed variant: strict load, precision on x, grid on.
pub fn plot_data(csv: impl AsRef<Path>, out: impl AsRef<Path>) -> Result<PathBuf> {
    let curve = load_precision_recall(csv)?;
    let opts = PlotOptions {
        title: "Precision-Recall Curve (fixed)".to_string(),
        ..PlotOptions::default()
    };
    render(&curve, &opts, out)
}

/// Buggy variant: lenient load, recall on x, no grid.
pub fn plot_data_buggy(csv: impl AsRef<Path>, out: impl AsRef<Path>) -> Result<PathBuf> {
    let curve = load_precision_recall_lenient(csv)?;
    let opts = PlotOptions {
        title: "Precision-Recall Curve (buggy)".to_string(),
        orientation: Orientation::RecallOnX,
        grid: false,
        ..PlotOptions::default()
    };
    render(&curve, &opts, out)
}

/// The curve used by the exercise, as `(precision, recall)` rows.
pub const SAMPLE_ROWS: [(f64, f64); 11] = [
    (0.013, 0.951),
    (0.376, 0.851),
    (0.441, 0.839),
    (0.570, 0.758),
    (0.635, 0.674),
    (0.721, 0.604),
    (0.837, 0.531),
    (0.860, 0.453),
    (0.962, 0.348),
    (0.982, 0.273),
    (1.0, 0.0),
];

/// Write [`SAMPLE_ROWS`] under a `precision,recall` header.
pub fn write_sample_csv(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut text = format!("{PRECISION},{RECALL}\n");
    for (p, r) in SAMPLE_ROWS {
        text.push_str(&format!("{p},{r}\n"));
    }
    fs::write(path, text)?;
    Ok(path.to_path_buf())
}
