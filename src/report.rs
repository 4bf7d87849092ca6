//! SVG comparison charts
//!
//! One panel per workload in batch order, one line per variant, mean latency
//! against invocation number.

use std::path::Path;

use plotters::prelude::*;

use crate::aggregate::AveragedRecord;
use crate::storage::group_by_workload;
use crate::{Error, Result};

/// Invocations shown by the zoomed chart.
pub const ZOOM_INVOCATIONS: u32 = 30;

const PANEL_WIDTH: u32 = 600;
const PANEL_HEIGHT: u32 = 400;

/// Render `records` to an SVG file.
///
/// `max_invocation` limits the x axis (e.g. to inspect warm-up only).
///
/// # Errors
///
/// Returns [`Error::Report`] when there is nothing to draw or drawing fails.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn render_comparison(records: &[AveragedRecord], path: &Path, max_invocation: Option<u32>) -> Result<()> {
    let groups = group_by_workload(records);
    if groups.is_empty() {
        return Err(Error::Report("no averaged records to plot".to_string()));
    }

    let cols = if groups.len() > 1 { 2 } else { 1 };
    let rows = groups.len().div_ceil(cols);
    let size = (PANEL_WIDTH * cols as u32, PANEL_HEIGHT * rows as u32);

    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(report_error)?;
    let panels = root.split_evenly((rows, cols));

    for (area, (workload, series_rows)) in panels.iter().zip(&groups) {
        let last = series_rows.iter().map(|r| r.invocation).max().unwrap_or(1);
        let x_max = max_invocation.map_or(last, |m| m.min(last)).max(1);
        let visible: Vec<&&AveragedRecord> = series_rows.iter().filter(|r| r.invocation <= x_max).collect();
        let y_max = visible
            .iter()
            .flat_map(|r| r.means.iter().map(|(_, m)| *m))
            .fold(0.0_f64, f64::max)
            .max(1.0)
            * 1.05;

        let mut chart = ChartBuilder::on(area)
            .caption(*workload, ("sans-serif", 18))
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(60)
            .build_cartesian_2d(1u32..x_max.max(2), 0f64..y_max)
            .map_err(report_error)?;
        chart
            .configure_mesh()
            .x_desc("Invocation #")
            .y_desc("Latency (µs)")
            .draw()
            .map_err(report_error)?;

        let mut variants: Vec<&str> = Vec::new();
        for record in &visible {
            for (label, _) in &record.means {
                if !variants.contains(&label.as_str()) {
                    variants.push(label);
                }
            }
        }

        for (index, variant) in variants.iter().enumerate() {
            let style = Palette99::pick(index).stroke_width(2);
            let points = visible
                .iter()
                .filter_map(|r| r.mean(variant).map(|m| (r.invocation, m)));
            chart
                .draw_series(LineSeries::new(points, style))
                .map_err(report_error)?
                .label(*variant)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
        }
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(report_error)?;
    }

    root.present().map_err(report_error)?;
    tracing::info!(path = %path.display(), "chart written");
    Ok(())
}

/// Render the full-range and zoomed charts into `dir`.
///
/// # Errors
///
/// See [`render_comparison`].
pub fn render_batch(records: &[AveragedRecord], dir: &Path) -> Result<()> {
    render_comparison(records, &dir.join("avg.svg"), None)?;
    render_comparison(records, &dir.join(format!("avg_first_{ZOOM_INVOCATIONS}.svg")), Some(ZOOM_INVOCATIONS))
}

fn report_error<E: std::fmt::Display>(e: E) -> Error {
    Error::Report(e.to_string())
}
