//! Scatter plot of the projected embeddings.

mod font;
mod palette;

pub use palette::{parse_hex_color, Palette};

use anyhow::{Context, Result};
use plotters::prelude::*;
use std::collections::HashSet;
use std::ops::Range;

use crate::config::PlotConfig;
use crate::dataset::Label;
use crate::error::PipelineError;
use crate::pipeline::EmbeddingTable;
use crate::projection::Point2;

/// Plot every row of `table` at its projected point and write the PNG to
/// `config.output`, replacing any existing file.
///
/// Class rows are drawn per sample group in the palette colour of their class
/// index; OOD rows are drawn together in `config.ood_color`.
pub fn render_scatter(points: &[Point2], table: &EmbeddingTable, config: &PlotConfig) -> Result<()> {
    if points.len() != table.len() {
        return Err(PipelineError::ProjectionLength {
            projected: points.len(),
            rows: table.len(),
        }
        .into());
    }

    let palette = Palette::default();
    let ood_color = parse_hex_color(&config.ood_color)?;
    let with_text = font::ensure_font(config.font.as_deref());
    let legend = with_text && config.legend;

    if let Some(parent) = config.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let (width, height) = config.pixel_size();
    let root = BitMapBackend::new(&config.output, (width, height)).into_drawing_area();
    root.fill(&WHITE)?;

    let (x_range, y_range) = axis_ranges(points);
    let mut builder = ChartBuilder::on(&root);
    builder.margin(20);
    if with_text {
        builder
            .caption(&config.title, (font::FAMILY, 28).into_font())
            .x_label_area_size(50)
            .y_label_area_size(60);
    }
    let mut chart = builder.build_cartesian_2d(x_range, y_range)?;

    if with_text {
        chart
            .configure_mesh()
            .x_desc("TSNE Dimension 1")
            .y_desc("TSNE Dimension 2")
            .label_style((font::FAMILY, 14).into_font())
            .draw()?;
    }

    let alpha = config.alpha;
    let radius = config.point_radius;
    let mut labelled = HashSet::new();

    for group in table.groups() {
        let Label::Class(class_index) = group.label else {
            continue;
        };
        let color = palette.color(class_index);

        let series = chart.draw_series(
            points[group.range()]
                .iter()
                .map(|p| Circle::new((p[0], p[1]), radius, color.mix(alpha).filled())),
        )?;

        if legend && labelled.insert(class_index) {
            series
                .label(format!("Folder: {}", group.class_name))
                .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
        }
    }

    let ood_points: Vec<Point2> = table
        .rows()
        .iter()
        .zip(points)
        .filter(|(row, _)| row.label.is_ood())
        .map(|(_, p)| *p)
        .collect();

    if !ood_points.is_empty() {
        let series = chart.draw_series(
            ood_points
                .iter()
                .map(|p| Circle::new((p[0], p[1]), radius, ood_color.mix(alpha).filled())),
        )?;
        if legend {
            series
                .label("Out-of-distribution")
                .legend(move |(x, y)| Circle::new((x, y), 4, ood_color.filled()));
        }
    }

    if legend {
        chart
            .configure_series_labels()
            .label_font((font::FAMILY, 14).into_font())
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()
        .with_context(|| format!("Failed to write plot {}", config.output.display()))?;

    tracing::info!(
        path = ?config.output,
        points = points.len(),
        ood = ood_points.len(),
        "Scatter plot written"
    );

    Ok(())
}

/// Data bounds per axis with a 5% margin.
fn axis_ranges(points: &[Point2]) -> (Range<f32>, Range<f32>) {
    let span = |axis: usize| {
        let (min, max) = points
            .iter()
            .map(|p| p[axis])
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });

        if min > max {
            return -1.0..1.0;
        }
        let pad = if max > min { (max - min) * 0.05 } else { 1.0 };
        (min - pad)..(max + pad)
    };

    (span(0), span(1))
}
