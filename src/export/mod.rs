use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::dataset::Label;
use crate::error::PipelineError;
use crate::pipeline::EmbeddingTable;
use crate::projection::Point2;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
        }
    }

    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }
}

/// One projected row for export
#[derive(Debug, Serialize)]
pub struct ExportedPoint {
    pub row: usize,
    pub label: Label,
    pub class_name: String,
    pub image_name: String,
    pub step: usize,
    pub x: f32,
    pub y: f32,
}

/// Export projected points with their labels to a file
pub fn export_points(
    points: &[Point2],
    table: &EmbeddingTable,
    output_path: &Path,
    format: ExportFormat,
) -> Result<usize> {
    let exported = collect_points(points, table)?;
    let count = exported.len();

    match format {
        ExportFormat::Json => export_json(&exported, output_path)?,
        ExportFormat::Csv => export_csv(&exported, output_path)?,
    }

    tracing::info!(path = ?output_path, format = format.name(), count, "Points exported");
    Ok(count)
}

/// Resolve the configured format, falling back to the path extension.
pub fn resolve_format(output_path: &Path, format: Option<ExportFormat>) -> Result<ExportFormat> {
    format
        .or_else(|| ExportFormat::from_path(output_path))
        .ok_or_else(|| {
            anyhow!(
                "Cannot infer export format for {}, use a .csv or .json extension",
                output_path.display()
            )
        })
}

fn collect_points(points: &[Point2], table: &EmbeddingTable) -> Result<Vec<ExportedPoint>> {
    if points.len() != table.len() {
        return Err(PipelineError::ProjectionLength {
            projected: points.len(),
            rows: table.len(),
        }
        .into());
    }

    let groups = table.groups();
    Ok(table
        .rows()
        .iter()
        .zip(points)
        .enumerate()
        .map(|(i, (row, point))| {
            let group = &groups[row.sample];
            ExportedPoint {
                row: i,
                label: row.label,
                class_name: group.class_name.clone(),
                image_name: group.image_name.clone(),
                step: row.step,
                x: point[0],
                y: point[1],
            }
        })
        .collect())
}

fn export_json(points: &[ExportedPoint], output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(points)?;
    let mut file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn export_csv(points: &[ExportedPoint], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;

    // Write headers
    wtr.write_record(["row", "label", "class_name", "image_name", "step", "x", "y"])?;

    for point in points {
        wtr.write_record(&[
            point.row.to_string(),
            point.label.to_string(),
            point.class_name.clone(),
            point.image_name.clone(),
            point.step.to_string(),
            point.x.to_string(),
            point.y.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
