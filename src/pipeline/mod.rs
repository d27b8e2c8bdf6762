//! Loader -> Embedder -> Aggregator -> Projector -> Renderer, in one pass.
//!
//! Every stage returns an owned value that the next stage consumes; nothing
//! is accumulated outside the values passed along.

mod aggregate;

pub use aggregate::{collect_embeddings, EmbeddedRow, EmbeddingTable, SampleGroup};

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::clip::{load_image, ClipVisionEncoder, ImageEncoder};
use crate::config::Config;
use crate::dataset::{load_dataset, Dataset, SampleKind};
use crate::error::PipelineError;
use crate::export::{export_points, resolve_format};
use crate::projection::{DimensionReducer, Tsne};
use crate::render::render_scatter;

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub in_distribution_samples: usize,
    pub ood_samples: usize,
    pub rows: usize,
    pub dim: usize,
    pub plot: PathBuf,
    pub exported: Option<(PathBuf, usize)>,
}

/// Run the whole pipeline with the CLIP encoder described by `config.model`.
pub fn run(config: &Config) -> Result<RunSummary> {
    let dataset = load_dataset(config)?;
    ensure_not_empty(config, &dataset)?;

    let mut encoder = ClipVisionEncoder::from_config(&config.model_path(), &config.model)?;
    run_with_encoder(config, &dataset, &mut encoder)
}

/// Run the pipeline over an already enumerated dataset with any encoder.
pub fn run_with_encoder<E>(config: &Config, dataset: &Dataset, encoder: &mut E) -> Result<RunSummary>
where
    E: ImageEncoder + ?Sized,
{
    ensure_not_empty(config, dataset)?;

    let table = collect_embeddings(&dataset.samples, encoder, load_image)?;
    let matrix = table.matrix()?;

    let mut reducer = Tsne::new(config.projection.clone());
    let points = reducer
        .fit_transform(matrix.view())
        .context("Failed to project embeddings")?;

    render_scatter(&points, &table, &config.plot)?;

    let exported = match &config.export.path {
        Some(path) => {
            let format = resolve_format(path, config.export.format)?;
            let count = export_points(&points, &table, path, format)?;
            Some((path.clone(), count))
        }
        None => None,
    };

    Ok(RunSummary {
        in_distribution_samples: dataset.count(SampleKind::InDistribution),
        ood_samples: dataset.count(SampleKind::OutOfDistribution),
        rows: table.len(),
        dim: table.dim().unwrap_or(0),
        plot: config.plot.output.clone(),
        exported,
    })
}

fn ensure_not_empty(config: &Config, dataset: &Dataset) -> Result<()> {
    if dataset.is_empty() {
        return Err(PipelineError::EmptyDataset(format!(
            "{} or {}",
            config.in_distribution.index_dir.display(),
            config.ood.index_dir.display()
        ))
        .into());
    }
    Ok(())
}
