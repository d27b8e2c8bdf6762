use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::Array2;
use std::path::Path;

use crate::clip::{Embedding, ImageEncoder};
use crate::dataset::{Label, Sample};
use crate::error::PipelineError;

/// One embedding together with the label it was created with.
#[derive(Debug, Clone)]
pub struct EmbeddedRow {
    pub embedding: Embedding,
    pub label: Label,
    /// Index of the owning group in [`EmbeddingTable::groups`].
    pub sample: usize,
    pub step: usize,
}

/// Contiguous row range produced by one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleGroup {
    pub label: Label,
    pub class_name: String,
    pub image_name: String,
    pub start: usize,
    pub len: usize,
}

impl SampleGroup {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.len
    }
}

/// Rows in append order (sample order, then step order).
#[derive(Debug, Clone, Default)]
pub struct EmbeddingTable {
    rows: Vec<EmbeddedRow>,
    groups: Vec<SampleGroup>,
}

impl EmbeddingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sample's per-step embeddings as a block.
    pub fn push_sample(&mut self, sample: &Sample, embeddings: Vec<Embedding>) {
        let label = sample.label();
        let group = self.groups.len();
        let start = self.rows.len();
        let len = embeddings.len();

        self.rows
            .extend(embeddings.into_iter().enumerate().map(|(step, embedding)| EmbeddedRow {
                embedding,
                label,
                sample: group,
                step,
            }));

        self.groups.push(SampleGroup {
            label,
            class_name: sample.class_name.clone(),
            image_name: sample.image_name.clone(),
            start,
            len,
        });
    }

    pub fn rows(&self) -> &[EmbeddedRow] {
        &self.rows
    }

    pub fn groups(&self) -> &[SampleGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Embedding width, taken from the first row.
    pub fn dim(&self) -> Option<usize> {
        self.rows.first().map(|r| r.embedding.len())
    }

    pub fn labels(&self) -> Vec<Label> {
        self.rows.iter().map(|r| r.label).collect()
    }

    /// Stack all rows into a `(rows, dim)` matrix.
    pub fn matrix(&self) -> Result<Array2<f32>, PipelineError> {
        let dim = self.dim().unwrap_or(0);
        let mut data = Vec::with_capacity(self.rows.len() * dim);

        for (i, row) in self.rows.iter().enumerate() {
            if row.embedding.len() != dim {
                return Err(PipelineError::DimensionMismatch {
                    row: i,
                    expected: dim,
                    found: row.embedding.len(),
                });
            }
            data.extend_from_slice(&row.embedding);
        }

        Array2::from_shape_vec((self.rows.len(), dim), data)
            .map_err(|e| PipelineError::Reduction(e.to_string()))
    }
}

/// Encode every step image of every sample, in order.
///
/// `load` reads one step image; the real pipeline passes
/// [`crate::clip::load_image`].
pub fn collect_embeddings<E, L>(
    samples: &[Sample],
    encoder: &mut E,
    mut load: L,
) -> Result<EmbeddingTable>
where
    E: ImageEncoder + ?Sized,
    L: FnMut(&Path) -> Result<DynamicImage>,
{
    let mut table = EmbeddingTable::new();

    for (i, sample) in samples.iter().enumerate() {
        let mut embeddings = Vec::with_capacity(sample.step_paths.len());

        for path in &sample.step_paths {
            let img = load(path)?;
            let embedding = encoder
                .encode(&img)
                .with_context(|| format!("Failed to encode {}", path.display()))?;
            embeddings.push(embedding);
        }

        tracing::debug!(
            sample = i,
            class = %sample.class_name,
            image = %sample.image_name,
            label = %sample.label(),
            "Sample embedded"
        );

        table.push_sample(sample, embeddings);
    }

    tracing::info!(
        samples = samples.len(),
        rows = table.len(),
        dim = table.dim().unwrap_or(0),
        "Embeddings collected"
    );

    Ok(table)
}
