use thiserror::Error;

/// Invariant violations inside the pipeline. I/O and model failures travel
/// as plain `anyhow` errors with context instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no samples found in {0}")]
    EmptyDataset(String),

    #[error("embedding for row {row} has {found} dimensions, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("projection has {projected} points but the embedding table has {rows} rows")]
    ProjectionLength { projected: usize, rows: usize },

    #[error("dimensionality reduction failed: {0}")]
    Reduction(String),
}
