//! Dimensionality reduction of the embedding matrix to the plane.

mod tsne;

pub use tsne::Tsne;

use ndarray::ArrayView2;

use crate::error::PipelineError;

/// One projected row.
pub type Point2 = [f32; 2];

/// Maps `n` high-dimensional rows to `n` points, keeping row order.
pub trait DimensionReducer {
    fn fit_transform(&mut self, data: ArrayView2<f32>) -> Result<Vec<Point2>, PipelineError>;
}
