//! Visual separability check for out-of-distribution images.
//!
//! Embeds stepwise image variants with a frozen CLIP vision encoder, projects
//! the embeddings to the plane with t-SNE and draws a scatter plot coloured by
//! class, with out-of-distribution samples in their own colour.

pub mod clip;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod logging;
pub mod pipeline;
pub mod projection;
pub mod render;

pub use config::Config;
pub use error::PipelineError;
pub use pipeline::{run, run_with_encoder, RunSummary};
