//! CLIP vision encoder using ONNX Runtime

use anyhow::{anyhow, bail, Context, Result};
use image::DynamicImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::{Path, PathBuf};

use super::preprocess::{preprocess, INPUT_SIZE};
use super::{Embedding, ImageEncoder};
use crate::config::ModelConfig;

/// Frozen CLIP vision tower returning one pooled feature vector per image.
pub struct ClipVisionEncoder {
    session: Session,
    input_name: String,
    output_name: String,
    normalize: bool,
    warned_fallback: bool,
}

impl ClipVisionEncoder {
    /// Load the encoder from `model_path`.
    pub fn load(model_path: &Path, config: &ModelConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load model {}", model_path.display()))?;

        tracing::info!(model = ?model_path, "CLIP vision encoder loaded");

        Ok(Self {
            session,
            input_name: config.input_name.clone(),
            output_name: config.output_name.clone(),
            normalize: config.normalize,
            warned_fallback: false,
        })
    }

    /// Resolve the model file (downloading it if needed) and load it.
    pub fn from_config(model_path: &Path, config: &ModelConfig) -> Result<Self> {
        let path = ensure_model(model_path, config.url.as_deref())?;
        Self::load(&path, config)
    }
}

impl ImageEncoder for ClipVisionEncoder {
    fn encode(&mut self, img: &DynamicImage) -> Result<Embedding> {
        let input = preprocess(img);
        let (input_data, _offset) = input.into_raw_vec_and_offset();

        let input_tensor = Tensor::from_array((
            [1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize],
            input_data.into_boxed_slice(),
        ))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])?;

        let mut candidates = Vec::new();
        for name in outputs.keys() {
            let value = &outputs[name];
            // Non-float outputs can never be the embedding.
            if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
                candidates.push(OutputTensor {
                    name,
                    shape: shape.iter().copied().collect(),
                    data,
                });
            }
        }

        let selected = select_output(&candidates, &self.output_name)?;
        if !selected.requested && !self.warned_fallback {
            tracing::warn!(
                wanted = %self.output_name,
                used = %selected.name,
                dim = selected.embedding.len(),
                "Model has no such output, using its first output instead"
            );
            self.warned_fallback = true;
        }
        let embedding = selected.embedding;

        if self.normalize {
            Ok(l2_normalize(embedding))
        } else {
            Ok(embedding)
        }
    }
}

/// One float output of a session run.
struct OutputTensor<'a> {
    name: &'a str,
    shape: Vec<i64>,
    data: &'a [f32],
}

#[derive(Debug)]
struct SelectedOutput {
    name: String,
    embedding: Embedding,
    /// False when `wanted` was missing and the first output was taken.
    requested: bool,
}

/// Pick `wanted` among `outputs`, else the first one. The chosen tensor must
/// be a single pooled vector of shape `[1, D]`.
fn select_output(outputs: &[OutputTensor<'_>], wanted: &str) -> Result<SelectedOutput> {
    let (output, requested) = match outputs.iter().find(|o| o.name == wanted) {
        Some(output) => (output, true),
        None => (
            outputs
                .first()
                .ok_or_else(|| anyhow!("Model produced no float outputs"))?,
            false,
        ),
    };

    match output.shape.as_slice() {
        [1, dim] if *dim > 0 && *dim as usize == output.data.len() => Ok(SelectedOutput {
            name: output.name.to_string(),
            embedding: output.data.to_vec(),
            requested,
        }),
        shape => bail!(
            "Output '{}' has shape {:?}, expected a pooled [1, D] vector",
            output.name,
            shape
        ),
    }
}

/// Download the model file if it doesn't exist.
fn ensure_model(model_path: &Path, url: Option<&str>) -> Result<PathBuf> {
    if model_path.exists() {
        return Ok(model_path.to_path_buf());
    }

    let url = url.ok_or_else(|| {
        anyhow!(
            "Model {} not found and no download URL configured",
            model_path.display()
        )
    })?;

    if let Some(parent) = model_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(model = ?model_path, %url, "Downloading CLIP model...");
    let response = ureq::get(url)
        .call()
        .map_err(|e| anyhow!("Failed to download model: {}", e))?;

    // Partial downloads stay under `.part` until complete.
    let partial = model_path.with_extension("part");
    let mut file = std::fs::File::create(&partial)?;
    std::io::copy(&mut response.into_reader(), &mut file)?;
    std::fs::rename(&partial, model_path)?;
    tracing::info!(model = ?model_path, "CLIP model downloaded");

    Ok(model_path.to_path_buf())
}

fn l2_normalize(embedding: Embedding) -> Embedding {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        embedding.iter().map(|x| x / norm).collect()
    } else {
        embedding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    fn output<'a>(name: &'a str, shape: &[i64], data: &'a [f32]) -> OutputTensor<'a> {
        OutputTensor {
            name,
            shape: shape.to_vec(),
            data,
        }
    }

    #[test]
    fn test_select_output_by_name() {
        let projected = [0.5f32; 4];
        let pooled = [1.0f32; 6];
        let outputs = [
            output("image_embeds", &[1, 4], &projected),
            output("pooler_output", &[1, 6], &pooled),
        ];

        let selected = select_output(&outputs, "pooler_output").unwrap();

        assert!(selected.requested);
        assert_eq!(selected.name, "pooler_output");
        assert_eq!(selected.embedding, vec![1.0; 6]);
    }

    #[test]
    fn test_select_output_falls_back_to_first() {
        let projected = [0.5f32; 4];
        let outputs = [output("image_embeds", &[1, 4], &projected)];

        let selected = select_output(&outputs, "pooler_output").unwrap();

        assert!(!selected.requested);
        assert_eq!(selected.name, "image_embeds");
        assert_eq!(selected.embedding.len(), 4);
    }

    #[test]
    fn test_select_output_rejects_hidden_states() {
        let hidden = vec![0.0f32; 50 * 8];
        let pooled = [1.0f32; 8];
        let outputs = [
            output("last_hidden_state", &[1, 50, 8], &hidden),
            output("pooler_output", &[1, 8], &pooled),
        ];

        let err = select_output(&outputs, "missing").unwrap_err();
        assert!(err.to_string().contains("last_hidden_state"));

        let err = select_output(&outputs, "last_hidden_state").unwrap_err();
        assert!(err.to_string().contains("[1, 50, 8]"));

        assert!(select_output(&outputs, "pooler_output").is_ok());
    }

    #[test]
    fn test_select_output_rejects_batch_and_empty() {
        let data = [0.0f32; 8];
        assert!(select_output(&[output("out", &[2, 4], &data)], "out").is_err());
        assert!(select_output(&[output("out", &[8], &data)], "out").is_err());
        assert!(select_output(&[], "out").is_err());
    }

    #[test]
    fn test_ensure_model_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vision.onnx");
        std::fs::write(&path, b"onnx").unwrap();

        assert_eq!(ensure_model(&path, None).unwrap(), path);
    }

    #[test]
    fn test_ensure_model_missing_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_model(&dir.path().join("vision.onnx"), None).unwrap_err();
        assert!(err.to_string().contains("no download URL"));
    }
}
