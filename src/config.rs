use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::export::ExportFormat;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_in_distribution")]
    pub in_distribution: SampleSetConfig,

    #[serde(default = "default_ood")]
    pub ood: SampleSetConfig,

    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub projection: ProjectionConfig,

    #[serde(default)]
    pub plot: PlotConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

/// One image collection laid out as `<stepwise_root>/<step>/<class>/<image>.<ext>`.
///
/// `index_dir` is only listed, never read: its class folders and file names
/// decide which samples exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSetConfig {
    pub index_dir: PathBuf,

    pub stepwise_root: PathBuf,

    /// Maximum number of class folders taken from `index_dir`.
    #[serde(default = "default_folder_cap")]
    pub folder_cap: usize,

    /// Maximum number of images per class folder (unlimited if unset).
    #[serde(default)]
    pub sample_limit: Option<usize>,
}

fn default_folder_cap() -> usize {
    10
}

fn default_in_distribution() -> SampleSetConfig {
    SampleSetConfig {
        index_dir: PathBuf::from("dataset/ImageNet-200/val"),
        stepwise_root: PathBuf::from("dataset/ImageNet-200/stepwise_val"),
        folder_cap: default_folder_cap(),
        sample_limit: None,
    }
}

fn default_ood() -> SampleSetConfig {
    SampleSetConfig {
        index_dir: PathBuf::from("dataset/stepwise_ninco/0"),
        stepwise_root: PathBuf::from("dataset/stepwise_ninco"),
        folder_cap: default_folder_cap(),
        sample_limit: Some(20),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Number of step variants per image (steps `0..step_count`).
    #[serde(default = "default_step_count")]
    pub step_count: usize,

    /// Extension of the step variant files under `stepwise_root`.
    #[serde(default = "default_step_extension")]
    pub step_extension: String,

    /// Extensions accepted when listing `index_dir` class folders.
    /// An empty list accepts every file.
    #[serde(default = "default_index_extensions")]
    pub index_extensions: Vec<String>,
}

fn default_step_count() -> usize {
    7
}

fn default_step_extension() -> String {
    "png".to_string()
}

fn default_index_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "webp".to_string(),
        "bmp".to_string(),
        "gif".to_string(),
    ]
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            step_count: default_step_count(),
            step_extension: default_step_extension(),
            index_extensions: default_index_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Explicit model file. When unset, `file_name` inside `models_dir` is used
    /// and downloaded from `url` if missing.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_model_file_name")]
    pub file_name: String,

    #[serde(default = "default_model_url")]
    pub url: Option<String>,

    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    #[serde(default = "default_input_name")]
    pub input_name: String,

    /// Output tensor holding the pooled feature vector. Falls back to the
    /// first output, with a warning, when the model does not expose it. The
    /// default download only has projected image embeddings; point `path` at
    /// an export with `pooler_output` to plot the pooled vectors.
    #[serde(default = "default_output_name")]
    pub output_name: String,

    #[serde(default)]
    pub normalize: bool,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

fn default_model_file_name() -> String {
    "clip-vit-b32-vision.onnx".to_string()
}

fn default_model_url() -> Option<String> {
    Some("https://huggingface.co/Qdrant/clip-ViT-B-32-vision/resolve/main/model.onnx".to_string())
}

fn default_models_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("oodviz")
        .join("models")
}

fn default_input_name() -> String {
    "pixel_values".to_string()
}

fn default_output_name() -> String {
    "pooler_output".to_string()
}

fn default_intra_threads() -> usize {
    4
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            file_name: default_model_file_name(),
            url: default_model_url(),
            models_dir: default_models_dir(),
            input_name: default_input_name(),
            output_name: default_output_name(),
            normalize: false,
            intra_threads: default_intra_threads(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TsneInit {
    #[default]
    Pca,
    Random,
}

/// t-SNE parameters. Defaults follow scikit-learn's `TSNE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    #[serde(default = "default_perplexity")]
    pub perplexity: f32,

    #[serde(default = "default_early_exaggeration")]
    pub early_exaggeration: f32,

    /// Fixed learning rate; `None` picks `max(n / early_exaggeration / 4, 50)`.
    #[serde(default)]
    pub learning_rate: Option<f32>,

    #[serde(default = "default_max_iter")]
    pub max_iter: usize,

    #[serde(default = "default_exaggeration_iter")]
    pub exaggeration_iter: usize,

    #[serde(default = "default_min_grad_norm")]
    pub min_grad_norm: f32,

    #[serde(default)]
    pub init: TsneInit,

    #[serde(default)]
    pub seed: u64,
}

fn default_perplexity() -> f32 {
    30.0
}

fn default_early_exaggeration() -> f32 {
    12.0
}

fn default_max_iter() -> usize {
    1000
}

fn default_exaggeration_iter() -> usize {
    250
}

fn default_min_grad_norm() -> f32 {
    1e-7
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            perplexity: default_perplexity(),
            early_exaggeration: default_early_exaggeration(),
            learning_rate: None,
            max_iter: default_max_iter(),
            exaggeration_iter: default_exaggeration_iter(),
            min_grad_norm: default_min_grad_norm(),
            init: TsneInit::default(),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    #[serde(default = "default_plot_output")]
    pub output: PathBuf,

    #[serde(default = "default_width_inches")]
    pub width_inches: f32,

    #[serde(default = "default_height_inches")]
    pub height_inches: f32,

    #[serde(default = "default_dpi")]
    pub dpi: u32,

    #[serde(default = "default_alpha")]
    pub alpha: f64,

    #[serde(default = "default_point_radius")]
    pub point_radius: u32,

    /// Hex colour (`#rrggbb`) for out-of-distribution points.
    #[serde(default = "default_ood_color")]
    pub ood_color: String,

    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default)]
    pub legend: bool,

    /// TrueType font for plot text. Common system locations are searched
    /// when unset.
    #[serde(default)]
    pub font: Option<PathBuf>,
}

fn default_plot_output() -> PathBuf {
    PathBuf::from("clip_embeddings_visualization_all_folders_and_ood.png")
}

fn default_width_inches() -> f32 {
    10.0
}

fn default_height_inches() -> f32 {
    8.0
}

fn default_dpi() -> u32 {
    100
}

fn default_alpha() -> f64 {
    0.7
}

fn default_point_radius() -> u32 {
    3
}

fn default_ood_color() -> String {
    "#000000".to_string()
}

fn default_title() -> String {
    "TSNE Visualization of CLIP Embeddings with Arrows and Indices".to_string()
}

impl PlotConfig {
    /// Pixel dimensions of the figure.
    pub fn pixel_size(&self) -> (u32, u32) {
        let w = (self.width_inches * self.dpi as f32).round().max(1.0) as u32;
        let h = (self.height_inches * self.dpi as f32).round().max(1.0) as u32;
        (w, h)
    }
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            output: default_plot_output(),
            width_inches: default_width_inches(),
            height_inches: default_height_inches(),
            dpi: default_dpi(),
            alpha: default_alpha(),
            point_radius: default_point_radius(),
            ood_color: default_ood_color(),
            title: default_title(),
            legend: false,
            font: None,
        }
    }
}

/// Optional dump of the projected points next to the plot.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExportConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Inferred from the path extension when unset.
    #[serde(default)]
    pub format: Option<ExportFormat>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            in_distribution: default_in_distribution(),
            ood: default_ood(),
            sampling: SamplingConfig::default(),
            model: ModelConfig::default(),
            projection: ProjectionConfig::default(),
            plot: PlotConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Config {
    /// Load from `OODVIZ_CONFIG` or the default location, falling back to
    /// defaults when no file exists.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var_os("OODVIZ_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(Self::config_path);

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!(path = ?config_path, "No config file, using defaults");
            Ok(Config::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oodviz")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Model file to load: the explicit path, or the cached file name.
    pub fn model_path(&self) -> PathBuf {
        self.model
            .path
            .clone()
            .unwrap_or_else(|| self.model.models_dir.join(&self.model.file_name))
    }
}
