//! Sample discovery for the stepwise image collections.
//!
//! Each collection has an index directory whose class folders and file names
//! decide which samples exist, and a stepwise root holding one copy of every
//! image per perturbation step.

mod discovery;

pub use discovery::{discover_classes, list_image_names, step_paths, ClassFolder};

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::config::{Config, SampleSetConfig, SamplingConfig};

/// Which collection a sample was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    InDistribution,
    OutOfDistribution,
}

/// Per-row label: the class folder index, or the OOD sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Class(usize),
    Ood,
}

impl Label {
    pub fn class_index(&self) -> Option<usize> {
        match self {
            Label::Class(index) => Some(*index),
            Label::Ood => None,
        }
    }

    pub fn is_ood(&self) -> bool {
        matches!(self, Label::Ood)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Class(index) => write!(f, "{}", index),
            Label::Ood => f.write_str("ood"),
        }
    }
}

impl Serialize for Label {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Label::Class(index) => serializer.serialize_u64(*index as u64),
            Label::Ood => serializer.serialize_str("ood"),
        }
    }
}

/// One image identity together with the paths of all its step variants.
#[derive(Debug, Clone)]
pub struct Sample {
    pub kind: SampleKind,
    pub class_index: usize,
    pub class_name: String,
    pub image_name: String,
    /// Indexed by step.
    pub step_paths: Vec<PathBuf>,
}

impl Sample {
    pub fn label(&self) -> Label {
        match self.kind {
            SampleKind::InDistribution => Label::Class(self.class_index),
            SampleKind::OutOfDistribution => Label::Ood,
        }
    }
}

/// All samples in traversal order: in-distribution first, then OOD.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub samples: Vec<Sample>,
    /// In-distribution class folder names, indexed by class index.
    pub class_names: Vec<String>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn count(&self, kind: SampleKind) -> usize {
        self.samples.iter().filter(|s| s.kind == kind).count()
    }
}

/// Build the samples of one collection.
pub fn load_samples(
    set: &SampleSetConfig,
    sampling: &SamplingConfig,
    kind: SampleKind,
) -> Result<(Vec<Sample>, Vec<ClassFolder>)> {
    let classes = discover_classes(&set.index_dir, set.folder_cap)
        .with_context(|| format!("Failed to enumerate classes in {}", set.index_dir.display()))?;

    let mut samples = Vec::new();
    for class in &classes {
        let image_names =
            list_image_names(&class.path, &sampling.index_extensions, set.sample_limit)?;

        tracing::debug!(
            class = %class.name,
            index = class.index,
            images = image_names.len(),
            "Class folder listed"
        );

        for image_name in image_names {
            let step_paths = step_paths(
                &set.stepwise_root,
                &class.name,
                &image_name,
                &sampling.step_extension,
                sampling.step_count,
            );
            samples.push(Sample {
                kind,
                class_index: class.index,
                class_name: class.name.clone(),
                image_name,
                step_paths,
            });
        }
    }

    Ok((samples, classes))
}

/// Enumerate both collections.
pub fn load_dataset(config: &Config) -> Result<Dataset> {
    let (mut samples, classes) = load_samples(
        &config.in_distribution,
        &config.sampling,
        SampleKind::InDistribution,
    )?;
    let (ood_samples, _) = load_samples(
        &config.ood,
        &config.sampling,
        SampleKind::OutOfDistribution,
    )?;

    tracing::info!(
        in_distribution = samples.len(),
        ood = ood_samples.len(),
        classes = classes.len(),
        "Dataset enumerated"
    );

    samples.extend(ood_samples);

    Ok(Dataset {
        samples,
        class_names: classes.into_iter().map(|c| c.name).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::path::Path;
    use tempfile::tempdir;

    fn make_set(root: &Path, name: &str, classes: &[(&str, usize)]) -> SampleSetConfig {
        let index_dir = root.join(name).join("index");
        for (class, count) in classes {
            fs::create_dir_all(index_dir.join(class)).unwrap();
            for i in 0..*count {
                File::create(index_dir.join(class).join(format!("img{:02}.JPEG", i))).unwrap();
            }
        }
        SampleSetConfig {
            index_dir,
            stepwise_root: root.join(name).join("stepwise"),
            folder_cap: 10,
            sample_limit: None,
        }
    }

    #[test]
    fn test_label_display() {
        assert_eq!(Label::Class(3).to_string(), "3");
        assert_eq!(Label::Ood.to_string(), "ood");
        assert_eq!(serde_json::to_string(&Label::Ood).unwrap(), "\"ood\"");
        assert_eq!(serde_json::to_string(&Label::Class(2)).unwrap(), "2");
    }

    #[test]
    fn test_ood_sample_limit_caps_per_class() {
        let dir = tempdir().unwrap();
        let mut set = make_set(dir.path(), "ood", &[("ninco_a", 25)]);
        set.sample_limit = Some(20);

        let (samples, _) =
            load_samples(&set, &SamplingConfig::default(), SampleKind::OutOfDistribution)
                .unwrap();

        assert_eq!(samples.len(), 20);
        assert!(samples.iter().all(|s| s.label() == Label::Ood));
    }

    #[test]
    fn test_samples_carry_all_step_paths() {
        let dir = tempdir().unwrap();
        let set = make_set(dir.path(), "id", &[("n01", 1), ("n02", 2)]);

        let (samples, classes) =
            load_samples(&set, &SamplingConfig::default(), SampleKind::InDistribution).unwrap();

        assert_eq!(classes.len(), 2);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].label(), Label::Class(0));
        assert_eq!(samples[2].label(), Label::Class(1));
        assert_eq!(samples[0].step_paths.len(), 7);
        assert_eq!(
            samples[2].step_paths[6],
            set.stepwise_root.join("6").join("n02").join("img01.png")
        );
    }

    #[test]
    fn test_load_dataset_orders_in_distribution_first() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.in_distribution = make_set(dir.path(), "id", &[("n01", 1), ("n02", 1)]);
        config.ood = make_set(dir.path(), "ood", &[("ninco", 1)]);

        let dataset = load_dataset(&config).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.count(SampleKind::InDistribution), 2);
        assert_eq!(dataset.count(SampleKind::OutOfDistribution), 1);
        assert_eq!(dataset.samples[2].kind, SampleKind::OutOfDistribution);
        assert_eq!(dataset.class_names, vec!["n01", "n02"]);
    }
}
