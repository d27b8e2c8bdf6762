use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A class folder taken from an index directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFolder {
    /// Position among the kept directories.
    pub index: usize,
    pub name: String,
    pub path: PathBuf,
}

/// Immediate entries of `dir`, sorted by file name.
fn list_entries(dir: &Path) -> Result<Vec<walkdir::DirEntry>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .map(|e| e.with_context(|| format!("Failed to list {}", dir.display())))
        .collect()
}

/// Take the first `folder_cap` subdirectories of `index_dir`.
/// Regular files at this level are skipped and do not count towards the cap.
pub fn discover_classes(index_dir: &Path, folder_cap: usize) -> Result<Vec<ClassFolder>> {
    let mut classes = Vec::new();

    for entry in list_entries(index_dir)? {
        if classes.len() == folder_cap {
            break;
        }
        if !entry.file_type().is_dir() {
            continue;
        }

        classes.push(ClassFolder {
            index: classes.len(),
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.into_path(),
        });
    }

    Ok(classes)
}

/// Image names (file name up to the first `.`) of the files in `class_dir`.
pub fn list_image_names(
    class_dir: &Path,
    extensions: &[String],
    limit: Option<usize>,
) -> Result<Vec<String>> {
    let mut names = Vec::new();

    for entry in list_entries(class_dir)? {
        if !entry.file_type().is_file() {
            continue;
        }
        if !has_extension(entry.path(), extensions) {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        let name = file_name.split('.').next().unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        names.push(name.to_string());
    }

    if let Some(limit) = limit {
        names.truncate(limit);
    }

    Ok(names)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    match path.extension() {
        Some(ext) => {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            extensions.iter().any(|e| e.to_lowercase() == ext_lower)
        }
        None => false,
    }
}

/// `<stepwise_root>/<step>/<class>/<image>.<ext>` for every step.
pub fn step_paths(
    stepwise_root: &Path,
    class_name: &str,
    image_name: &str,
    extension: &str,
    step_count: usize,
) -> Vec<PathBuf> {
    (0..step_count)
        .map(|step| {
            stepwise_root
                .join(step.to_string())
                .join(class_name)
                .join(format!("{}.{}", image_name, extension))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    fn exts() -> Vec<String> {
        vec!["jpeg".to_string(), "png".to_string()]
    }

    #[test]
    fn test_discover_classes_skips_files_and_sorts() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("n02")).unwrap();
        fs::create_dir(dir.path().join("n01")).unwrap();
        File::create(dir.path().join("README.txt")).unwrap();

        let classes = discover_classes(dir.path(), 10).unwrap();

        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].name, "n01");
        assert_eq!(classes[0].index, 0);
        assert_eq!(classes[1].name, "n02");
        assert_eq!(classes[1].index, 1);
    }

    #[test]
    fn test_discover_classes_stops_at_cap() {
        let dir = tempdir().unwrap();
        for i in 0..13 {
            fs::create_dir(dir.path().join(format!("class{:02}", i))).unwrap();
        }
        // A file sorted before the directories must not use up a slot.
        File::create(dir.path().join("a_notes.txt")).unwrap();

        let classes = discover_classes(dir.path(), 10).unwrap();

        assert_eq!(classes.len(), 10);
        assert_eq!(classes.last().unwrap().name, "class09");
    }

    #[test]
    fn test_discover_classes_missing_dir_fails() {
        let dir = tempdir().unwrap();
        assert!(discover_classes(&dir.path().join("missing"), 10).is_err());
    }

    #[test]
    fn test_list_image_names_strips_extension() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("ILSVRC_0002.JPEG")).unwrap();
        File::create(dir.path().join("ILSVRC_0001.JPEG")).unwrap();
        File::create(dir.path().join("archive.tar.png")).unwrap();
        File::create(dir.path().join("labels.csv")).unwrap();
        fs::create_dir(dir.path().join("nested.png")).unwrap();

        let names = list_image_names(dir.path(), &exts(), None).unwrap();

        assert_eq!(names, vec!["ILSVRC_0001", "ILSVRC_0002", "archive"]);
    }

    #[test]
    fn test_list_image_names_applies_limit() {
        let dir = tempdir().unwrap();
        for i in 0..25 {
            File::create(dir.path().join(format!("img{:02}.png", i))).unwrap();
        }

        let names = list_image_names(dir.path(), &exts(), Some(20)).unwrap();

        assert_eq!(names.len(), 20);
        assert_eq!(names[19], "img19");
    }

    #[test]
    fn test_empty_extension_list_accepts_everything() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("a.txt")).unwrap();
        File::create(dir.path().join("b")).unwrap();

        let names = list_image_names(dir.path(), &[], None).unwrap();

        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_step_paths_substitutes_step() {
        let paths = step_paths(Path::new("/data/stepwise"), "n01", "img", "png", 3);

        assert_eq!(
            paths,
            vec![
                PathBuf::from("/data/stepwise/0/n01/img.png"),
                PathBuf::from("/data/stepwise/1/n01/img.png"),
                PathBuf::from("/data/stepwise/2/n01/img.png"),
            ]
        );
    }
}
