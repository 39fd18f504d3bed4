// Class index + image index — one-time dataset scan
//
// The class index is a JSON object mapping class id → [synset, human name]:
//
//   { "0": ["n01440764", "tench"], "1": ["n01443537", "goldfish"], ... }
//
// The dataset directory is laid out ImageNet-style, one synset-named folder
// per class:
//
//   root/
//     n01440764/
//       ILSVRC2012_val_00000293.JPEG
//       ...
//     n01443537/
//       ...
//
// Scanning collects the synset folder names and a flat list of file paths.
// Labels are NOT resolved during the scan; each sample's parent-directory
// synset is looked up in the ClassIndex at batch-generation time, and an
// unknown synset is a hard failure there.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Synset → class-id mapping, loaded once from the JSON index file.
///
/// Immutable after load.
#[derive(Debug, Clone)]
pub struct ClassIndex {
    association: HashMap<String, usize>,
    num_classes: usize,
}

impl ClassIndex {
    /// Load and invert the class-index file: `{"<id>": ["<synset>", "<name>"]}`
    /// becomes synset → id.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let raw: HashMap<String, (String, String)> =
            serde_json::from_str(&text).map_err(|e| Error::MalformedIndex {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut association = HashMap::with_capacity(raw.len());
        for (id, (synset, _human_name)) in raw {
            let id: usize = id.parse().map_err(|_| Error::MalformedIndex {
                path: path.to_path_buf(),
                reason: format!("non-numeric class id: {id:?}"),
            })?;
            association.insert(synset, id);
        }

        let num_classes = association.len();
        Ok(ClassIndex {
            association,
            num_classes,
        })
    }

    /// Resolve a synset folder name to its class id.
    ///
    /// Unknown synsets are a hard error; there is no recovery path.
    pub fn class_of(&self, synset: &str) -> Result<usize> {
        self.association
            .get(synset)
            .copied()
            .ok_or_else(|| Error::UnknownClass(synset.to_string()))
    }

    /// Number of classes in the index file.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Flat list of image paths under a class-labeled directory tree.
#[derive(Debug, Clone)]
pub struct ImageIndex {
    /// Synset folder names found under the root (sorted).
    classes: Vec<String>,
    /// Flat list of image file paths across all class folders.
    images: Vec<PathBuf>,
}

impl ImageIndex {
    /// Scan `root/<synset>/<file>` once. Non-directory entries at the root
    /// are skipped; no validation that files are decodable.
    pub fn scan(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::NotADirectory(root.to_path_buf()));
        }

        let mut class_dirs: Vec<(String, PathBuf)> = Vec::new();
        for entry in fs::read_dir(root)? {
            let path = entry?.path();
            if path.is_dir() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    class_dirs.push((name.to_string(), path));
                }
            }
        }
        class_dirs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut classes = Vec::with_capacity(class_dirs.len());
        let mut images = Vec::new();
        for (name, dir) in class_dirs {
            let mut paths: Vec<PathBuf> = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_file() {
                    paths.push(path);
                }
            }
            paths.sort();
            images.extend(paths);
            classes.push(name);
        }

        Ok(ImageIndex { classes, images })
    }

    /// Synset folder names found under the root.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// All image paths, flat across class folders.
    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    /// Total number of samples.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether the index holds no samples.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// The synset (parent directory name) of the i-th sample.
    pub fn synset_of(&self, index: usize) -> Result<&str> {
        let path = self
            .images
            .get(index)
            .ok_or_else(|| Error::msg(format!("sample index {index} out of range")))?;
        path.parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::msg(format!("no parent class folder for {}", path.display())))
    }
}
