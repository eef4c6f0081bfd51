use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

pub const SPLIT_NAMES: [&str; 3] = ["train", "val", "test"];

/// Class name used when images sit directly in the dataset root.
pub const ROOT_CLASS: &str = "root";

pub const UPLOAD_MESSAGE: &str = "Dataset uploaded and scanned successfully";

pub const NO_CLASSES_ANSWER: &str = "No classes detected. Please re-upload dataset.";

pub const NO_QUESTION_ANSWER: &str = "No question provided. Send a `query` or `question` field.";

pub type ClassCounts = BTreeMap<String, u64>;

/// Image counts per class, optionally grouped by split.
///
/// `Flat` is listed first so that an empty `{}` reads back as a flat layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Counts {
    Flat(ClassCounts),
    Split(BTreeMap<String, ClassCounts>),
}

impl Default for Counts {
    fn default() -> Self {
        Counts::Flat(ClassCounts::new())
    }
}

impl Counts {
    pub fn is_empty(&self) -> bool {
        match self {
            Counts::Flat(classes) => classes.is_empty(),
            Counts::Split(splits) => splits.is_empty(),
        }
    }

    pub fn total_images(&self) -> u64 {
        match self {
            Counts::Flat(classes) => classes.values().sum(),
            Counts::Split(splits) => splits.values().flat_map(|c| c.values()).sum(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub root: String,
    #[serde(default)]
    pub classes: BTreeSet<String>,
    #[serde(default)]
    pub counts: Counts,
}

impl Manifest {
    pub fn empty(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractStats {
    pub entries: u64,
    pub directories_created: u64,
    pub files_written: u64,
    pub skipped: u64,
}

pub fn is_image_file_name(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

pub fn is_split_name(name: &str) -> bool {
    let name = name.to_lowercase();
    SPLIT_NAMES.contains(&name.as_str())
}

pub fn normalize_class_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub num_classes: usize,
    pub classes: BTreeSet<String>,
    pub counts: Counts,
}

impl From<Manifest> for UploadResponse {
    fn from(manifest: Manifest) -> Self {
        Self {
            message: UPLOAD_MESSAGE.to_string(),
            num_classes: manifest.num_classes(),
            classes: manifest.classes,
            counts: manifest.counts,
        }
    }
}

/// Body of a question; callers may send either `query` or `question`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            query: Some(question.into()),
            question: None,
        }
    }

    /// `query` wins unless it is empty. Blank questions count as missing.
    pub fn text(&self) -> Option<&str> {
        self.query
            .as_deref()
            .filter(|q| !q.is_empty())
            .or(self.question.as_deref())
            .filter(|q| !q.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponse {
    pub question: Option<String>,
    pub answer: String,
    pub classes: BTreeSet<String>,
    pub num_classes: usize,
    pub counts: Counts,
}
