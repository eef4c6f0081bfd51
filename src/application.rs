use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::domain::{
    AskRequest, AskResponse, ClassCounts, Counts, ExtractStats, Manifest, UploadResponse,
    NO_CLASSES_ANSWER, NO_QUESTION_ANSWER, ROOT_CLASS, is_image_file_name, is_split_name, normalize_class_name,
};

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("{0}")]
    Message(String),
}

/// Failure modes of a language model request.
///
/// The `Display` text is what ends up in the answer, after an `[LLM Error]` tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("Could not connect to Ollama at {endpoint}. Is 'ollama serve' running?")]
    ConnectionFailed { endpoint: String },
    #[error("request to {endpoint} timed out after {seconds}s: {detail}")]
    Timeout {
        endpoint: String,
        seconds: u64,
        detail: String,
    },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("{0}")]
    Other(String),
}

/// Immediate children of a directory, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirListing {
    pub directories: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
}

impl DirListing {
    pub fn image_count(&self) -> u64 {
        self.files
            .iter()
            .filter(|path| is_image_file_name(&entry_name(path)))
            .count() as u64
    }

    pub fn has_images(&self) -> bool {
        self.image_count() > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AbsolutePath,
    OutsideDestination,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AbsolutePath => f.write_str("absolute path"),
            SkipReason::OutsideDestination => f.write_str("suspicious path"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZipEntryOutcome {
    Directory,
    File,
    Skipped { name: String, reason: SkipReason },
}

pub trait FilePorts: Send + Sync {
    fn list_dir(&self, dir: &Path) -> Result<DirListing, DatasetError>;
    /// Canonical path of `dir`, or `None` when it is not an existing directory.
    fn resolve_dir(&self, dir: &Path) -> Result<Option<PathBuf>, DatasetError>;
    fn clear_dir(&self, dir: &Path) -> Result<(), DatasetError>;
    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), DatasetError>;
    fn extract_zip(
        &self,
        zip_path: &Path,
        output_dir: &Path,
        on_entry: &mut dyn FnMut(ZipEntryOutcome),
    ) -> Result<(), DatasetError>;
    fn write_manifest(&self, path: &Path, manifest: &Manifest) -> Result<(), DatasetError>;
    fn read_manifest(&self, path: &Path) -> Result<Option<Manifest>, DatasetError>;
}

pub trait ProgressReporter: Send + Sync {
    fn on_start(&self, archive: &Path);
    fn on_update(&self, stats: &ExtractStats);
    fn on_skipped_entry(&self, name: &str, reason: SkipReason);
    fn on_finish(&self, stats: &ExtractStats);
}

pub trait LanguageModel: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub destination: PathBuf,
    pub stats: ExtractStats,
}

/// Unpacks `zip_path` into `output_dir`, skipping entries that would land outside of it.
///
/// An archive that cannot be opened is an error; unsafe entries only produce warnings.
pub fn extract_archive(
    ports: &dyn FilePorts,
    progress: &dyn ProgressReporter,
    zip_path: &Path,
    output_dir: &Path,
) -> Result<Extraction, DatasetError> {
    let mut stats = ExtractStats::default();

    progress.on_start(zip_path);

    ports.extract_zip(zip_path, output_dir, &mut |outcome| {
        stats.entries += 1;
        match outcome {
            ZipEntryOutcome::Directory => stats.directories_created += 1,
            ZipEntryOutcome::File => stats.files_written += 1,
            ZipEntryOutcome::Skipped { name, reason } => {
                stats.skipped += 1;
                warn!(entry = %name, %reason, "skipping archive entry");
                progress.on_skipped_entry(&name, reason);
            }
        }
        progress.on_update(&stats);
    })?;

    progress.on_finish(&stats);
    info!(
        archive = %zip_path.display(),
        destination = %output_dir.display(),
        files = stats.files_written,
        skipped = stats.skipped,
        "extracted archive"
    );

    Ok(Extraction {
        destination: output_dir.to_path_buf(),
        stats,
    })
}

/// Infers the class layout under `dataset` and writes it to `manifest_path`.
///
/// A missing `dataset` directory yields an empty manifest and writes nothing.
pub fn scan_dataset(
    ports: &dyn FilePorts,
    dataset: &Path,
    manifest_path: &Path,
) -> Result<Manifest, DatasetError> {
    let Some(root) = ports.resolve_dir(dataset)? else {
        debug!(dataset = %dataset.display(), "dataset directory missing");
        return Ok(Manifest::empty(dataset.display().to_string()));
    };

    let (current, listing) = unwrap_wrappers(ports, root.clone())?;
    let mut classes = BTreeSet::new();

    let counts = if !listing.directories.is_empty()
        && listing
            .directories
            .iter()
            .all(|dir| is_split_name(&entry_name(dir)))
    {
        let mut splits: BTreeMap<String, ClassCounts> = BTreeMap::new();
        for split_dir in &listing.directories {
            let split_key = entry_name(split_dir).to_lowercase();
            let class_dirs = ports.list_dir(split_dir)?.directories;
            let split_counts = splits.entry(split_key).or_default();
            for (class, count) in count_class_folders(ports, &class_dirs)? {
                classes.insert(class.clone());
                *split_counts.entry(class).or_insert(0) += count;
            }
        }
        Counts::Split(splits)
    } else if !listing.directories.is_empty() {
        let flat = count_class_folders(ports, &listing.directories)?;
        classes.extend(flat.keys().cloned());
        Counts::Flat(flat)
    } else {
        let mut flat = ClassCounts::new();
        let count = listing.image_count();
        if count > 0 {
            classes.insert(ROOT_CLASS.to_string());
            flat.insert(ROOT_CLASS.to_string(), count);
        }
        Counts::Flat(flat)
    };

    let manifest = Manifest {
        root: root.display().to_string(),
        classes,
        counts,
    };

    ports.write_manifest(manifest_path, &manifest)?;
    info!(
        dataset = %current.display(),
        classes = ?manifest.classes,
        images = manifest.counts.total_images(),
        "scanned dataset"
    );

    Ok(manifest)
}

/// Descends through directories holding exactly one subdirectory and no images.
fn unwrap_wrappers(
    ports: &dyn FilePorts,
    mut current: PathBuf,
) -> Result<(PathBuf, DirListing), DatasetError> {
    loop {
        let listing = ports.list_dir(&current)?;
        if !listing.has_images() {
            if let [only_child] = listing.directories.as_slice() {
                debug!(wrapper = %current.display(), "unwrapping single-folder wrapper");
                current = only_child.clone();
                continue;
            }
        }
        return Ok((current, listing));
    }
}

/// Counts images directly inside each class folder; folders without images are dropped.
fn count_class_folders(
    ports: &dyn FilePorts,
    class_dirs: &[PathBuf],
) -> Result<ClassCounts, DatasetError> {
    let counted = class_dirs
        .par_iter()
        .map(|dir| {
            let count = ports.list_dir(dir)?.image_count();
            Ok::<_, DatasetError>((normalize_class_name(&entry_name(dir)), count))
        })
        .collect::<Result<Vec<_>, DatasetError>>()?;

    let mut counts = ClassCounts::new();
    for (class, count) in counted {
        if count > 0 {
            *counts.entry(class).or_insert(0) += count;
        }
    }

    Ok(counts)
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Renders the dataset summary and the question into a single prompt.
///
/// The question is inserted as-is; only the counts are JSON-encoded.
pub fn compose_prompt(
    classes: &BTreeSet<String>,
    counts: &Counts,
    question: &str,
) -> Result<String, DatasetError> {
    let class_list = classes.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    let counts_json = serde_json::to_string(counts)?;

    Ok(format!(
        "You are a dataset assistant.\n\
         \n\
         Dataset Info:\n\
         Number of classes: {}\n\
         Classes: {}\n\
         Counts: {}\n\
         \n\
         Question: {}\n",
        classes.len(),
        class_list,
        counts_json,
        question
    ))
}

/// Asks the model, folding any failure into a readable answer.
pub fn answer_or_explain(model: &dyn LanguageModel, prompt: &str) -> String {
    match model.generate(prompt) {
        Ok(answer) => answer.trim().to_string(),
        Err(err) => {
            warn!(error = %err, "language model request failed");
            format!("[LLM Error] {err}")
        }
    }
}

/// Replaces any previous upload: clears both working directories, extracts and rescans.
///
/// Two uploads running at once can delete each other's files.
pub fn upload_dataset(
    ports: &dyn FilePorts,
    progress: &dyn ProgressReporter,
    storage: &StorageConfig,
    file_name: &str,
    contents: &[u8],
) -> Result<UploadResponse, DatasetError> {
    ports.clear_dir(&storage.upload_dir)?;
    ports.clear_dir(&storage.extract_dir)?;

    let archive_name = Path::new(file_name)
        .file_name()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| DatasetError::Message(format!("invalid upload file name: {file_name}")))?;
    let zip_path = storage.upload_dir.join(archive_name);
    ports.write_file(&zip_path, contents)?;

    let extraction = extract_archive(ports, progress, &zip_path, &storage.extract_dir)?;
    let manifest = scan_dataset(ports, &extraction.destination, &storage.manifest_path())?;

    Ok(UploadResponse::from(manifest))
}

pub fn ask_question(
    ports: &dyn FilePorts,
    model: &dyn LanguageModel,
    storage: &StorageConfig,
    request: &AskRequest,
) -> Result<AskResponse, DatasetError> {
    let question = request.text().map(str::to_string);
    let manifest_path = storage.manifest_path();

    let manifest = match ports.read_manifest(&manifest_path)? {
        Some(manifest) => manifest,
        None => scan_dataset(ports, &storage.extract_dir, &manifest_path)?,
    };

    if manifest.classes.is_empty() {
        return Ok(AskResponse {
            question,
            answer: NO_CLASSES_ANSWER.to_string(),
            classes: BTreeSet::new(),
            num_classes: 0,
            counts: Counts::default(),
        });
    }

    let answer = match question.as_deref() {
        Some(text) => {
            let prompt = compose_prompt(&manifest.classes, &manifest.counts, text)?;
            answer_or_explain(model, &prompt)
        }
        None => NO_QUESTION_ANSWER.to_string(),
    };

    Ok(AskResponse {
        question,
        answer,
        num_classes: manifest.num_classes(),
        classes: manifest.classes,
        counts: manifest.counts,
    })
}
