pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod llm;
pub mod logging;

pub use crate::application::{
    DatasetError, DirListing, Extraction, FilePorts, LanguageModel, LlmError, ProgressReporter,
    SkipReason, ZipEntryOutcome, answer_or_explain, ask_question, compose_prompt,
    extract_archive, scan_dataset, upload_dataset,
};
pub use crate::config::{AppConfig, LlmConfig, StorageConfig};
pub use crate::domain::{
    AskRequest, AskResponse, ClassCounts, Counts, ExtractStats, MANIFEST_FILE_NAME, Manifest,
    NO_CLASSES_ANSWER, NO_QUESTION_ANSWER, UploadResponse,
};
pub use crate::infrastructure::{
    FsPorts, IndicatifProgressReporter, LineProgressReporter, NoProgressReporter,
};
pub use crate::llm::OllamaClient;
