use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use walkdir::WalkDir;

use crate::application::{
    DatasetError, DirListing, FilePorts, ProgressReporter, SkipReason, ZipEntryOutcome,
};
use crate::domain::{ExtractStats, Manifest};

pub struct FsPorts;

impl FsPorts {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FsPorts {
    fn default() -> Self {
        Self::new()
    }
}

impl FilePorts for FsPorts {
    fn list_dir(&self, dir: &Path) -> Result<DirListing, DatasetError> {
        let mut listing = DirListing::default();

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|err| DatasetError::Message(err.to_string()))?;
            let file_type = entry.file_type();

            if file_type.is_dir() {
                listing.directories.push(entry.into_path());
            } else if file_type.is_file() {
                listing.files.push(entry.into_path());
            }
        }

        Ok(listing)
    }

    fn resolve_dir(&self, dir: &Path) -> Result<Option<PathBuf>, DatasetError> {
        match fs::canonicalize(dir) {
            Ok(path) if path.is_dir() => Ok(Some(path)),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn clear_dir(&self, dir: &Path) -> Result<(), DatasetError> {
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;
        Ok(())
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), DatasetError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    fn extract_zip(
        &self,
        zip_path: &Path,
        output_dir: &Path,
        on_entry: &mut dyn FnMut(ZipEntryOutcome),
    ) -> Result<(), DatasetError> {
        fs::create_dir_all(output_dir)?;
        let root = fs::canonicalize(output_dir)?;

        let file = fs::File::open(zip_path)?;
        let mut archive = zip::ZipArchive::new(file)?;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_string();

            let target = match entry_target(&root, &name) {
                Ok(target) => target,
                Err(reason) => {
                    on_entry(ZipEntryOutcome::Skipped { name, reason });
                    continue;
                }
            };

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                on_entry(ZipEntryOutcome::Directory);
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut output_file = fs::File::create(&target)?;
                io::copy(&mut entry, &mut output_file)?;
                on_entry(ZipEntryOutcome::File);
            }
        }

        Ok(())
    }

    fn write_manifest(&self, path: &Path, manifest: &Manifest) -> Result<(), DatasetError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(manifest)?;
        fs::write(path, json)?;
        Ok(())
    }

    fn read_manifest(&self, path: &Path) -> Result<Option<Manifest>, DatasetError> {
        if !path.is_file() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }
}

/// Where an archive entry lands under `root`, or why it must be skipped.
///
/// `root` must already be canonical. The target has to be strictly below it,
/// compared by path components so that `dest-evil` never counts as inside `dest`.
pub fn entry_target(root: &Path, entry_name: &str) -> Result<PathBuf, SkipReason> {
    let entry_path = Path::new(entry_name);
    let has_prefix = entry_path
        .components()
        .any(|component| matches!(component, Component::Prefix(_)));

    if entry_path.is_absolute() || entry_path.has_root() || has_prefix {
        return Err(SkipReason::AbsolutePath);
    }

    let resolved = resolve_lenient(&root.join(entry_path));
    if resolved.as_path() != root && resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(SkipReason::OutsideDestination)
    }
}

/// Canonicalizes the deepest existing ancestor and appends the rest.
fn resolve_lenient(path: &Path) -> PathBuf {
    let normalized = normalize_lexically(path);
    let mut existing = normalized.as_path();
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            let mut resolved = canonical;
            for part in missing.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }

        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return normalized,
        }
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    normalized
}

pub struct NoProgressReporter;

impl NoProgressReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for NoProgressReporter {
    fn on_start(&self, _archive: &Path) {}

    fn on_update(&self, _stats: &ExtractStats) {}

    fn on_skipped_entry(&self, _name: &str, _reason: SkipReason) {}

    fn on_finish(&self, _stats: &ExtractStats) {}
}

pub struct IndicatifProgressReporter {
    bar: ProgressBar,
}

impl IndicatifProgressReporter {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    pub fn with_draw_target(draw_target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(None, draw_target);
        let style = ProgressStyle::with_template("{spinner:.yellow} {msg:.blue}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));

        Self { bar }
    }
}

impl Default for IndicatifProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn on_start(&self, archive: &Path) {
        let _ = self.bar.println(format!("extracting: {}", archive.display()));
        self.bar.set_message(format_stats(&ExtractStats::default()));
    }

    fn on_update(&self, stats: &ExtractStats) {
        self.bar.set_message(format_stats(stats));
    }

    fn on_skipped_entry(&self, name: &str, reason: SkipReason) {
        let message = format!("skipped entry: {name} ({reason})");
        let _ = self.bar.println(style(message).red().to_string());
    }

    fn on_finish(&self, stats: &ExtractStats) {
        self.bar.disable_steady_tick();
        self.bar.finish_with_message(format_stats(stats));
    }
}

struct LineProgressState<W: Write> {
    writer: W,
    last_stats: ExtractStats,
    started: bool,
}

pub struct LineProgressReporter<W: Write + Send> {
    state: Mutex<LineProgressState<W>>,
}

impl LineProgressReporter<std::io::Stderr> {
    pub fn new() -> Self {
        Self::with_writer(std::io::stderr())
    }
}

impl<W: Write + Send> LineProgressReporter<W> {
    pub fn with_writer(writer: W) -> Self {
        Self {
            state: Mutex::new(LineProgressState {
                writer,
                last_stats: ExtractStats::default(),
                started: false,
            }),
        }
    }

    pub fn into_inner(self) -> W {
        let state = match self.state.into_inner() {
            Ok(state) => state,
            Err(err) => err.into_inner(),
        };
        state.writer
    }
}

impl<W: Write + Send> ProgressReporter for LineProgressReporter<W> {
    fn on_start(&self, archive: &Path) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(err) => err.into_inner(),
        };

        if state.started {
            return;
        }

        let _ = writeln!(state.writer, "extracting: {}", archive.display());
        let _ = state.writer.flush();
        state.started = true;
    }

    fn on_update(&self, stats: &ExtractStats) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(err) => err.into_inner(),
        };

        if *stats == state.last_stats {
            return;
        }

        let _ = write!(state.writer, "\r{}", format_stats(stats));
        let _ = state.writer.flush();
        state.last_stats = *stats;
    }

    fn on_skipped_entry(&self, name: &str, reason: SkipReason) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(err) => err.into_inner(),
        };

        let _ = write!(state.writer, "\nskipped entry: {name} ({reason})\n");
        let _ = state.writer.flush();
    }

    fn on_finish(&self, stats: &ExtractStats) {
        self.on_update(stats);
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(err) => err.into_inner(),
        };
        let _ = writeln!(state.writer);
        let _ = state.writer.flush();
    }
}

fn format_stats(stats: &ExtractStats) -> String {
    format!(
        "entries: {} files: {} skipped: {}",
        stats.entries, stats.files_written, stats.skipped
    )
}
