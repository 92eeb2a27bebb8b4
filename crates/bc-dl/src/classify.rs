//! Directory listing classification.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::AudioFile;
use crate::validation::{Validation, ValidationError};

pub const DEFAULT_AUDIO_EXTENSIONS: &[&str] = &["mp3"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Read the direct children of `dir`.
pub async fn list_dir(dir: &Path) -> Result<Vec<DirEntry>> {
    let mut reader = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("read dir {:?}", dir))?;
    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .with_context(|| format!("read dir entry in {:?}", dir))?
    {
        let file_type = entry
            .file_type()
            .await
            .with_context(|| format!("stat {:?}", entry.path()))?;
        entries.push(DirEntry {
            path: entry.path(),
            is_dir: file_type.is_dir(),
        });
    }
    Ok(entries)
}

#[derive(Clone, Debug)]
pub struct FileClassifier {
    audio_extensions: Vec<String>,
}

impl Default for FileClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIO_EXTENSIONS.iter().map(|ext| ext.to_string()).collect())
    }
}

impl FileClassifier {
    pub fn new(audio_extensions: Vec<String>) -> Self {
        let audio_extensions = audio_extensions
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self { audio_extensions }
    }

    fn is_audio(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.audio_extensions.iter().any(|accepted| *accepted == ext)
            })
            .unwrap_or(false)
    }

    /// Audio files of a freshly populated album directory.
    ///
    /// Anything else in the directory is an error, as is an empty result.
    pub fn classify(&self, dir: &Path, entries: Vec<DirEntry>) -> Validation<Vec<AudioFile>> {
        let mut files = Vec::new();
        let mut errors = Vec::new();
        for entry in entries {
            if entry.is_dir {
                errors.push(format!("Unexpected directory: {}", entry.path.display()));
            } else if !self.is_audio(&entry.path) {
                errors.push(format!("Non audio file: {}", entry.path.display()));
            } else {
                files.push(AudioFile::from_path(entry.path));
            }
        }
        if let Some(err) = ValidationError::from_messages(errors) {
            return Err(err);
        }
        if files.is_empty() {
            return Err(ValidationError::new(format!(
                "Empty directory after download: {}",
                dir.display()
            )));
        }
        files.sort();
        Ok(files)
    }

    /// Audio files among `entries`, skipping everything else.
    pub fn audio_files_in(&self, entries: Vec<DirEntry>) -> Vec<AudioFile> {
        let mut files: Vec<_> = entries
            .into_iter()
            .filter(|entry| !entry.is_dir && self.is_audio(&entry.path))
            .map(|entry| AudioFile::from_path(entry.path))
            .collect();
        files.sort();
        files
    }
}
