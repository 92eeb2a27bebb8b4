//! Configuration loading and parsing.
//!
//! Every setting is optional; missing ones fall back to defaults when the
//! config is resolved.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::classify::DEFAULT_AUDIO_EXTENSIONS;
use crate::metadata::DEFAULT_COVER_EXTENSIONS;
use crate::models::Genre;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_DOWNLOADER: &str = "yt-dlp";
pub const DEFAULT_DOWNLOADER_ARGS: &[&str] = &["--extract-audio", "--audio-format", "mp3"];

/// Top-level configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// File listing accepted genres, one per line.
    pub genres_file: Option<String>,
    /// User-Agent sent with page and cover requests.
    pub user_agent: Option<String>,
    /// Accepted audio file extensions (default: mp3).
    pub audio_extensions: Option<Vec<String>>,
    /// Accepted cover image extensions (default: .jpg, .jpeg).
    pub cover_extensions: Option<Vec<String>>,
    /// External download program.
    pub downloader: Option<DownloaderConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloaderConfig {
    /// Program to run (default: yt-dlp).
    pub program: Option<String>,
    /// Arguments placed before the release url.
    pub args: Option<Vec<String>>,
}

/// Settings with defaults applied and paths made absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub genres_file: Option<PathBuf>,
    pub user_agent: String,
    pub audio_extensions: Vec<String>,
    pub cover_extensions: Vec<String>,
    pub downloader_program: String,
    pub downloader_args: Vec<String>,
}

impl AppConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<AppConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Apply defaults. Relative paths are taken from `base_dir`.
    pub fn resolve(&self, base_dir: &Path) -> Result<ResolvedConfig> {
        Ok(ResolvedConfig {
            genres_file: genres_file_from_config(self, base_dir),
            user_agent: user_agent_from_config(self),
            audio_extensions: extensions_from_config(
                self.audio_extensions.as_deref(),
                DEFAULT_AUDIO_EXTENSIONS,
                "audio_extensions",
            )?,
            cover_extensions: extensions_from_config(
                self.cover_extensions.as_deref(),
                DEFAULT_COVER_EXTENSIONS,
                "cover_extensions",
            )?,
            downloader_program: downloader_program_from_config(self),
            downloader_args: downloader_args_from_config(self),
        })
    }
}

/// Explicit path if given, else `config.toml` next to the executable when it exists.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join(DEFAULT_CONFIG_FILE);
    candidate.is_file().then_some(candidate)
}

/// Load the config file if there is one and resolve it.
pub fn load_resolved(explicit: Option<&Path>) -> Result<ResolvedConfig> {
    match config_path(explicit) {
        Some(path) => {
            let cfg = AppConfig::load(&path)?;
            let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
            cfg.resolve(base_dir)
        }
        None => AppConfig::default().resolve(Path::new(".")),
    }
}

fn genres_file_from_config(cfg: &AppConfig, base_dir: &Path) -> Option<PathBuf> {
    cfg.genres_file.as_deref().and_then(|path| {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(base_dir.join(trimmed))
        }
    })
}

fn user_agent_from_config(cfg: &AppConfig) -> String {
    cfg.user_agent
        .as_deref()
        .map(str::trim)
        .filter(|agent| !agent.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("bc-dl/{}", env!("CARGO_PKG_VERSION")))
}

fn extensions_from_config(
    configured: Option<&[String]>,
    defaults: &[&str],
    name: &str,
) -> Result<Vec<String>> {
    let Some(configured) = configured else {
        return Ok(defaults.iter().map(|ext| ext.to_string()).collect());
    };
    let extensions: Vec<String> = configured
        .iter()
        .map(|ext| ext.trim().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();
    if extensions.is_empty() {
        bail!("{name} must list at least one extension");
    }
    Ok(extensions)
}

fn downloader_program_from_config(cfg: &AppConfig) -> String {
    cfg.downloader
        .as_ref()
        .and_then(|downloader| downloader.program.as_deref())
        .map(str::trim)
        .filter(|program| !program.is_empty())
        .unwrap_or(DEFAULT_DOWNLOADER)
        .to_string()
}

fn downloader_args_from_config(cfg: &AppConfig) -> Vec<String> {
    cfg.downloader
        .as_ref()
        .and_then(|downloader| downloader.args.clone())
        .unwrap_or_else(|| DEFAULT_DOWNLOADER_ARGS.iter().map(|arg| arg.to_string()).collect())
}

/// Read the accepted genres, one per line.
pub fn load_genres(path: &Path) -> Result<Vec<String>> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("read genres {:?}", path))?;
    let genres: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if genres.is_empty() {
        bail!("Genres file is empty: {}", path.display());
    }
    Ok(genres)
}

/// Validate the genre argument, against the genres file when one is configured.
pub fn check_genre(raw: &str, genres_file: Option<&Path>) -> Result<Genre> {
    let genre = Genre::new(raw).map_err(|err| anyhow::anyhow!(err))?;
    let Some(path) = genres_file else {
        return Ok(genre);
    };
    let known = load_genres(path)?;
    if !known.iter().any(|known| known == genre.as_str()) {
        bail!(
            "Unknown genre \"{}\" (add it to file {})",
            genre,
            path.display()
        );
    }
    Ok(genre)
}
