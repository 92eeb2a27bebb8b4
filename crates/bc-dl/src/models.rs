//! Release and file records shared across the pipeline.

use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::album::Album;
use crate::normalize::pad_number;

static ALBUM_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?://)?[^./]+\.bandcamp\.com/album/.+").expect("album url regex")
});
static TRACK_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?://)?[^./]+\.bandcamp\.com/track/.+").expect("track url regex")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageKind {
    Album,
    Track,
}

/// A release page address, classified up front.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseUrl {
    url: String,
    kind: PageKind,
}

impl ReleaseUrl {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let url = raw.trim();
        let kind = if ALBUM_URL.is_match(url) {
            PageKind::Album
        } else if TRACK_URL.is_match(url) {
            PageKind::Track
        } else {
            return Err(format!("Url was not recognized as album nor track: {raw}"));
        };
        Ok(Self {
            url: url.to_string(),
            kind,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }
}

impl fmt::Display for ReleaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Genre(String);

impl Genre {
    pub fn new(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("genre must not be empty".to_string());
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    pub number: u32,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseMetadata {
    pub artist: String,
    pub album: Album,
    pub year: i32,
    pub genre: Genre,
    /// Never empty, in page order.
    pub tracks: Vec<Track>,
    pub cover_url: String,
}

impl ReleaseMetadata {
    pub fn is_ep(&self) -> bool {
        self.album.is_ep()
    }

    /// `<artist> - <album> - <NN> <title>`, used in diagnostics.
    pub fn describe_track(&self, track: &Track) -> String {
        format!(
            "{} - {} - {} {}",
            self.artist,
            self.album.name,
            pad_number(track.number, 2),
            track.title
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct AudioFile {
    pub path: PathBuf,
    pub basename: String,
}

impl AudioFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let basename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, basename }
    }

    /// File name without its extension.
    pub fn stem(&self) -> String {
        Path::new(&self.basename)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.basename.clone())
    }

    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchAssignment {
    pub file: AudioFile,
    pub track: Track,
}

/// Tag fields we read and write. Everything is optional when read from disk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagSet {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub track_number: Option<u32>,
    pub genre: Option<String>,
    pub performer: Option<String>,
    pub cover: Option<Vec<u8>>,
}

impl TagSet {
    /// Full tag set written for one track of a release.
    pub fn for_track(metadata: &ReleaseMetadata, track: &Track, cover: &[u8]) -> Self {
        Self {
            title: Some(track.title.clone()),
            artist: Some(metadata.artist.clone()),
            album: Some(metadata.album.display_name()),
            year: Some(metadata.year),
            track_number: Some(track.number),
            genre: Some(metadata.genre.to_string()),
            performer: Some(metadata.artist.clone()),
            cover: Some(cover.to_vec()),
        }
    }

    /// Whether the fields needed to identify a track are all present.
    pub fn is_identifying(&self) -> bool {
        (self.artist.is_some() || self.performer.is_some())
            && self.album.is_some()
            && self.track_number.is_some()
    }
}
