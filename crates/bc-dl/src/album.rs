//! Album naming and kind detection (LP, EP or single track).

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize::clean_whitespaces;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlbumKind {
    Lp,
    Ep,
    Track,
}

impl fmt::Display for AlbumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AlbumKind::Lp => "LP",
            AlbumKind::Ep => "EP",
            AlbumKind::Track => "Track",
        };
        f.write_str(label)
    }
}

struct EpMarker {
    pattern: Regex,
    replacement: &'static str,
}

impl EpMarker {
    fn new(pattern: &str, replacement: &'static str) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("ep marker regex"),
            replacement,
        }
    }
}

// Tried in order, first match wins. Case-sensitive so "Deep" never counts.
static EP_MARKERS: Lazy<Vec<EpMarker>> = Lazy::new(|| {
    vec![
        // "(EP)", "[E.P.]"
        EpMarker::new(r"\s*[\(\[]\s*E\s*\.?\s*P\s*\.?\s*[\)\]]\s*", " "),
        // "EP: name", "EP - name", "EP. name", "EP name"
        EpMarker::new(r"^\s*E\s*\.?\s*P(?:\s*\.)?(?:\s*[:\-]\s*|\s+|$)", " "),
        // "name: EP", "name - EP", "name EP."
        EpMarker::new(r"(?:\s*[:\-])?\s+E\s*\.?\s*P(?:\s*\.)?\s*$", " "),
        // "name - EP - subtitle"
        EpMarker::new(r"([:\-])\s+E\s*\.?\s*P(?:\s*\.)?\s+([:\-])", "$2"),
    ]
});

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Album {
    pub name: String,
    pub kind: AlbumKind,
}

impl Album {
    /// Classify a raw album title, stripping the first EP marker found.
    pub fn from_raw(raw: &str) -> Self {
        let raw = raw.trim();
        for marker in EP_MARKERS.iter() {
            if !marker.pattern.is_match(raw) {
                continue;
            }
            let stripped = marker.pattern.replacen(raw, 1, marker.replacement);
            let name = clean_whitespaces(&stripped).trim().to_string();
            if name.is_empty() {
                break;
            }
            return Self {
                name,
                kind: AlbumKind::Ep,
            };
        }
        Self {
            name: raw.to_string(),
            kind: AlbumKind::Lp,
        }
    }

    /// Album of a single-track release; markers are not interpreted.
    pub fn single_track(title: &str) -> Self {
        Self {
            name: title.trim().to_string(),
            kind: AlbumKind::Track,
        }
    }

    pub fn is_ep(&self) -> bool {
        self.kind == AlbumKind::Ep
    }

    /// Name used for the album tag and the album directory.
    pub fn display_name(&self) -> String {
        match self.kind {
            AlbumKind::Lp => self.name.clone(),
            AlbumKind::Ep => format!("{} (EP)", self.name),
            AlbumKind::Track => format!("{} (Track)", self.name),
        }
    }
}
