//! Release page parsing.
//!
//! Every field is decoded independently and all failures are reported
//! together, prefixed with the name of the field that failed.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;

use crate::album::Album;
use crate::html::{attribute, parse_document, query_all_non_empty, query_unique, unique_text};
use crate::models::{Genre, PageKind, ReleaseMetadata, Track};
use crate::validation::{collect_all, lift, zip, Validation};

const ARTIST: &str = "#name-section h3 span a";
const ALBUM: &str = "#name-section > h2.trackTitle";
const CREDITS: &str = "#trackInfoInner .tralbumData.tralbum-credits";
const COVER: &str = "#tralbumArt img";
const TRACK_ROWS: &str = "#track_table tr.track_row_view.linked";
const TRACK_NUMBER: &str = "td.track-number-col div.track_number";
const TRACK_TITLE: &str = "td.title-col span.track-title";

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D(\d{4})").expect("year regex"));

pub const DEFAULT_COVER_EXTENSIONS: &[&str] = &[".jpg", ".jpeg"];

#[derive(Clone, Debug)]
pub struct MetadataParser {
    cover_extensions: Vec<String>,
}

impl Default for MetadataParser {
    fn default() -> Self {
        Self::new(DEFAULT_COVER_EXTENSIONS.iter().map(|ext| ext.to_string()).collect())
    }
}

impl MetadataParser {
    pub fn new(cover_extensions: Vec<String>) -> Self {
        let cover_extensions = cover_extensions
            .into_iter()
            .map(|ext| ext.to_ascii_lowercase())
            .collect();
        Self { cover_extensions }
    }

    pub fn parse(&self, html: &str, kind: PageKind, genre: Genre) -> Validation<ReleaseMetadata> {
        let document = parse_document(html);
        let root = document.root_element();
        match kind {
            PageKind::Album => self.parse_album_page(root, genre),
            PageKind::Track => self.parse_track_page(root, genre),
        }
    }

    fn parse_album_page(&self, root: ElementRef<'_>, genre: Genre) -> Validation<ReleaseMetadata> {
        let artist = lift("artist", unique_text(root, ARTIST));
        let album = lift("album", unique_text(root, ALBUM)).map(|raw| Album::from_raw(&raw));
        let year = parse_year(root);
        let cover_url = self.parse_cover_url(root);
        let tracks = parse_tracks(root);

        let ((artist, album), (year, (cover_url, tracks))) =
            zip(zip(artist, album), zip(year, zip(cover_url, tracks)))?;
        Ok(ReleaseMetadata {
            artist,
            album,
            year,
            genre,
            tracks,
            cover_url,
        })
    }

    fn parse_track_page(&self, root: ElementRef<'_>, genre: Genre) -> Validation<ReleaseMetadata> {
        let artist = lift("artist", unique_text(root, ARTIST));
        let album = lift("album", unique_text(root, ALBUM)).map(|raw| Album::single_track(&raw));
        let year = parse_year(root);
        let cover_url = self.parse_cover_url(root);

        let ((artist, album), (year, cover_url)) = zip(zip(artist, album), zip(year, cover_url))?;
        let tracks = vec![Track {
            number: 1,
            title: album.name.clone(),
        }];
        Ok(ReleaseMetadata {
            artist,
            album,
            year,
            genre,
            tracks,
            cover_url,
        })
    }

    fn parse_cover_url(&self, root: ElementRef<'_>) -> Validation<String> {
        let src = query_unique(root, COVER).and_then(|img| attribute(img, "src", COVER));
        let checked = src.and_then(|src| {
            if self.is_accepted_cover(&src) {
                Ok(src)
            } else {
                Err(format!(
                    "Expected cover to be an image ({}): {src}",
                    self.cover_extensions.join(", ")
                ))
            }
        });
        lift("cover_url", checked)
    }

    fn is_accepted_cover(&self, src: &str) -> bool {
        let path = src.split(['?', '#']).next().unwrap_or(src).to_ascii_lowercase();
        self.cover_extensions.iter().any(|ext| path.ends_with(ext.as_str()))
    }
}

fn parse_year(root: ElementRef<'_>) -> Validation<i32> {
    let year = unique_text(root, CREDITS).and_then(|credits| {
        YEAR.captures(&credits)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .ok_or_else(|| format!("Couldn't find year in string: \"{credits}\""))
    });
    lift("year", year)
}

fn parse_tracks(root: ElementRef<'_>) -> Validation<Vec<Track>> {
    let rows = lift("tracks", query_all_non_empty(root, TRACK_ROWS))?;
    collect_all(
        rows.into_iter()
            .enumerate()
            .map(|(i, row)| parse_track_row(i, row)),
    )
}

fn parse_track_row(i: usize, row: ElementRef<'_>) -> Validation<Track> {
    let number = lift(
        &format!("tracks[{i}].number"),
        unique_text(row, TRACK_NUMBER).and_then(|text| parse_track_number(&text)),
    );
    let title = lift(&format!("tracks[{i}].title"), unique_text(row, TRACK_TITLE));
    let (number, title) = zip(number, title)?;
    Ok(Track { number, title })
}

/// Track numbers render as `"3."`; the trailing punctuation is dropped.
fn parse_track_number(text: &str) -> Result<u32, String> {
    let digits = text.trim_end_matches(|c: char| !c.is_ascii_digit());
    match digits.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("Expected a positive integer: {text}")),
    }
}
