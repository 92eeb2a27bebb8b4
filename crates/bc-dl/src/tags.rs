//! Audio tag reading and writing.

use std::path::Path;

use anyhow::{Context, Result};
use lofty::config::WriteOptions;
use lofty::file::TaggedFile;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::*;
use lofty::read_from_path;
use lofty::tag::{ItemKey, Tag, TagType};

use crate::models::TagSet;

/// Tag access for one file at a time. Calls block, so async callers run them
/// on the blocking pool.
pub trait TagStore: Send + Sync {
    fn read(&self, path: &Path) -> Result<TagSet>;
    fn write(&self, path: &Path, tags: &TagSet) -> Result<()>;
}

/// [`TagStore`] backed by `lofty`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoftyTagStore;

impl TagStore for LoftyTagStore {
    fn read(&self, path: &Path) -> Result<TagSet> {
        let tagged_file =
            read_from_path(path).with_context(|| format!("read tags {:?}", path))?;
        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            return Ok(TagSet::default());
        };
        Ok(tag_set_from(tag))
    }

    fn write(&self, path: &Path, tags: &TagSet) -> Result<()> {
        let mut tagged_file =
            read_from_path(path).with_context(|| format!("read tags {:?}", path))?;
        let tag_type = writable_tag_type(&tagged_file, path);
        if tagged_file.tag(tag_type).is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .tag_mut(tag_type)
            .with_context(|| format!("create {:?} tag in {:?}", tag_type, path))?;
        apply_tag_set(tag, tags);

        tagged_file
            .save_to_path(path, WriteOptions::default())
            .with_context(|| format!("write tags {:?}", path))
    }
}

/// Existing primary tag, else any existing tag, else the usual one for the extension.
fn writable_tag_type(tagged_file: &TaggedFile, path: &Path) -> TagType {
    let primary = tagged_file.primary_tag_type();
    if tagged_file.tag(primary).is_some() {
        return primary;
    }
    tagged_file
        .first_tag()
        .map(|tag| tag.tag_type())
        .or_else(|| default_tag_type(path))
        .unwrap_or(primary)
}

fn apply_tag_set(tag: &mut Tag, tags: &TagSet) {
    if let Some(value) = &tags.title {
        tag.set_title(value.clone());
    }
    if let Some(value) = &tags.artist {
        tag.set_artist(value.clone());
    }
    if let Some(value) = &tags.album {
        tag.set_album(value.clone());
    }
    if let Some(value) = &tags.performer {
        tag.insert_text(ItemKey::AlbumArtist, value.clone());
    }
    if let Some(value) = tags.year {
        if value > 0 {
            tag.insert_text(ItemKey::RecordingDate, value.to_string());
        }
    }
    if let Some(value) = tags.track_number {
        if value > 0 {
            tag.set_track(value);
        }
    }
    if let Some(value) = &tags.genre {
        tag.set_genre(value.clone());
    }
    if let Some(cover) = &tags.cover {
        tag.remove_picture_type(PictureType::CoverFront);
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Jpeg),
            None,
            cover.clone(),
        ));
    }
}

fn tag_set_from(tag: &Tag) -> TagSet {
    let text = |value: Option<std::borrow::Cow<'_, str>>| {
        value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    let year = tag
        .get_string(&ItemKey::RecordingDate)
        .or_else(|| tag.get_string(&ItemKey::Year))
        .and_then(parse_year);
    let cover = tag
        .pictures()
        .iter()
        .find(|picture| picture.pic_type() == PictureType::CoverFront)
        .or_else(|| tag.pictures().first())
        .map(|picture| picture.data().to_vec());
    TagSet {
        title: text(tag.title()),
        artist: text(tag.artist()),
        album: text(tag.album()),
        year,
        track_number: tag.track(),
        genre: text(tag.genre()),
        performer: tag
            .get_string(&ItemKey::AlbumArtist)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        cover,
    }
}

/// Leading year of a date such as `2020` or `2020-06-26`.
fn parse_year(value: &str) -> Option<i32> {
    let digits: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.len() != 4 {
        return None;
    }
    digits.parse().ok()
}

fn default_tag_type(path: &Path) -> Option<TagType> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let tag_type = match ext.as_str() {
        "flac" | "ogg" | "oga" | "opus" => TagType::VorbisComments,
        "mp4" | "m4a" | "m4b" | "aac" => TagType::Mp4Ilst,
        "ape" | "wv" | "mpc" => TagType::Ape,
        _ => TagType::Id3v2,
    };
    Some(tag_type)
}
