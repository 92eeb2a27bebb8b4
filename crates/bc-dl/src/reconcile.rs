//! Matching downloaded files to the release track list.
//!
//! File names are folded with [`clean_for_compare`], the artist and album
//! names shared by every file are stripped, then each track claims the files
//! containing its title. A file claimed by several tracks belongs to the one
//! with the longest title. The result is either a one-to-one assignment or
//! the complete list of what could not be resolved.

use std::cmp::Ordering;

use crate::album::{Album, AlbumKind};
use crate::models::{AudioFile, MatchAssignment, ReleaseMetadata, TagSet, Track};
use crate::normalize::{almost_equals, clean_for_compare, clean_whitespaces};
use crate::validation::{Validation, ValidationError};

/// An audio file along with the tags already present on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaggedFile {
    pub file: AudioFile,
    pub tags: TagSet,
}

/// Match files to tracks by file name.
///
/// Every file must own exactly one track; tracks without a file are left out,
/// since a release may be only partly downloadable.
pub fn reconcile(
    files: &[AudioFile],
    metadata: &ReleaseMetadata,
) -> Validation<Vec<MatchAssignment>> {
    let titles = cleaned_titles(&metadata.tracks);
    let mut names: Vec<String> = files
        .iter()
        .map(|file| clean_for_compare(&file.stem()))
        .collect();
    strip_known_names(&mut names, &deletion_candidates(metadata), &titles);
    let owners = resolve_owners(&names, &titles, &metadata.tracks, files, metadata);

    let mut errors = Vec::new();
    let mut assignments = Vec::new();
    for (t, track) in metadata.tracks.iter().enumerate() {
        let candidates: Vec<usize> = (0..files.len())
            .filter(|&f| owners[f] == Some(t))
            .collect();
        match candidates.as_slice() {
            [f] => assignments.push(MatchAssignment {
                file: files[*f].clone(),
                track: track.clone(),
            }),
            [] => tracing::debug!(track = %metadata.describe_track(track), "no file for track"),
            many => errors.push(several_files_for(
                metadata,
                track,
                many.iter().map(|&f| &files[f]),
            )),
        }
    }
    for (f, file) in files.iter().enumerate() {
        if owners[f].is_none() {
            errors.push(format!("Couldn't find track matching file: {}", file.basename));
        }
    }
    if assignments.is_empty() && errors.is_empty() {
        errors.extend(metadata.tracks.iter().map(|track| no_file_for(metadata, track)));
    }

    finish(assignments, errors, files, metadata)
}

/// Match files to tracks by the tags already written on them.
///
/// Files whose tags match no track are ignored, since the caller may hand
/// over files belonging to other releases.
pub fn reconcile_by_tags(
    files: &[TaggedFile],
    metadata: &ReleaseMetadata,
) -> Validation<Vec<MatchAssignment>> {
    let titles = cleaned_titles(&metadata.tracks);
    let deletions = deletion_candidates(metadata);

    let mut errors = Vec::new();
    let mut assignments: Vec<MatchAssignment> = Vec::new();
    for (t, track) in metadata.tracks.iter().enumerate() {
        let candidates: Vec<&TaggedFile> = files
            .iter()
            .filter(|tagged| tags_match_track(&tagged.tags, metadata, track))
            .collect();
        let chosen = match candidates.as_slice() {
            [] => Err(no_file_for(metadata, track)),
            [only] => Ok(*only),
            many => disambiguate_by_title(many, t, &deletions, &titles, metadata),
        };
        match chosen {
            Ok(tagged) => assignments.push(MatchAssignment {
                file: tagged.file.clone(),
                track: track.clone(),
            }),
            Err(err) => errors.push(err),
        }
    }

    for (i, assignment) in assignments.iter().enumerate() {
        let first = assignments
            .iter()
            .position(|other| other.file == assignment.file);
        if first == Some(i)
            && assignments[i + 1..]
                .iter()
                .any(|other| other.file == assignment.file)
        {
            errors.push(format!(
                "File matches more than one track: {}",
                assignment.file.basename
            ));
        }
    }

    let considered: Vec<AudioFile> = files.iter().map(|tagged| tagged.file.clone()).collect();
    finish(assignments, errors, &considered, metadata)
}

/// Reconcile a fresh download, trusting embedded tags when they identify
/// every file and falling back to file names otherwise.
pub fn reconcile_downloaded(
    files: &[TaggedFile],
    metadata: &ReleaseMetadata,
) -> Validation<Vec<MatchAssignment>> {
    if !files.is_empty() && files.iter().all(|tagged| tagged.tags.is_identifying()) {
        match reconcile_by_tags(files, metadata) {
            Ok(assignments) if assignments.len() == files.len() => {
                tracing::debug!(files = files.len(), "files matched by tags");
                return Ok(assignments);
            }
            Ok(_) => tracing::debug!("tags left some files unmatched, using file names"),
            Err(err) => tracing::debug!(error = %err, "tags did not match, using file names"),
        }
    }
    let plain: Vec<AudioFile> = files.iter().map(|tagged| tagged.file.clone()).collect();
    reconcile(&plain, metadata)
}

fn finish(
    assignments: Vec<MatchAssignment>,
    mut errors: Vec<String>,
    files: &[AudioFile],
    metadata: &ReleaseMetadata,
) -> Validation<Vec<MatchAssignment>> {
    if errors.is_empty() {
        return Ok(assignments);
    }
    let considered_files: Vec<&str> = files.iter().map(|file| file.basename.as_str()).collect();
    let considered_tracks: Vec<String> = metadata
        .tracks
        .iter()
        .map(|track| metadata.describe_track(track))
        .collect();
    errors.push(format!("Considered files:\n{}", considered_files.join("\n")));
    errors.push(format!("Considered tracks:\n{}", considered_tracks.join("\n")));
    match ValidationError::from_messages(errors) {
        Some(err) => Err(err),
        None => Ok(assignments),
    }
}

fn no_file_for(metadata: &ReleaseMetadata, track: &Track) -> String {
    format!(
        "Couldn't find file matching track: {}",
        metadata.describe_track(track)
    )
}

fn several_files_for<'a>(
    metadata: &ReleaseMetadata,
    track: &Track,
    files: impl Iterator<Item = &'a AudioFile>,
) -> String {
    let mut message = format!(
        "Found more than one file matching track: {}",
        metadata.describe_track(track)
    );
    for file in files {
        message.push_str("\n- ");
        message.push_str(&file.basename);
    }
    message
}

fn cleaned_titles(tracks: &[Track]) -> Vec<String> {
    tracks.iter().map(|track| clean_for_compare(&track.title)).collect()
}

/// Artist and album names to strip, longest first then lexicographic.
///
/// Not deduplicated: an eponymous release has its name twice in file names.
fn deletion_candidates(metadata: &ReleaseMetadata) -> Vec<String> {
    let mut candidates = vec![clean_for_compare(&metadata.artist)];
    if metadata.album.kind != AlbumKind::Track {
        candidates.push(clean_for_compare(&metadata.album.name));
    }
    candidates.retain(|candidate| !candidate.is_empty());
    candidates.sort_by(|a, b| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    });
    candidates
}

fn contains_any_title(name: &str, titles: &[String]) -> bool {
    titles
        .iter()
        .any(|title| !title.is_empty() && name.contains(title.as_str()))
}

/// Delete each candidate found in every name, unless that would leave a name
/// which matched some title matching none.
fn strip_known_names(names: &mut [String], candidates: &[String], titles: &[String]) {
    for candidate in candidates {
        if !names.iter().all(|name| name.contains(candidate.as_str())) {
            continue;
        }
        let stripped: Vec<String> = names
            .iter()
            .map(|name| {
                clean_whitespaces(&name.replacen(candidate.as_str(), "", 1))
                    .trim()
                    .to_string()
            })
            .collect();
        let keeps_titles = names.iter().zip(&stripped).all(|(before, after)| {
            !contains_any_title(before, titles) || contains_any_title(after, titles)
        });
        if keeps_titles {
            names.clone_from_slice(&stripped);
        } else {
            tracing::debug!(%candidate, "not stripping name, it would hide a track title");
        }
    }
}

/// Claim priority: longest title, then lexicographic title, then lower
/// track number.
fn claim_order(titles: &[String], tracks: &[Track], a: usize, b: usize) -> Ordering {
    titles[b]
        .chars()
        .count()
        .cmp(&titles[a].chars().count())
        .then_with(|| titles[a].cmp(&titles[b]))
        .then_with(|| tracks[a].number.cmp(&tracks[b].number))
        .then_with(|| a.cmp(&b))
}

/// Owner of each name among the tracks claiming it, if any.
fn resolve_owners(
    names: &[String],
    titles: &[String],
    tracks: &[Track],
    files: &[AudioFile],
    metadata: &ReleaseMetadata,
) -> Vec<Option<usize>> {
    names
        .iter()
        .zip(files)
        .map(|(name, file)| {
            let mut claims: Vec<usize> = titles
                .iter()
                .enumerate()
                .filter(|(_, title)| !title.is_empty() && name.contains(title.as_str()))
                .map(|(t, _)| t)
                .collect();
            claims.sort_by(|&a, &b| claim_order(titles, tracks, a, b));
            if claims.len() > 1 {
                let claimed_by: Vec<String> = claims
                    .iter()
                    .map(|&t| metadata.describe_track(&tracks[t]))
                    .collect();
                tracing::warn!(
                    file = %file.basename,
                    chosen = %claimed_by[0],
                    tracks = ?claimed_by,
                    "several tracks match one file, keeping the longest title"
                );
            }
            claims.first().copied()
        })
        .collect()
}

fn tags_match_track(tags: &TagSet, metadata: &ReleaseMetadata, track: &Track) -> bool {
    let artist_matches = [&tags.artist, &tags.performer]
        .into_iter()
        .flatten()
        .any(|artist| almost_equals(artist, &metadata.artist));
    let album_matches = tags.album.as_deref().is_some_and(|album| {
        almost_equals(album, &metadata.album.name)
            || almost_equals(album, &metadata.album.display_name())
            || (metadata.is_ep() && almost_equals(&Album::from_raw(album).name, &metadata.album.name))
    });
    artist_matches && album_matches && tags.track_number == Some(track.number)
}

/// Second pass for a track whose tags matched several files: compare tag
/// titles (file names when untitled) the way file names are compared.
fn disambiguate_by_title<'a>(
    candidates: &[&'a TaggedFile],
    track_index: usize,
    deletions: &[String],
    titles: &[String],
    metadata: &ReleaseMetadata,
) -> Result<&'a TaggedFile, String> {
    let files: Vec<AudioFile> = candidates.iter().map(|tagged| tagged.file.clone()).collect();
    let mut names: Vec<String> = candidates
        .iter()
        .map(|tagged| {
            let text = tagged.tags.title.clone().unwrap_or_else(|| tagged.file.stem());
            clean_for_compare(&text)
        })
        .collect();
    strip_known_names(&mut names, deletions, titles);
    let owners = resolve_owners(&names, titles, &metadata.tracks, &files, metadata);

    let owned: Vec<usize> = (0..candidates.len())
        .filter(|&c| owners[c] == Some(track_index))
        .collect();
    let track = &metadata.tracks[track_index];
    match owned.as_slice() {
        [c] => Ok(candidates[*c]),
        [] => Err(several_files_for(metadata, track, files.iter())),
        many => Err(several_files_for(metadata, track, many.iter().map(|&c| &files[c]))),
    }
}
