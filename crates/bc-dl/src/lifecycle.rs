//! Per-release pipeline.
//!
//! Fetch metadata and cover, create the album directory, fill it, match the
//! files against the track list, then tag and rename them. Once the album
//! directory exists, any failure removes it again before being reported.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use futures_util::future::join_all;
use thiserror::Error;

use crate::classify::{list_dir, FileClassifier};
use crate::downloader::AudioDownloader;
use crate::http::ReleaseSource;
use crate::metadata::MetadataParser;
use crate::models::{
    AudioFile, Genre, MatchAssignment, ReleaseMetadata, ReleaseUrl, TagSet,
};
use crate::normalize::{clean_file_name, pad_number};
use crate::reconcile::{reconcile_by_tags, reconcile_downloaded, TaggedFile};
use crate::tags::TagStore;
use crate::validation::ValidationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    FetchingMetadata,
    DownloadingCover,
    CreatingDirectory,
    DownloadingAudio,
    ListingAndReconciling,
    WritingTags,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::FetchingMetadata => "fetching metadata",
            Stage::DownloadingCover => "downloading cover",
            Stage::CreatingDirectory => "creating album directory",
            Stage::DownloadingAudio => "downloading audio",
            Stage::ListingAndReconciling => "listing and matching files",
            Stage::WritingTags => "writing tags and renaming",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("{0}")]
    InvalidUrl(String),
    #[error("{stage} failed: {cause:#}")]
    Stage { stage: Stage, cause: anyhow::Error },
    #[error("Errors while parsing release metadata:\n{0}")]
    Metadata(ValidationError),
    #[error("Errors while matching files with tracks:\n{0}")]
    Unresolved(ValidationError),
    #[error("Album directory already exists, this might be an error: {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("{stage} failed, removed {}:\n{cause:#}", .dir.display())]
    RolledBack {
        dir: PathBuf,
        stage: Stage,
        cause: anyhow::Error,
    },
    #[error("{stage} failed and removing {} failed too ({rollback}):\n{cause:#}", .dir.display())]
    RollbackFailed {
        dir: PathBuf,
        stage: Stage,
        cause: anyhow::Error,
        rollback: std::io::Error,
    },
}

impl ReleaseError {
    /// Stage the release stopped at, when known.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ReleaseError::Stage { stage, .. }
            | ReleaseError::RolledBack { stage, .. }
            | ReleaseError::RollbackFailed { stage, .. } => Some(*stage),
            ReleaseError::Metadata(_) => Some(Stage::FetchingMetadata),
            ReleaseError::Unresolved(_) => Some(Stage::ListingAndReconciling),
            ReleaseError::AlreadyExists(_) => Some(Stage::CreatingDirectory),
            ReleaseError::InvalidUrl(_) => None,
        }
    }
}

/// A failure inside the album directory, before rollback.
struct StageFailure {
    stage: Stage,
    cause: anyhow::Error,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, StageFailure>;
}

impl<T, E> AtStage<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn at(self, stage: Stage) -> Result<T, StageFailure> {
        self.map_err(|err| StageFailure {
            stage,
            cause: err.into(),
        })
    }
}

impl From<StageFailure> for ReleaseError {
    fn from(failure: StageFailure) -> Self {
        ReleaseError::Stage {
            stage: failure.stage,
            cause: failure.cause,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Run the downloader into a fresh album directory.
    Download,
    /// Use audio files already present at the library root.
    TagFiles,
}

/// How assigned files reach the album directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Placement {
    /// Tag in place, then rename into the directory.
    Move,
    /// Copy into the directory and tag the copy; sources are left untouched.
    Copy,
}

#[derive(Debug)]
pub struct ReleaseOutcome {
    pub url: String,
    pub result: Result<PathBuf, ReleaseError>,
}

/// `<library>/<artist>/[<year>] <album>`, with unsafe characters removed.
pub fn album_dir(library: &Path, metadata: &ReleaseMetadata) -> PathBuf {
    let album = format!("[{}] {}", metadata.year, metadata.album.display_name());
    library
        .join(clean_file_name(&metadata.artist))
        .join(clean_file_name(&album))
}

/// Final file name of a track, keeping the source extension.
pub fn track_file_name(assignment: &MatchAssignment) -> String {
    let name = match assignment.file.extension() {
        Some(ext) => format!(
            "{} - {}.{}",
            pad_number(assignment.track.number, 2),
            assignment.track.title,
            ext
        ),
        None => format!(
            "{} - {}",
            pad_number(assignment.track.number, 2),
            assignment.track.title
        ),
    };
    clean_file_name(&name)
}

pub struct ReleasePipeline {
    source: Arc<dyn ReleaseSource>,
    downloader: Arc<dyn AudioDownloader>,
    tags: Arc<dyn TagStore>,
    parser: MetadataParser,
    classifier: FileClassifier,
}

impl ReleasePipeline {
    pub fn new(
        source: Arc<dyn ReleaseSource>,
        downloader: Arc<dyn AudioDownloader>,
        tags: Arc<dyn TagStore>,
        parser: MetadataParser,
        classifier: FileClassifier,
    ) -> Self {
        Self {
            source,
            downloader,
            tags,
            parser,
            classifier,
        }
    }

    /// Process every url in turn; one failure does not stop the others.
    pub async fn run_all(
        &self,
        mode: Mode,
        library: &Path,
        genre: &Genre,
        urls: &[String],
    ) -> Vec<ReleaseOutcome> {
        let mut outcomes = Vec::with_capacity(urls.len());
        for raw in urls {
            let result = match ReleaseUrl::parse(raw) {
                Ok(url) => match mode {
                    Mode::Download => self.download_release(library, &url, genre).await,
                    Mode::TagFiles => self.tag_files_release(library, &url, genre).await,
                },
                Err(err) => Err(ReleaseError::InvalidUrl(err)),
            };
            match &result {
                Ok(dir) => tracing::info!(url = %raw, dir = ?dir, "release done"),
                Err(err) => tracing::error!(url = %raw, "{err}"),
            }
            outcomes.push(ReleaseOutcome {
                url: raw.clone(),
                result,
            });
        }
        outcomes
    }

    /// Download a release into a new album directory and tag it.
    pub async fn download_release(
        &self,
        library: &Path,
        url: &ReleaseUrl,
        genre: &Genre,
    ) -> Result<PathBuf, ReleaseError> {
        let (metadata, cover) = self.fetch_release(url, genre).await?;
        tracing::info!(url = %url, "computing destination");
        let dir = album_dir(library, &metadata);
        create_album_dir(&dir).await?;
        tracing::info!(url = %url, dir = ?dir, "album directory created");

        with_rollback(&dir, async {
            tracing::info!(url = %url, "running downloader");
            self.downloader
                .download(url.as_str(), &dir)
                .await
                .at(Stage::DownloadingAudio)?;

            tracing::info!(url = %url, "matching files with tracks");
            let entries = list_dir(&dir).await.at(Stage::ListingAndReconciling)?;
            let files = self
                .classifier
                .classify(&dir, entries)
                .map_err(|err| anyhow!("Errors while listing audio files:\n{err}"))
                .at(Stage::ListingAndReconciling)?;
            let tagged = self
                .read_tags(files)
                .await
                .at(Stage::ListingAndReconciling)?;
            let assignments = reconcile_downloaded(&tagged, &metadata)
                .map_err(|err| anyhow!("Errors while matching files with tracks:\n{err}"))
                .at(Stage::ListingAndReconciling)?;

            tracing::info!(url = %url, files = assignments.len(), "writing tags");
            self.apply(&dir, &metadata, &cover, assignments, Placement::Move)
                .await
                .map(|_| ())
                .at(Stage::WritingTags)
        })
        .await?;
        Ok(dir)
    }

    /// Tag audio files found at the library root and move them into a new
    /// album directory.
    ///
    /// Library files are only removed once every track is in place, so a
    /// failed release leaves the library root untouched.
    pub async fn tag_files_release(
        &self,
        library: &Path,
        url: &ReleaseUrl,
        genre: &Genre,
    ) -> Result<PathBuf, ReleaseError> {
        let (metadata, cover) = self.fetch_release(url, genre).await?;

        tracing::info!(url = %url, library = ?library, "matching library files by tags");
        let entries = list_dir(library).await.at(Stage::ListingAndReconciling)?;
        let files = self.classifier.audio_files_in(entries);
        let tagged = self
            .read_tags(files)
            .await
            .at(Stage::ListingAndReconciling)?;
        let assignments =
            reconcile_by_tags(&tagged, &metadata).map_err(ReleaseError::Unresolved)?;

        tracing::info!(url = %url, "computing destination");
        let dir = album_dir(library, &metadata);
        create_album_dir(&dir).await?;
        tracing::info!(url = %url, dir = ?dir, "album directory created");

        let sources = with_rollback(&dir, async {
            tracing::info!(url = %url, files = assignments.len(), "writing tags");
            self.apply(&dir, &metadata, &cover, assignments, Placement::Copy)
                .await
                .at(Stage::WritingTags)
        })
        .await?;

        for source in sources {
            if let Err(err) = tokio::fs::remove_file(&source).await {
                tracing::warn!(file = ?source, error = %err, "could not remove library file after copying it");
            }
        }
        Ok(dir)
    }

    async fn fetch_release(
        &self,
        url: &ReleaseUrl,
        genre: &Genre,
    ) -> Result<(ReleaseMetadata, Vec<u8>), ReleaseError> {
        tracing::info!(url = %url, "fetching metadata");
        let page = self
            .source
            .fetch_page(url.as_str())
            .await
            .at(Stage::FetchingMetadata)?;
        let metadata = self
            .parser
            .parse(&page, url.kind(), genre.clone())
            .map_err(ReleaseError::Metadata)?;
        tracing::info!(
            url = %url,
            artist = %metadata.artist,
            album = %metadata.album.display_name(),
            year = metadata.year,
            tracks = metadata.tracks.len(),
            "release metadata parsed"
        );

        tracing::info!(url = %url, cover = %metadata.cover_url, "downloading cover");
        let cover = self
            .source
            .fetch_binary(&metadata.cover_url)
            .await
            .at(Stage::DownloadingCover)?;
        Ok((metadata, cover))
    }

    async fn read_tags(&self, files: Vec<AudioFile>) -> anyhow::Result<Vec<TaggedFile>> {
        let store = Arc::clone(&self.tags);
        tokio::task::spawn_blocking(move || {
            files
                .into_iter()
                .map(|file| {
                    let tags = store.read(&file.path).unwrap_or_else(|err| {
                        tracing::warn!(file = ?file.path, error = %err, "unreadable tags");
                        TagSet::default()
                    });
                    TaggedFile { file, tags }
                })
                .collect()
        })
        .await
        .context("tag reader task")
    }

    /// Tag and place every assigned file into `dir`, concurrently. Returns the
    /// source paths.
    async fn apply(
        &self,
        dir: &Path,
        metadata: &ReleaseMetadata,
        cover: &[u8],
        assignments: Vec<MatchAssignment>,
        placement: Placement,
    ) -> anyhow::Result<Vec<PathBuf>> {
        let mut targets: Vec<String> = assignments.iter().map(track_file_name).collect();
        targets.sort();
        if let Some(pair) = targets.windows(2).find(|pair| pair[0] == pair[1]) {
            bail!("Several tracks would be saved as {}", pair[0]);
        }

        let total = assignments.len();
        let tasks = assignments.into_iter().map(|assignment| {
            let store = Arc::clone(&self.tags);
            let tags = TagSet::for_track(metadata, &assignment.track, cover);
            let target = dir.join(track_file_name(&assignment));
            tokio::task::spawn_blocking(move || -> anyhow::Result<(PathBuf, PathBuf)> {
                let source = assignment.file.path;
                match placement {
                    Placement::Move => {
                        store.write(&source, &tags)?;
                        std::fs::rename(&source, &target)
                            .with_context(|| format!("rename {:?} to {:?}", source, target))?;
                    }
                    Placement::Copy => {
                        std::fs::copy(&source, &target)
                            .with_context(|| format!("copy {:?} to {:?}", source, target))?;
                        store.write(&target, &tags)?;
                    }
                }
                Ok((source, target))
            })
        });

        let mut errors = Vec::new();
        let mut sources = Vec::with_capacity(total);
        for joined in join_all(tasks).await {
            match joined {
                Ok(Ok((source, target))) => {
                    tracing::debug!(file = ?target, "track written");
                    sources.push(source);
                }
                Ok(Err(err)) => errors.push(format!("{err:#}")),
                Err(err) => errors.push(format!("tag writer task: {err}")),
            }
        }
        if !errors.is_empty() {
            bail!(
                "{} of {} files failed:\n{}",
                errors.len(),
                total,
                errors.join("\n")
            );
        }
        Ok(sources)
    }
}

/// Create the album directory, refusing to reuse an existing one.
async fn create_album_dir(dir: &Path) -> Result<(), ReleaseError> {
    let exists = tokio::fs::try_exists(dir)
        .await
        .with_context(|| format!("check {:?}", dir))
        .at(Stage::CreatingDirectory)?;
    if exists {
        return Err(ReleaseError::AlreadyExists(dir.to_path_buf()));
    }
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create dir {:?}", dir))
        .at(Stage::CreatingDirectory)?;
    Ok(())
}

/// Run `work`, removing `dir` entirely if it fails.
async fn with_rollback<T, F>(dir: &Path, work: F) -> Result<T, ReleaseError>
where
    F: Future<Output = Result<T, StageFailure>>,
{
    let failure = match work.await {
        Ok(value) => return Ok(value),
        Err(failure) => failure,
    };
    tracing::warn!(dir = ?dir, stage = %failure.stage, "removing album directory");
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Err(ReleaseError::RolledBack {
            dir: dir.to_path_buf(),
            stage: failure.stage,
            cause: failure.cause,
        }),
        Err(rollback) => Err(ReleaseError::RollbackFailed {
            dir: dir.to_path_buf(),
            stage: failure.stage,
            cause: failure.cause,
            rollback,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::album::Album;
    use crate::metadata::tests::{album_page, inlustris_page, INLUSTRIS_TRACKS};
    use crate::models::Track;

    const ALBUM_URL: &str = "https://inlustris.bandcamp.com/album/stella-splendens";
    const COVER: &[u8] = b"cover jpeg";

    struct FakeSource {
        pages: HashMap<String, String>,
        cover_fails: bool,
    }

    impl FakeSource {
        fn with_page(url: &str, page: String) -> Self {
            Self {
                pages: HashMap::from([(url.to_string(), page)]),
                cover_fails: false,
            }
        }
    }

    #[async_trait]
    impl ReleaseSource for FakeSource {
        async fn fetch_page(&self, url: &str) -> anyhow::Result<String> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow!("no page for {url}"))
        }

        async fn fetch_binary(&self, _url: &str) -> anyhow::Result<Vec<u8>> {
            if self.cover_fails {
                bail!("cover unavailable");
            }
            Ok(COVER.to_vec())
        }
    }

    #[derive(Default)]
    struct FakeDownloader {
        files: Vec<String>,
        error: Option<String>,
        calls: Mutex<usize>,
    }

    impl FakeDownloader {
        fn producing(files: &[String]) -> Self {
            Self {
                files: files.to_vec(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl AudioDownloader for FakeDownloader {
        async fn download(&self, _url: &str, dest_dir: &Path) -> anyhow::Result<()> {
            *self.calls.lock().unwrap() += 1;
            for name in &self.files {
                tokio::fs::write(dest_dir.join(name), b"audio").await?;
            }
            if let Some(error) = &self.error {
                bail!("{error}");
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeTagStore {
        existing: HashMap<String, TagSet>,
        fail_title: Option<String>,
        written: Mutex<Vec<(PathBuf, TagSet)>>,
    }

    impl TagStore for FakeTagStore {
        fn read(&self, path: &Path) -> anyhow::Result<TagSet> {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(self.existing.get(&name).cloned().unwrap_or_default())
        }

        fn write(&self, path: &Path, tags: &TagSet) -> anyhow::Result<()> {
            if tags.title.is_some() && tags.title == self.fail_title {
                bail!("cannot write tags to {:?}", path);
            }
            self.written
                .lock()
                .unwrap()
                .push((path.to_path_buf(), tags.clone()));
            Ok(())
        }
    }

    fn inlustris_files() -> Vec<String> {
        INLUSTRIS_TRACKS
            .iter()
            .enumerate()
            .map(|(i, title)| format!("Inlustris - Stella Splendens - {:02} {title}.mp3", i + 1))
            .collect()
    }

    fn pipeline(
        source: FakeSource,
        downloader: Arc<FakeDownloader>,
        tags: Arc<FakeTagStore>,
    ) -> ReleasePipeline {
        ReleasePipeline::new(
            Arc::new(source),
            downloader,
            tags,
            MetadataParser::default(),
            FileClassifier::default(),
        )
    }

    fn genre() -> Genre {
        Genre::new("Medieval Folk").unwrap()
    }

    fn url() -> ReleaseUrl {
        ReleaseUrl::parse(ALBUM_URL).unwrap()
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn downloads_tags_and_renames_album() {
        let library = tempfile::tempdir().unwrap();
        let downloader = Arc::new(FakeDownloader::producing(&inlustris_files()));
        let tags = Arc::new(FakeTagStore::default());
        let pipeline = pipeline(
            FakeSource::with_page(ALBUM_URL, inlustris_page()),
            downloader,
            tags.clone(),
        );

        let dir = pipeline
            .download_release(library.path(), &url(), &genre())
            .await
            .unwrap();

        assert_eq!(
            dir,
            library.path().join("Inlustris").join("[2020] Stella Splendens")
        );
        assert_eq!(
            file_names(&dir),
            [
                "01 - Ave Gloriosa.mp3",
                "02 - Morena Me Llaman.mp3",
                "03 - Ecco La Primavera.mp3",
                "04 - Gaudens In Domino.mp3",
                "05 - Como Somos Per Consello CSM 119.mp3",
                "06 - Santa Maria, Strela Do Dia CSM 100.mp3",
                "07 - Stella Splendens.mp3",
            ]
        );

        let written = tags.written.lock().unwrap();
        assert_eq!(written.len(), 7);
        for (_, set) in written.iter() {
            assert_eq!(set.album.as_deref(), Some("Stella Splendens"));
            assert_eq!(set.artist.as_deref(), Some("Inlustris"));
            assert_eq!(set.performer.as_deref(), Some("Inlustris"));
            assert_eq!(set.year, Some(2020));
            assert_eq!(set.genre.as_deref(), Some("Medieval Folk"));
            assert_eq!(set.cover.as_deref(), Some(COVER));
            let number = set.track_number.unwrap() as usize;
            assert_eq!(set.title.as_deref(), Some(INLUSTRIS_TRACKS[number - 1]));
        }
    }

    #[tokio::test]
    async fn existing_album_dir_is_left_alone() {
        let library = tempfile::tempdir().unwrap();
        let existing = library.path().join("Inlustris").join("[2020] Stella Splendens");
        std::fs::create_dir_all(&existing).unwrap();
        std::fs::write(existing.join("keep.mp3"), b"x").unwrap();
        let downloader = Arc::new(FakeDownloader::producing(&inlustris_files()));
        let pipeline = pipeline(
            FakeSource::with_page(ALBUM_URL, inlustris_page()),
            downloader.clone(),
            Arc::new(FakeTagStore::default()),
        );

        let err = pipeline
            .download_release(library.path(), &url(), &genre())
            .await
            .unwrap_err();

        assert!(matches!(err, ReleaseError::AlreadyExists(ref dir) if *dir == existing));
        assert!(err
            .to_string()
            .starts_with("Album directory already exists, this might be an error: "));
        assert!(existing.join("keep.mp3").exists());
        assert_eq!(*downloader.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_download_removes_album_dir() {
        let library = tempfile::tempdir().unwrap();
        let downloader = Arc::new(FakeDownloader {
            files: vec!["partial.mp3".to_string()],
            error: Some("yt-dlp exited with 1".to_string()),
            ..FakeDownloader::default()
        });
        let pipeline = pipeline(
            FakeSource::with_page(ALBUM_URL, inlustris_page()),
            downloader,
            Arc::new(FakeTagStore::default()),
        );

        let err = pipeline
            .download_release(library.path(), &url(), &genre())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::DownloadingAudio));
        assert!(matches!(err, ReleaseError::RolledBack { .. }));
        assert!(err.to_string().contains("yt-dlp exited with 1"));
        assert!(!library
            .path()
            .join("Inlustris")
            .join("[2020] Stella Splendens")
            .exists());
    }

    #[tokio::test]
    async fn unmatched_file_removes_album_dir() {
        let library = tempfile::tempdir().unwrap();
        let mut files = inlustris_files();
        files.push("Inlustris - Bonus.mp3".to_string());
        let pipeline = pipeline(
            FakeSource::with_page(ALBUM_URL, inlustris_page()),
            Arc::new(FakeDownloader::producing(&files)),
            Arc::new(FakeTagStore::default()),
        );

        let err = pipeline
            .download_release(library.path(), &url(), &genre())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::ListingAndReconciling));
        assert!(err
            .to_string()
            .contains("Couldn't find track matching file: Inlustris - Bonus.mp3"));
        assert!(!library
            .path()
            .join("Inlustris")
            .join("[2020] Stella Splendens")
            .exists());
    }

    #[tokio::test]
    async fn non_audio_file_removes_album_dir() {
        let library = tempfile::tempdir().unwrap();
        let mut files = inlustris_files();
        files.push("cover.jpg".to_string());
        let pipeline = pipeline(
            FakeSource::with_page(ALBUM_URL, inlustris_page()),
            Arc::new(FakeDownloader::producing(&files)),
            Arc::new(FakeTagStore::default()),
        );

        let err = pipeline
            .download_release(library.path(), &url(), &genre())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Non audio file: "));
        assert!(!library.path().join("Inlustris").join("[2020] Stella Splendens").exists());
    }

    #[tokio::test]
    async fn failed_tag_write_removes_album_dir() {
        let library = tempfile::tempdir().unwrap();
        let tags = Arc::new(FakeTagStore {
            fail_title: Some("Gaudens In Domino".to_string()),
            ..FakeTagStore::default()
        });
        let pipeline = pipeline(
            FakeSource::with_page(ALBUM_URL, inlustris_page()),
            Arc::new(FakeDownloader::producing(&inlustris_files())),
            tags,
        );

        let err = pipeline
            .download_release(library.path(), &url(), &genre())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::WritingTags));
        assert!(err.to_string().contains("1 of 7 files failed"));
        assert!(!library.path().join("Inlustris").join("[2020] Stella Splendens").exists());
    }

    #[tokio::test]
    async fn invalid_page_creates_nothing() {
        let library = tempfile::tempdir().unwrap();
        let pipeline = pipeline(
            FakeSource::with_page(ALBUM_URL, "<html></html>".to_string()),
            Arc::new(FakeDownloader::default()),
            Arc::new(FakeTagStore::default()),
        );

        let err = pipeline
            .download_release(library.path(), &url(), &genre())
            .await
            .unwrap_err();

        let ReleaseError::Metadata(validation) = &err else {
            panic!("expected metadata error, got {err}");
        };
        assert_eq!(validation.messages().len(), 5);
        assert!(file_names(library.path()).is_empty());
    }

    #[tokio::test]
    async fn failed_cover_creates_nothing() {
        let library = tempfile::tempdir().unwrap();
        let mut source = FakeSource::with_page(ALBUM_URL, inlustris_page());
        source.cover_fails = true;
        let pipeline = pipeline(
            source,
            Arc::new(FakeDownloader::default()),
            Arc::new(FakeTagStore::default()),
        );

        let err = pipeline
            .download_release(library.path(), &url(), &genre())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::DownloadingCover));
        assert!(file_names(library.path()).is_empty());
    }

    fn tagged(title: &str, number: u32) -> TagSet {
        TagSet {
            title: Some(title.to_string()),
            artist: Some("Inlustris".to_string()),
            album: Some("Stella Splendens".to_string()),
            track_number: Some(number),
            ..TagSet::default()
        }
    }

    #[tokio::test]
    async fn tag_files_moves_matching_library_files() {
        let library = tempfile::tempdir().unwrap();
        let mut existing = HashMap::new();
        for (i, title) in INLUSTRIS_TRACKS.iter().enumerate() {
            let name = format!("track{i}.mp3");
            std::fs::write(library.path().join(&name), b"audio").unwrap();
            existing.insert(name, tagged(title, i as u32 + 1));
        }
        std::fs::write(library.path().join("unrelated.mp3"), b"audio").unwrap();
        std::fs::create_dir(library.path().join("Other Artist")).unwrap();

        let tags = Arc::new(FakeTagStore {
            existing,
            ..FakeTagStore::default()
        });
        let pipeline = pipeline(
            FakeSource::with_page(ALBUM_URL, inlustris_page()),
            Arc::new(FakeDownloader::default()),
            tags.clone(),
        );

        let dir = pipeline
            .tag_files_release(library.path(), &url(), &genre())
            .await
            .unwrap();

        assert_eq!(file_names(&dir).len(), 7);
        assert!(dir.join("07 - Stella Splendens.mp3").exists());
        assert_eq!(
            file_names(library.path()),
            ["Inlustris", "Other Artist", "unrelated.mp3"]
        );
        let written = tags.written.lock().unwrap();
        assert_eq!(written.len(), 7);
        assert!(written.iter().all(|(path, _)| path.starts_with(&dir)));
    }

    #[tokio::test]
    async fn failed_tag_files_release_leaves_library_untouched() {
        let library = tempfile::tempdir().unwrap();
        let mut existing = HashMap::new();
        for (i, title) in INLUSTRIS_TRACKS.iter().enumerate() {
            let name = format!("track{i}.mp3");
            std::fs::write(library.path().join(&name), format!("audio {i}")).unwrap();
            existing.insert(name, tagged(title, i as u32 + 1));
        }
        let tags = Arc::new(FakeTagStore {
            existing,
            fail_title: Some("Stella Splendens".to_string()),
            ..FakeTagStore::default()
        });
        let pipeline = pipeline(
            FakeSource::with_page(ALBUM_URL, inlustris_page()),
            Arc::new(FakeDownloader::default()),
            tags.clone(),
        );

        let err = pipeline
            .tag_files_release(library.path(), &url(), &genre())
            .await
            .unwrap_err();

        assert!(matches!(err, ReleaseError::RolledBack { stage: Stage::WritingTags, .. }));
        assert!(!library.path().join("Inlustris").join("[2020] Stella Splendens").exists());
        for i in 0..INLUSTRIS_TRACKS.len() {
            let content = std::fs::read_to_string(library.path().join(format!("track{i}.mp3"))).unwrap();
            assert_eq!(content, format!("audio {i}"));
        }
        let written = tags.written.lock().unwrap();
        assert!(written
            .iter()
            .all(|(path, _)| path.parent() != Some(library.path())));
    }

    #[tokio::test]
    async fn partial_download_tags_the_tracks_it_got() {
        let library = tempfile::tempdir().unwrap();
        let files: Vec<String> = inlustris_files().into_iter().take(5).collect();
        let pipeline = pipeline(
            FakeSource::with_page(ALBUM_URL, inlustris_page()),
            Arc::new(FakeDownloader::producing(&files)),
            Arc::new(FakeTagStore::default()),
        );

        let dir = pipeline
            .download_release(library.path(), &url(), &genre())
            .await
            .unwrap();

        let names = file_names(&dir);
        assert_eq!(names.len(), 5);
        assert_eq!(names[0], "01 - Ave Gloriosa.mp3");
        assert_eq!(names[4], "05 - Como Somos Per Consello CSM 119.mp3");
    }

    #[tokio::test]
    async fn tag_files_reports_missing_tracks_before_creating_dir() {
        let library = tempfile::tempdir().unwrap();
        std::fs::write(library.path().join("one.mp3"), b"audio").unwrap();
        let tags = Arc::new(FakeTagStore {
            existing: HashMap::from([("one.mp3".to_string(), tagged("Ave Gloriosa", 1))]),
            ..FakeTagStore::default()
        });
        let pipeline = pipeline(
            FakeSource::with_page(ALBUM_URL, inlustris_page()),
            Arc::new(FakeDownloader::default()),
            tags,
        );

        let err = pipeline
            .tag_files_release(library.path(), &url(), &genre())
            .await
            .unwrap_err();

        let ReleaseError::Unresolved(validation) = &err else {
            panic!("expected unresolved tracks, got {err}");
        };
        assert!(validation.messages()[0].starts_with("Couldn't find file matching track: "));
        assert_eq!(file_names(library.path()), ["one.mp3"]);
    }

    #[tokio::test]
    async fn run_all_keeps_going_after_a_failure() {
        let library = tempfile::tempdir().unwrap();
        let pipeline = pipeline(
            FakeSource::with_page(ALBUM_URL, inlustris_page()),
            Arc::new(FakeDownloader::producing(&inlustris_files())),
            Arc::new(FakeTagStore::default()),
        );
        let urls = vec!["https://example.com/nope".to_string(), ALBUM_URL.to_string()];

        let outcomes = pipeline
            .run_all(Mode::Download, library.path(), &genre(), &urls)
            .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            outcomes[0].result.as_ref().unwrap_err().to_string(),
            "Url was not recognized as album nor track: https://example.com/nope"
        );
        assert!(outcomes[1].result.is_ok());
    }

    #[test]
    fn album_dir_marks_kind_and_strips_unsafe_chars() {
        let metadata = ReleaseMetadata {
            artist: "AC/DC".to_string(),
            album: Album::from_raw("Live: At Home EP"),
            year: 1999,
            genre: genre(),
            tracks: vec![Track {
                number: 1,
                title: "Intro?".to_string(),
            }],
            cover_url: "https://f4.bcbits.com/img/a1_16.jpg".to_string(),
        };
        assert_eq!(
            album_dir(Path::new("/music"), &metadata),
            Path::new("/music/ACDC/[1999] Live At Home (EP)")
        );
        let assignment = MatchAssignment {
            file: AudioFile::from_path("/dl/x.MP3"),
            track: metadata.tracks[0].clone(),
        };
        assert_eq!(track_file_name(&assignment), "01 - Intro.MP3");
    }

    #[test]
    fn track_page_album_dir_has_track_suffix() {
        let page = album_page(
            "Snakes Of Russia",
            "Welcome To Speed Castle",
            "released May 3, 2019",
            "https://f4.bcbits.com/img/a2_16.jpg",
            &[],
        );
        let metadata = MetadataParser::default()
            .parse(&page, crate::models::PageKind::Track, genre())
            .unwrap();
        assert_eq!(
            album_dir(Path::new("/music"), &metadata),
            Path::new("/music/Snakes Of Russia/[2019] Welcome To Speed Castle (Track)")
        );
    }
}
