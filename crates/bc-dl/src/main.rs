use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bc_dl::classify::FileClassifier;
use bc_dl::cli::Args;
use bc_dl::config;
use bc_dl::downloader::CommandDownloader;
use bc_dl::http::HttpReleaseSource;
use bc_dl::lifecycle::ReleasePipeline;
use bc_dl::metadata::MetadataParser;
use bc_dl::tags::LoftyTagStore;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,bc_dl=info")),
        )
        .init();

    let cfg = config::load_resolved(args.config.as_deref())?;
    let release = args.cmd.release_args();
    let genre = config::check_genre(&release.genre, cfg.genres_file.as_deref())?;
    tracing::info!(
        mode = ?args.cmd.mode(),
        library = %release.music_library_dir.display(),
        genre = %genre,
        releases = release.urls.len(),
        "starting bc-dl"
    );

    let pipeline = ReleasePipeline::new(
        Arc::new(HttpReleaseSource::new(&cfg.user_agent)?),
        Arc::new(CommandDownloader::new(
            cfg.downloader_program.clone(),
            cfg.downloader_args.clone(),
        )),
        Arc::new(LoftyTagStore),
        MetadataParser::new(cfg.cover_extensions.clone()),
        FileClassifier::new(cfg.audio_extensions.clone()),
    );

    let outcomes = pipeline
        .run_all(
            args.cmd.mode(),
            &release.music_library_dir,
            &genre,
            &release.urls,
        )
        .await;

    let failed = outcomes.iter().filter(|outcome| outcome.result.is_err()).count();
    if failed > 0 {
        tracing::error!(failed, total = outcomes.len(), "some releases failed");
        return Ok(ExitCode::FAILURE);
    }
    tracing::info!(total = outcomes.len(), "all releases done");
    Ok(ExitCode::SUCCESS)
}
